//! Truncate-then-reinsert replicates the same way under ROW and MIXED formats

use mysql_replication_fixtures::config::HarnessConfig;
use mysql_replication_fixtures::replication::{
    CredentialPolicy, Credentials, ReplicationBootstrap, ANY_HOST,
};
use mysql_replication_fixtures::testing::{init_logging, TestSession};

async fn truncate_and_reinsert(binlog_format: &str) -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let replica_db = session.replica().await?;
    let source = source_db.connection();
    let replica = replica_db.connection();

    let configured = ReplicationBootstrap::new(
        source,
        replica,
        Credentials::new("replicator", "replipassword"),
    )
    .grant_credentials(ANY_HOST, CredentialPolicy::Strict)
    .await?
    .capture_coordinates()
    .await?
    .configure_target()
    .await?;

    source.execute("CREATE DATABASE db").await?;
    source.execute("USE db").await?;
    source
        .execute(
            "CREATE TABLE animals (
                 id MEDIUMINT NOT NULL AUTO_INCREMENT,
                 name CHAR(30) NOT NULL,
                 PRIMARY KEY (id)
             )",
        )
        .await?;

    // The global value only applies to sessions opened afterwards
    source
        .execute(&format!("SET GLOBAL binlog_format = '{binlog_format}'"))
        .await?;
    source
        .execute(&format!("SET SESSION binlog_format = '{binlog_format}'"))
        .await?;

    source
        .execute("INSERT INTO animals (name) VALUES ('dog'), ('cat')")
        .await?;
    source.execute("TRUNCATE TABLE animals").await?;
    source
        .execute("INSERT INTO animals (name) VALUES ('bat')")
        .await?;

    let started = configured.start().await?;
    started.wait_until_caught_up(session.wait_options()).await?;

    let rows: Vec<(u32, String)> = replica
        .query_rows("SELECT id, name FROM db.animals")
        .await?;
    assert_eq!(rows, vec![(1, "bat".to_string())]);

    let format: Vec<(String,)> = source
        .query_rows("SELECT @@GLOBAL.binlog_format")
        .await?;
    assert_eq!(format, vec![(binlog_format.to_string(),)]);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_truncate_table_using_row_format() -> anyhow::Result<()> {
    truncate_and_reinsert("ROW").await
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_truncate_table_using_mixed_format() -> anyhow::Result<()> {
    truncate_and_reinsert("MIXED").await
}
