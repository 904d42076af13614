//! Connecting a fresh replica to a fresh source

use mysql_replication_fixtures::config::HarnessConfig;
use mysql_replication_fixtures::replication::{bootstrap, BootstrapOptions, Credentials};
use mysql_replication_fixtures::testing::{init_logging, TestSession};

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_connect_a_replica() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let replica_db = session.replica().await?;
    let source = source_db.connection();
    let replica = replica_db.connection();

    assert!(source.show_variable("version").await?.starts_with("8.4."));
    assert!(replica.show_variable("version").await?.starts_with("8.4."));
    assert_eq!(source.show_variable("server_id").await?, "1");
    assert_eq!(replica.show_variable("server_id").await?, "2");

    let started = bootstrap(
        source,
        replica,
        Credentials::new("replicator", "replipassword"),
        &BootstrapOptions::default(),
    )
    .await?;

    let link = started.link();
    assert_eq!(link.source.host, source.host());
    assert_eq!(link.source.port, 3306);
    assert_eq!(link.credentials.username, "replicator");

    source.execute("CREATE DATABASE db").await?;
    source.execute("USE db").await?;
    source
        .execute("CREATE TABLE example_table (example_column VARCHAR(30))")
        .await?;
    source
        .execute("INSERT INTO example_table VALUES ('one'), ('two')")
        .await?;

    let status = started.wait_until_caught_up(session.wait_options()).await?;
    assert!(status.is_running());

    let rows: Vec<(String,)> = replica
        .query_rows("SELECT * FROM db.example_table")
        .await?;
    assert_eq!(rows, vec![("one".to_string(),), ("two".to_string(),)]);

    Ok(())
}
