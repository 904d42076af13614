//! Seeding a replica from a dump taken at a captured coordinate
//!
//! Writes made after the dump must reach the replica through the binlog
//! stream, starting exactly where the dump ends.

use mysql_replication_fixtures::config::HarnessConfig;
use mysql_replication_fixtures::replication::{
    Connection, CredentialPolicy, Credentials, ReplicationBootstrap, ANY_HOST, DEFAULT_DUMP_FLAGS,
};
use mysql_replication_fixtures::testing::{init_logging, TestSession, EXAMPLE_DATABASE};

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_replica_resumes_after_dump() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.loaded_source().await?;
    let replica_db = session.replica().await?;
    let source = source_db.connection();
    let replica = replica_db.connection();

    let captured = ReplicationBootstrap::new(
        source,
        replica,
        Credentials::new("replicator", "replipassword"),
    )
    .grant_credentials(ANY_HOST, CredentialPolicy::Strict)
    .await?
    .capture_coordinates()
    .await?;

    // No writes between capture and dump
    let dump_path = session.out_path(EXAMPLE_DATABASE)?;
    source
        .dump(EXAMPLE_DATABASE, &dump_path, DEFAULT_DUMP_FLAGS)
        .await?;
    assert_eq!(
        &Connection::dump_source_coordinates(&dump_path)?,
        captured.reference()
    );

    // Not covered by the dump
    source
        .execute("INSERT INTO pet VALUES ('Kiwi', 'Tessa', 'bird', 'f', '2024-05-01', NULL)")
        .await?;

    replica
        .execute(&format!("CREATE DATABASE {EXAMPLE_DATABASE}"))
        .await?;
    replica.execute(&format!("USE {EXAMPLE_DATABASE}")).await?;
    let restored = replica.execute_from_file(&dump_path).await?;
    assert!(restored > 0);

    let before: Vec<(i64,)> = replica.query_rows("SELECT COUNT(*) FROM pet").await?;
    assert_eq!(before, vec![(9,)]);

    let started = captured.configure_target().await?.start().await?;
    started.wait_until_caught_up(session.wait_options()).await?;

    let rows: Vec<(String, String)> = replica
        .query_rows("SELECT name, owner FROM example.pet WHERE name = 'Kiwi'")
        .await?;
    assert_eq!(rows, vec![("Kiwi".to_string(), "Tessa".to_string())]);

    let after: Vec<(i64,)> = replica.query_rows("SELECT COUNT(*) FROM example.pet").await?;
    assert_eq!(after, vec![(10,)]);

    Ok(())
}
