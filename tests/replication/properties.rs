//! Behaviour of the individual steps against real servers

use std::time::Duration;

use mysql_replication_fixtures::config::HarnessConfig;
use mysql_replication_fixtures::replication::{
    bootstrap, grant_replication_credentials, wait_until_caught_up, BinlogReference,
    BootstrapOptions, Connection, CredentialPolicy, Credentials, ReplicationError, WaitOptions,
    ANY_HOST,
};
use mysql_replication_fixtures::testing::{init_logging, TestSession, MENAGERIE_SEED};

const SELECT_LOCK_WAIT_TIMEOUT: &str = "SELECT @@SESSION.lock_wait_timeout";

type PetRow = (String, String, String, Option<String>, String, Option<String>);
type EventRow = (String, String, String, Option<String>);

async fn menagerie_contents(
    conn: &Connection,
    database: &str,
) -> anyhow::Result<(Vec<PetRow>, Vec<EventRow>)> {
    let pets = conn
        .query_rows(&format!(
            "SELECT name, owner, species, sex, birth, death FROM {database}.pet ORDER BY name"
        ))
        .await?;
    let events = conn
        .query_rows(&format!(
            "SELECT name, date, type, remark FROM {database}.event ORDER BY name, date"
        ))
        .await?;
    Ok((pets, events))
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_binlog_reference_is_stable_without_writes() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let source = source_db.connection();

    let first = source.binlog_reference().await?;
    let second = source.binlog_reference().await?;
    assert_eq!(first, second);

    source.execute("CREATE DATABASE db").await?;
    let third = source.binlog_reference().await?;
    assert!(third > second);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_read_lock_is_released_after_capture() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let source = source_db.connection();

    source.execute("CREATE DATABASE db").await?;
    source.execute("CREATE TABLE db.t (id INT PRIMARY KEY)").await?;
    source.binlog_reference().await?;

    // A second session would block on a lingering global read lock
    let other = source_db.container().connection().await?;
    other.execute("SET SESSION lock_wait_timeout = 2").await?;
    other.execute("INSERT INTO db.t VALUES (1)").await?;

    let rows: Vec<(i32,)> = source.query_rows("SELECT id FROM db.t").await?;
    assert_eq!(rows, vec![(1,)]);

    other.disconnect().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_read_lock_is_released_when_coordinate_read_fails() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let source = source_db.connection();

    source.execute("CREATE DATABASE db").await?;
    source.execute("CREATE TABLE db.t (id INT PRIMARY KEY)").await?;
    // RELOAD allows the global read lock but not SHOW BINARY LOG STATUS
    source
        .execute("CREATE USER 'locker'@'%' IDENTIFIED BY 'lockerpassword'")
        .await?;
    source.execute("GRANT RELOAD ON *.* TO 'locker'@'%'").await?;

    let locker = source_db
        .container()
        .connection_as("locker", "lockerpassword")
        .await?;
    let before: Vec<(u64,)> = locker.query_rows(SELECT_LOCK_WAIT_TIMEOUT).await?;

    let err = locker.binlog_reference().await.unwrap_err();
    assert!(
        matches!(err, ReplicationError::Execution { ref statement, .. } if statement == "SHOW BINARY LOG STATUS"),
        "unexpected error: {err}"
    );
    assert_eq!(err.step(), Some("capture binlog reference"));

    let after: Vec<(u64,)> = locker.query_rows(SELECT_LOCK_WAIT_TIMEOUT).await?;
    assert_eq!(before, after);

    source.execute("SET SESSION lock_wait_timeout = 2").await?;
    source.execute("INSERT INTO db.t VALUES (1)").await?;

    locker.disconnect().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_capture_times_out_behind_table_lock() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let source = source_db.connection();

    source.execute("CREATE DATABASE db").await?;
    source.execute("CREATE TABLE db.t (id INT PRIMARY KEY)").await?;
    source.execute("LOCK TABLES db.t WRITE").await?;

    let capturing = source_db
        .container()
        .connection()
        .await?
        .with_lock_wait_timeout(Duration::from_secs(1));
    let before: Vec<(u64,)> = capturing.query_rows(SELECT_LOCK_WAIT_TIMEOUT).await?;

    let err = capturing.binlog_reference().await.unwrap_err();
    assert!(
        matches!(err, ReplicationError::LockTimeout { .. }),
        "unexpected error: {err}"
    );
    assert_eq!(err.step(), Some("capture binlog reference"));

    let after: Vec<(u64,)> = capturing.query_rows(SELECT_LOCK_WAIT_TIMEOUT).await?;
    assert_eq!(before, after);

    source.execute("UNLOCK TABLES").await?;
    capturing.binlog_reference().await?;

    capturing.disconnect().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_capture_racing_a_write_sees_it_entirely_or_not_at_all() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let source = source_db.connection();

    source.execute("CREATE DATABASE db").await?;
    source.execute("CREATE TABLE db.t (id INT PRIMARY KEY)").await?;
    let writer = source_db.container().connection().await?;

    for id in 0..5 {
        let before = source.current_binlog_position().await?;
        let insert = format!("INSERT INTO db.t VALUES ({id})");
        let (captured, written) = tokio::join!(source.binlog_reference(), writer.execute(&insert));
        let captured = captured?;
        written?;
        let after = source.current_binlog_position().await?;

        assert!(after > before);
        assert!(
            captured == before || captured == after,
            "captured {captured} is neither {before} nor {after}"
        );
    }

    writer.disconnect().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_file_load_matches_batch_execution() -> anyhow::Result<()> {
    init_logging();

    let config = HarnessConfig::from_env()?;
    let seed = config.seed_path(MENAGERIE_SEED);
    let session = TestSession::new(config)?;
    let source_db = session.source().await?;
    let source = source_db.connection();

    source.execute("CREATE DATABASE by_statement").await?;
    source.execute("USE by_statement").await?;
    assert_eq!(source.execute_from_file(&seed).await?, 7);

    // The server splits a multi-statement batch itself
    source.execute("CREATE DATABASE as_batch").await?;
    source.execute("USE as_batch").await?;
    source.execute(&std::fs::read_to_string(&seed)?).await?;

    let by_statement = menagerie_contents(source, "by_statement").await?;
    let as_batch = menagerie_contents(source, "as_batch").await?;
    assert_eq!(by_statement.0.len(), 9);
    assert_eq!(by_statement.1.len(), 10);
    assert_eq!(by_statement, as_batch);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_credential_policies() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let source = source_db.connection();
    let credentials = Credentials::new("replicator", "replipassword");

    grant_replication_credentials(source, &credentials, ANY_HOST, CredentialPolicy::Strict)
        .await?;

    let err = grant_replication_credentials(source, &credentials, ANY_HOST, CredentialPolicy::Strict)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ReplicationError::DuplicateUser { ref username, .. } if username == "replicator"),
        "unexpected error: {err}"
    );

    grant_replication_credentials(source, &credentials, ANY_HOST, CredentialPolicy::IfNotExists)
        .await?;
    grant_replication_credentials(source, &credentials, ANY_HOST, CredentialPolicy::Preexisting)
        .await?;

    let grants: Vec<(String,)> = source
        .query_rows("SHOW GRANTS FOR 'replicator'@'%'")
        .await?;
    assert!(grants
        .iter()
        .any(|(grant,)| grant.contains("REPLICATION SLAVE")));

    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_show_variable_not_found() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let source = source_db.connection();

    assert_eq!(source.show_variable("log_bin").await?, "ON");
    assert!(matches!(
        source.show_variable("no_such_variable").await,
        Err(ReplicationError::NotFound(_))
    ));
    assert!(matches!(
        source.show_variable("version'; DROP DATABASE mysql; --").await,
        Err(ReplicationError::NotFound(_))
    ));

    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_wait_times_out_on_unconfigured_replica() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let replica_db = session.replica().await?;
    let replica = replica_db.connection();

    assert!(replica.replica_status().await?.is_none());

    let target = BinlogReference::new("binlog.000002", 158);
    let options = WaitOptions {
        timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
    };
    let err = wait_until_caught_up(replica, &target, options)
        .await
        .unwrap_err();

    match err {
        ReplicationError::ReplicationLagTimeout {
            waited,
            target: expected,
            applied,
        } => {
            assert!(waited >= Duration::from_millis(500));
            assert_eq!(expected, target);
            assert_eq!(applied, None);
        }
        other => panic!("unexpected error: {other}"),
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_failed_bootstrap_drops_created_user() -> anyhow::Result<()> {
    init_logging();

    let session = TestSession::new(HarnessConfig::from_env()?)?;
    let source_db = session.source().await?;
    let replica_db = session.replica().await?;
    let source = source_db.connection();
    let replica = replica_db.connection();

    bootstrap(
        source,
        replica,
        Credentials::new("replicator", "replipassword"),
        &BootstrapOptions::default(),
    )
    .await?;

    // Repointing a running replica is rejected by the server
    let err = match bootstrap(
        source,
        replica,
        Credentials::new("second", "secondpassword"),
        &BootstrapOptions::default(),
    )
    .await
    {
        Ok(_) => panic!("bootstrap of a running replica succeeded"),
        Err(err) => err,
    };
    assert_eq!(err.step(), Some("configure target"));

    let users: Vec<(String,)> = source
        .query_rows("SELECT user FROM mysql.user WHERE user IN ('replicator', 'second')")
        .await?;
    assert_eq!(users, vec![("replicator".to_string(),)]);

    Ok(())
}
