//! A handle to one MySQL instance
//!
//! Every statement goes through a single session checked out of the pool, so
//! session state such as `USE db`, `SET SESSION ...` or a global read lock
//! carries over between calls the way it does in an interactive client.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use mysql_async::prelude::*;
use mysql_async::{Conn, FromRowError, Opts, Pool, Row};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::binlog::{self, BinlogReference};
use crate::dump::DumpRunner;
use crate::error::{ReplicationError, Result};
use crate::sql;
use crate::status::ReplicaStatus;

/// Longest statement text carried into logs and errors.
const STATEMENT_DISPLAY_CHARS: usize = 240;

const SELECT_LOCK_WAIT_TIMEOUT: &str = "SELECT @@SESSION.lock_wait_timeout";

pub const DEFAULT_LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Address other instances use to reach a server, e.g. a container name on a
/// shared Docker network and the in-container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

pub struct Connection {
    pool: Pool,
    session: Mutex<Conn>,
    endpoint: Endpoint,
    dump_runner: DumpRunner,
    lock_wait_timeout: Duration,
}

impl Connection {
    /// Connects to `url` and checks out the session used for every statement.
    pub async fn connect(url: &str, endpoint: Endpoint, dump_runner: DumpRunner) -> Result<Self> {
        let opts = Opts::from_url(url).map_err(|e| ReplicationError::Connect(e.into()))?;
        Self::connect_with(opts, endpoint, dump_runner).await
    }

    /// Like [`Connection::connect`], for options built with `OptsBuilder`
    /// (e.g. passwords that would need escaping in a URL).
    pub async fn connect_with(
        opts: impl Into<Opts>,
        endpoint: Endpoint,
        dump_runner: DumpRunner,
    ) -> Result<Self> {
        let pool = Pool::new(opts.into());
        let session = pool.get_conn().await.map_err(ReplicationError::Connect)?;
        debug!("Connected to {}", endpoint);

        Ok(Self {
            pool,
            session: Mutex::new(session),
            endpoint,
            dump_runner,
            lock_wait_timeout: DEFAULT_LOCK_WAIT_TIMEOUT,
        })
    }

    /// How long `binlog_reference` waits for the global read lock.
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Runs `sql` with autocommit and returns the rows of its first result set.
    pub async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        self.run_step("execute", sql, sql).await
    }

    /// Runs `sql` and decodes each row as `T`.
    pub async fn query_rows<T: FromRow>(&self, sql: &str) -> Result<Vec<T>> {
        self.execute(sql)
            .await?
            .into_iter()
            .map(|row| {
                mysql_async::from_row_opt::<T>(row)
                    .map_err(|FromRowError(row)| ReplicationError::Decode(format!("{row:?}")))
            })
            .collect()
    }

    /// Runs `sql` on the session. `shown_as` is what logs and errors show in
    /// place of the statement.
    pub(crate) async fn run_step(&self, step: &str, sql: &str, shown_as: &str) -> Result<Vec<Row>> {
        let mut conn = self.session.lock().await;
        run_on(&mut conn, step, sql, shown_as).await
    }

    /// Splits a script file into statements and runs them in order. Stops at
    /// the first failure; statements before it stay committed.
    pub async fn execute_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let statements = sql_split::split_file(path).map_err(|source| ReplicationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut conn = self.session.lock().await;
        for (index, statement) in statements.iter().enumerate() {
            let step = format!("{} statement {}", path.display(), index + 1);
            run_on(&mut conn, &step, statement, statement).await?;
        }

        info!(
            "Executed {} statements from {} on {}",
            statements.len(),
            path.display(),
            self.endpoint
        );
        Ok(statements.len())
    }

    /// Reads one server variable by exact name.
    pub async fn show_variable(&self, name: &str) -> Result<String> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ReplicationError::NotFound(format!("variable '{name}'")));
        }

        let query = sql::show_variable(name);
        let rows = self.run_step("show variable", &query, &query).await?;
        rows.first()
            .map(|row| {
                row.get_opt::<Option<String>, _>(1)
                    .and_then(|value| value.ok())
                    .flatten()
                    .unwrap_or_default()
            })
            .ok_or_else(|| ReplicationError::NotFound(format!("variable '{name}'")))
    }

    /// Captures the source's current binlog coordinate under a global read
    /// lock. The lock is released and the session's `lock_wait_timeout` is
    /// restored before returning, on success or failure.
    pub async fn binlog_reference(&self) -> Result<BinlogReference> {
        const STEP: &str = "capture binlog reference";

        let mut conn = self.session.lock().await;
        let saved_timeout = read_lock_wait_timeout(&mut conn, STEP).await?;
        let timeout = format!(
            "SET SESSION lock_wait_timeout = {}",
            self.lock_wait_timeout.as_secs().max(1)
        );
        run_on(&mut conn, STEP, &timeout, &timeout).await?;

        let reference = match run_on(
            &mut conn,
            STEP,
            sql::FLUSH_TABLES_WITH_READ_LOCK,
            sql::FLUSH_TABLES_WITH_READ_LOCK,
        )
        .await
        {
            Ok(_) => {
                let reference = read_binlog_status(&mut conn, STEP).await;
                let unlocked = run_on(&mut conn, STEP, sql::UNLOCK_TABLES, sql::UNLOCK_TABLES).await;
                if let Err(e) = &unlocked {
                    warn!("Failed to release global read lock on {}: {}", self.endpoint, e);
                }
                reference.and_then(|reference| unlocked.map(|_| reference))
            }
            Err(e) => Err(e.on_global_lock()),
        };

        let restore = format!("SET SESSION lock_wait_timeout = {saved_timeout}");
        let restored = run_on(&mut conn, STEP, &restore, &restore).await;
        if let Err(e) = &restored {
            warn!("Failed to restore lock_wait_timeout on {}: {}", self.endpoint, e);
        }

        let reference = reference?;
        restored?;
        info!("Captured binlog reference {} on {}", reference, self.endpoint);
        Ok(reference)
    }

    /// Reads the current binlog coordinate without locking. Writes racing with
    /// the read may or may not be included.
    pub async fn current_binlog_position(&self) -> Result<BinlogReference> {
        let mut conn = self.session.lock().await;
        read_binlog_status(&mut conn, "read binlog position").await
    }

    /// Dumps `database` to `output_path` with the connection's dump runner.
    pub async fn dump(&self, database: &str, output_path: impl AsRef<Path>, flags: &[&str]) -> Result<()> {
        self.dump_runner.run(database, output_path.as_ref(), flags).await
    }

    /// Coordinates recorded in a dump taken with `--source-data`.
    pub fn dump_source_coordinates(path: impl AsRef<Path>) -> Result<BinlogReference> {
        let path = path.as_ref();
        let dump = std::fs::read_to_string(path).map_err(|source| ReplicationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        binlog::dump_source_coordinates(&dump).ok_or_else(|| {
            ReplicationError::NotFound(format!("source coordinates in {}", path.display()))
        })
    }

    /// `None` when the instance is not configured as a replica.
    pub async fn replica_status(&self) -> Result<Option<ReplicaStatus>> {
        let rows = self
            .run_step("replica status", sql::SHOW_REPLICA_STATUS, sql::SHOW_REPLICA_STATUS)
            .await?;
        Ok(rows.first().map(ReplicaStatus::from_row))
    }

    pub async fn start_replica(&self) -> Result<()> {
        self.run_step("start replica", sql::START_REPLICA, sql::START_REPLICA)
            .await?;
        Ok(())
    }

    pub async fn stop_replica(&self) -> Result<()> {
        self.run_step("stop replica", sql::STOP_REPLICA, sql::STOP_REPLICA)
            .await?;
        Ok(())
    }

    /// Forgets the replica's source configuration. The replica must be stopped.
    pub async fn reset_replica(&self) -> Result<()> {
        self.run_step("reset replica", sql::RESET_REPLICA_ALL, sql::RESET_REPLICA_ALL)
            .await?;
        Ok(())
    }

    pub async fn disconnect(self) -> Result<()> {
        drop(self.session.into_inner());
        self.pool
            .disconnect()
            .await
            .map_err(ReplicationError::Connect)
    }
}

async fn run_on(conn: &mut Conn, step: &str, sql: &str, shown_as: &str) -> Result<Vec<Row>> {
    let shown = sql::abbreviate(shown_as, STATEMENT_DISPLAY_CHARS);
    debug!("{}: executing {}", step, shown);
    conn.query::<Row, _>(sql)
        .await
        .map_err(|e| ReplicationError::from_statement(step, &shown, e))
}

async fn read_lock_wait_timeout(conn: &mut Conn, step: &str) -> Result<u64> {
    let rows = run_on(conn, step, SELECT_LOCK_WAIT_TIMEOUT, SELECT_LOCK_WAIT_TIMEOUT).await?;
    rows.first()
        .and_then(|row| row.get_opt::<u64, _>(0))
        .and_then(|value| value.ok())
        .ok_or_else(|| ReplicationError::Decode("@@SESSION.lock_wait_timeout".to_string()))
}

async fn read_binlog_status(conn: &mut Conn, step: &str) -> Result<BinlogReference> {
    let rows = run_on(
        conn,
        step,
        sql::SHOW_BINARY_LOG_STATUS,
        sql::SHOW_BINARY_LOG_STATUS,
    )
    .await?;

    let row = rows.first().ok_or_else(|| {
        ReplicationError::NotFound("binary log status (is log_bin enabled?)".to_string())
    })?;
    let filename = row
        .get_opt::<String, _>("File")
        .and_then(|value| value.ok())
        .ok_or_else(|| ReplicationError::Decode("binary log status has no File".to_string()))?;
    let position = row
        .get_opt::<u64, _>("Position")
        .and_then(|value| value.ok())
        .ok_or_else(|| ReplicationError::Decode("binary log status has no Position".to_string()))?;

    Ok(BinlogReference::new(filename, position))
}
