//! Error types for replication bootstrap.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::binlog::BinlogReference;

/// MySQL error code for a failed `CREATE USER`/`DROP USER` (ER_CANNOT_USER).
pub const ER_CANNOT_USER: u16 = 1396;
/// MySQL error code for an expired lock wait (ER_LOCK_WAIT_TIMEOUT).
pub const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;

pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while driving a source/replica pair.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Opening the connection pool or checking out a session failed.
    #[error("MySQL connection error: {0}")]
    Connect(#[source] mysql_async::Error),

    /// A statement was malformed or rejected by the server.
    #[error("{step}: statement failed: {statement}: {source}")]
    Execution {
        step: String,
        statement: String,
        #[source]
        source: mysql_async::Error,
    },

    /// The external dump utility exited with a non-zero status.
    #[error("dump of database '{database}' failed ({status}): {stderr}")]
    Dump {
        database: String,
        status: String,
        stderr: String,
    },

    /// A variable, status row or coordinate that was expected is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The replication user already exists on the source.
    #[error("user '{username}'@'{host}' already exists")]
    DuplicateUser { username: String, host: String },

    /// The global read lock could not be obtained in time.
    #[error("{step}: timed out waiting for global read lock: {source}")]
    LockTimeout {
        step: String,
        #[source]
        source: mysql_async::Error,
    },

    /// The replica did not apply the source's log up to the target in time.
    #[error("replica did not reach {target} within {waited:?} (applied: {})", .applied.as_ref().map_or_else(|| "nothing".to_string(), ToString::to_string))]
    ReplicationLagTimeout {
        waited: Duration,
        target: BinlogReference,
        applied: Option<BinlogReference>,
    },

    /// A replication thread on the replica stopped with an error.
    #[error("replica stopped: io error '{io_error}', sql error '{sql_error}'")]
    ReplicaStopped { io_error: String, sql_error: String },

    /// A result row did not have the expected shape.
    #[error("failed to decode row: {0}")]
    Decode(String),

    /// A binlog coordinate could not be parsed.
    #[error("invalid binlog reference: {0}")]
    InvalidReference(String),

    /// Reading a local file failed.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReplicationError {
    /// Wraps a driver error raised by `statement` during `step`.
    pub(crate) fn from_statement(step: &str, statement: &str, source: mysql_async::Error) -> Self {
        ReplicationError::Execution {
            step: step.to_string(),
            statement: statement.to_string(),
            source,
        }
    }

    /// Reclassifies a lock wait timeout raised while acquiring the global
    /// read lock. Only valid for the lock statement itself; a 1205 from any
    /// other statement is a row or metadata lock and stays `Execution`.
    pub(crate) fn on_global_lock(self) -> Self {
        match self {
            ReplicationError::Execution { step, source, .. }
                if server_error_code(&source) == Some(ER_LOCK_WAIT_TIMEOUT) =>
            {
                ReplicationError::LockTimeout { step, source }
            }
            other => other,
        }
    }

    /// Name of the bootstrap step the error was raised in, when known.
    pub fn step(&self) -> Option<&str> {
        match self {
            ReplicationError::Execution { step, .. } | ReplicationError::LockTimeout { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }
}

/// Server-side error code carried by a driver error, if any.
pub fn server_error_code(error: &mysql_async::Error) -> Option<u16> {
    match error {
        mysql_async::Error::Server(server) => Some(server.code),
        _ => None,
    }
}
