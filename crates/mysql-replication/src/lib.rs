//! Native MySQL source/replica replication bootstrap
//!
//! Sets up binary log file/position replication between two MySQL 8.4
//! servers by sequencing their own administration statements:
//!
//! 1. issue a replication user on the source ([`grant_replication_credentials`])
//! 2. capture the source's binlog coordinate under a global read lock
//!    ([`Connection::binlog_reference`])
//! 3. point the replica at the source and that coordinate
//!    (`CHANGE REPLICATION SOURCE TO ...`)
//! 4. `START REPLICA`, then poll until the replica has caught up
//!    ([`wait_until_caught_up`])
//!
//! The replication itself is done by the servers; this crate only drives the
//! sequence and reports failures with the step they happened in.

pub mod binlog;
pub mod bootstrap;
mod connection;
pub mod credentials;
mod dump;
mod error;
pub mod lag;
pub mod sql;
mod status;

pub use binlog::{dump_source_coordinates, BinlogReference};
pub use bootstrap::{
    bootstrap, BootstrapOptions, CoordinatesCaptured, CredentialsGranted, ReplicationBootstrap,
    ReplicationLink, Started, TargetConfigured, Unconfigured,
};
pub use connection::{Connection, Endpoint, DEFAULT_LOCK_WAIT_TIMEOUT};
pub use credentials::{
    grant_replication_credentials, revoke_replication_credentials, CredentialPolicy, Credentials,
    ANY_HOST,
};
pub use dump::{DumpRunner, DEFAULT_DUMP_FLAGS};
pub use error::{server_error_code, ReplicationError, Result};
pub use lag::{wait_until_caught_up, WaitOptions};
pub use status::ReplicaStatus;
