//! Waiting for a replica to catch up with a source coordinate.
//!
//! Replication is applied by the replica's own background threads, so the
//! only synchronisation point available is polling `SHOW REPLICA STATUS`
//! until the applied coordinate reaches the target.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::binlog::BinlogReference;
use crate::connection::Connection;
use crate::error::{ReplicationError, Result};
use crate::status::ReplicaStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Polls `replica` until it has applied the source's log up to `target`.
///
/// Fails with [`ReplicationError::ReplicaStopped`] as soon as a replication
/// thread stops on an error, and with
/// [`ReplicationError::ReplicationLagTimeout`] once `options.timeout` passes.
pub async fn wait_until_caught_up(
    replica: &Connection,
    target: &BinlogReference,
    options: WaitOptions,
) -> Result<ReplicaStatus> {
    let started = Instant::now();
    let mut applied = None;

    loop {
        if let Some(status) = replica.replica_status().await? {
            if status.stopped_with_error() {
                return Err(ReplicationError::ReplicaStopped {
                    io_error: status.last_io_error,
                    sql_error: status.last_sql_error,
                });
            }

            if status.has_caught_up(target) {
                info!(
                    "Replica {} caught up with {} after {:?}",
                    replica.endpoint(),
                    target,
                    started.elapsed()
                );
                return Ok(status);
            }

            applied = status.executed_reference();
            debug!(
                "Replica {} applied {:?}, waiting for {}",
                replica.endpoint(),
                applied,
                target
            );
        }

        let waited = started.elapsed();
        if waited >= options.timeout {
            return Err(ReplicationError::ReplicationLagTimeout {
                waited,
                target: target.clone(),
                applied,
            });
        }

        tokio::time::sleep(options.poll_interval).await;
    }
}
