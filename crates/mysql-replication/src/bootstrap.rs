//! Replication bootstrap
//!
//! Establishes a file/position replication link between a source and a
//! replica. The sequence is modelled as a type-state machine so that steps can
//! only run in order:
//!
//! ```text
//! Unconfigured -> CredentialsGranted -> CoordinatesCaptured -> TargetConfigured -> Started
//! ```
//!
//! Any out-of-band snapshot of the source (e.g. a dump) has to be taken while
//! in `CoordinatesCaptured` with no writes in between to line up with the
//! captured coordinate. Alternatively, read the coordinate back out of the
//! dump and enter the state with [`ReplicationBootstrap::at_coordinates`].
//!
//! There is no way back to `Unconfigured`; tearing a link down means
//! discarding the instances.

use tracing::{info, warn};

use crate::binlog::BinlogReference;
use crate::connection::{Connection, Endpoint};
use crate::credentials::{
    grant_replication_credentials, revoke_replication_credentials, CredentialPolicy, Credentials,
    ANY_HOST,
};
use crate::error::Result;
use crate::lag::{wait_until_caught_up, WaitOptions};
use crate::sql;
use crate::status::ReplicaStatus;

/// Phase name used in logs.
pub trait BootstrapState {
    const PHASE: &'static str;
}

pub struct Unconfigured;

pub struct CredentialsGranted {
    created_user: bool,
}

pub struct CoordinatesCaptured {
    created_user: bool,
    reference: BinlogReference,
}

pub struct TargetConfigured {
    reference: BinlogReference,
}

pub struct Started {
    reference: BinlogReference,
}

impl BootstrapState for Unconfigured {
    const PHASE: &'static str = "unconfigured";
}
impl BootstrapState for CredentialsGranted {
    const PHASE: &'static str = "credentials granted";
}
impl BootstrapState for CoordinatesCaptured {
    const PHASE: &'static str = "coordinates captured";
}
impl BootstrapState for TargetConfigured {
    const PHASE: &'static str = "target configured";
}
impl BootstrapState for Started {
    const PHASE: &'static str = "started";
}

/// The established relationship: who the replica pulls from, as whom, and
/// where it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationLink {
    pub source: Endpoint,
    pub replica: Endpoint,
    pub credentials: Credentials,
    pub reference: BinlogReference,
}

pub struct ReplicationBootstrap<'a, S: BootstrapState> {
    source: &'a Connection,
    replica: &'a Connection,
    credentials: Credentials,
    allowed_host: String,
    state: S,
}

impl<'a, S: BootstrapState> ReplicationBootstrap<'a, S> {
    pub fn phase(&self) -> &'static str {
        S::PHASE
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn advance<T: BootstrapState>(self, state: T) -> ReplicationBootstrap<'a, T> {
        info!(
            "Replication {} -> {}: {}",
            self.source.endpoint(),
            self.replica.endpoint(),
            T::PHASE
        );
        ReplicationBootstrap {
            source: self.source,
            replica: self.replica,
            credentials: self.credentials,
            allowed_host: self.allowed_host,
            state,
        }
    }
}

impl<'a> ReplicationBootstrap<'a, Unconfigured> {
    pub fn new(source: &'a Connection, replica: &'a Connection, credentials: Credentials) -> Self {
        Self {
            source,
            replica,
            credentials,
            allowed_host: ANY_HOST.to_string(),
            state: Unconfigured,
        }
    }

    /// Issues the replication user on the source.
    pub async fn grant_credentials(
        mut self,
        allowed_host: &str,
        policy: CredentialPolicy,
    ) -> Result<ReplicationBootstrap<'a, CredentialsGranted>> {
        grant_replication_credentials(self.source, &self.credentials, allowed_host, policy).await?;
        self.allowed_host = allowed_host.to_string();
        Ok(self.advance(CredentialsGranted {
            created_user: policy == CredentialPolicy::Strict,
        }))
    }
}

impl<'a> ReplicationBootstrap<'a, CredentialsGranted> {
    /// Captures the source's coordinate under a global read lock.
    pub async fn capture_coordinates(self) -> Result<ReplicationBootstrap<'a, CoordinatesCaptured>> {
        let reference = self.source.binlog_reference().await?;
        let created_user = self.state.created_user;
        Ok(self.advance(CoordinatesCaptured {
            created_user,
            reference,
        }))
    }

    /// Uses a coordinate captured elsewhere, such as a dump header.
    pub fn at_coordinates(self, reference: BinlogReference) -> ReplicationBootstrap<'a, CoordinatesCaptured> {
        let created_user = self.state.created_user;
        self.advance(CoordinatesCaptured {
            created_user,
            reference,
        })
    }
}

impl<'a> ReplicationBootstrap<'a, CoordinatesCaptured> {
    pub fn reference(&self) -> &BinlogReference {
        &self.state.reference
    }

    /// Points the replica at the source and the captured coordinate.
    ///
    /// Only valid on a replica with no running replication; a started replica
    /// has to be stopped first.
    pub async fn configure_target(self) -> Result<ReplicationBootstrap<'a, TargetConfigured>> {
        let statement = sql::change_replication_source(
            self.source.host(),
            self.source.port(),
            &self.credentials,
            &self.state.reference,
        );
        self.replica
            .run_step(
                "configure target",
                &statement,
                &sql::redact(&statement, &self.credentials),
            )
            .await?;

        let reference = self.state.reference.clone();
        Ok(self.advance(TargetConfigured { reference }))
    }
}

impl<'a> ReplicationBootstrap<'a, TargetConfigured> {
    /// Starts the replica. Applying happens in the background; use
    /// [`ReplicationBootstrap::wait_until_caught_up`] before asserting on
    /// replicated data.
    pub async fn start(self) -> Result<ReplicationBootstrap<'a, Started>> {
        self.replica
            .run_step("start replica", sql::START_REPLICA, sql::START_REPLICA)
            .await?;
        let reference = self.state.reference.clone();
        Ok(self.advance(Started { reference }))
    }
}

impl<'a> ReplicationBootstrap<'a, Started> {
    pub fn link(&self) -> ReplicationLink {
        ReplicationLink {
            source: self.source.endpoint().clone(),
            replica: self.replica.endpoint().clone(),
            credentials: self.credentials.clone(),
            reference: self.state.reference.clone(),
        }
    }

    /// Waits until the replica has applied everything the source has logged
    /// as of this call.
    pub async fn wait_until_caught_up(&self, options: WaitOptions) -> Result<ReplicaStatus> {
        let target = self.source.current_binlog_position().await?;
        wait_until_caught_up(self.replica, &target, options).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub allowed_host: String,
    pub policy: CredentialPolicy,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            allowed_host: ANY_HOST.to_string(),
            policy: CredentialPolicy::default(),
        }
    }
}

/// Runs the whole sequence and returns the started link.
///
/// If a step after the grant fails and the grant created the user
/// ([`CredentialPolicy::Strict`]), the user is dropped again before the
/// original error is returned.
pub async fn bootstrap<'a>(
    source: &'a Connection,
    replica: &'a Connection,
    credentials: Credentials,
    options: &BootstrapOptions,
) -> Result<ReplicationBootstrap<'a, Started>> {
    let granted = ReplicationBootstrap::new(source, replica, credentials.clone())
        .grant_credentials(&options.allowed_host, options.policy)
        .await?;
    let created_user = granted.state.created_user;

    let result = async {
        granted
            .capture_coordinates()
            .await?
            .configure_target()
            .await?
            .start()
            .await
    }
    .await;

    if let Err(e) = &result {
        if created_user {
            warn!(
                "Bootstrap failed ({}), dropping replication user '{}'",
                e, credentials.username
            );
            if let Err(rollback) =
                revoke_replication_credentials(source, &credentials, &options.allowed_host).await
            {
                warn!("Rollback of replication user failed: {}", rollback);
            }
        }
    }

    result
}
