//! Replication user issuance on the source.

use std::fmt;

use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{server_error_code, ReplicationError, Result, ER_CANNOT_USER};
use crate::sql;

/// Host pattern that lets the replication user connect from anywhere.
pub const ANY_HOST: &str = "%";

/// Account a replica authenticates as when pulling the source's log.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &sql::REDACTED)
            .finish()
    }
}

/// What to do when issuing a replication user that may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPolicy {
    /// Plain `CREATE USER`; an existing user is a [`ReplicationError::DuplicateUser`].
    #[default]
    Strict,
    /// `CREATE USER IF NOT EXISTS`, then grant. Safe to repeat.
    IfNotExists,
    /// The user was provisioned out of band; issue nothing.
    Preexisting,
}

/// Creates the replication user on `source`, grants it `REPLICATION SLAVE`
/// and flushes privileges so the grant applies to the next login.
pub async fn grant_replication_credentials(
    source: &Connection,
    credentials: &Credentials,
    allowed_host: &str,
    policy: CredentialPolicy,
) -> Result<()> {
    const STEP: &str = "grant replication credentials";

    if policy == CredentialPolicy::Preexisting {
        debug!(
            "Skipping creation of '{}'@'{}', expected to exist",
            credentials.username, allowed_host
        );
        return Ok(());
    }

    let create = sql::create_user(
        credentials,
        allowed_host,
        policy == CredentialPolicy::IfNotExists,
    );
    source
        .run_step(STEP, &create, &sql::redact(&create, credentials))
        .await
        .map_err(|err| match err {
            ReplicationError::Execution { source, .. }
                if server_error_code(&source) == Some(ER_CANNOT_USER) =>
            {
                ReplicationError::DuplicateUser {
                    username: credentials.username.clone(),
                    host: allowed_host.to_string(),
                }
            }
            other => other,
        })?;

    let grant = sql::grant_replication(&credentials.username, allowed_host);
    source.run_step(STEP, &grant, &grant).await?;
    source
        .run_step(STEP, sql::FLUSH_PRIVILEGES, sql::FLUSH_PRIVILEGES)
        .await?;

    info!(
        "Granted replication to '{}'@'{}' on {}",
        credentials.username,
        allowed_host,
        source.endpoint()
    );
    Ok(())
}

/// Drops the replication user if it exists.
pub async fn revoke_replication_credentials(
    source: &Connection,
    credentials: &Credentials,
    allowed_host: &str,
) -> Result<()> {
    let drop = sql::drop_user(&credentials.username, allowed_host);
    source
        .run_step("revoke replication credentials", &drop, &drop)
        .await?;
    info!(
        "Dropped replication user '{}'@'{}'",
        credentials.username, allowed_host
    );
    Ok(())
}
