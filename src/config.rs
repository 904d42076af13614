//! Harness configuration
//!
//! Everything the fixtures need to create instances is carried in one
//! [`HarnessConfig`] value and handed to whatever builds containers, instead
//! of living in module-level globals.

pub mod duration;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use mysql_replication::sql::REDACTED;

use crate::config::duration::parse_duration;

pub const DEFAULT_IMAGE: &str = "mysql:8.4.2";
pub const DEFAULT_ROOT_PASSWORD: &str = "secret";

pub const IMAGE_ENV: &str = "MYSQL_REPLICATION_IMAGE";
pub const ROOT_PASSWORD_ENV: &str = "MYSQL_REPLICATION_ROOT_PASSWORD";
pub const RESOURCE_DIR_ENV: &str = "MYSQL_REPLICATION_RESOURCE_DIR";
pub const OUT_DIR_ENV: &str = "MYSQL_REPLICATION_OUT_DIR";
pub const STARTUP_TIMEOUT_ENV: &str = "MYSQL_REPLICATION_STARTUP_TIMEOUT";
pub const WAIT_TIMEOUT_ENV: &str = "MYSQL_REPLICATION_WAIT_TIMEOUT";

#[derive(Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// MySQL server image both instances run.
    pub image: String,
    pub root_password: String,
    /// Directory holding `configs/` and `seeds/`.
    pub resource_dir: PathBuf,
    /// Host directory mounted read-write at the same path in every container,
    /// so files written by `mysqldump` are readable from the host.
    pub out_dir: PathBuf,
    pub startup_timeout: Duration,
    pub replication_timeout: Duration,
}

impl fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("image", &self.image)
            .field("root_password", &REDACTED)
            .field("resource_dir", &self.resource_dir)
            .field("out_dir", &self.out_dir)
            .field("startup_timeout", &self.startup_timeout)
            .field("replication_timeout", &self.replication_timeout)
            .finish()
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let resource_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            image: DEFAULT_IMAGE.to_string(),
            root_password: DEFAULT_ROOT_PASSWORD.to_string(),
            out_dir: resource_dir.join(".out"),
            resource_dir,
            startup_timeout: Duration::from_secs(120),
            replication_timeout: Duration::from_secs(30),
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `MYSQL_REPLICATION_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(image) = lookup(IMAGE_ENV) {
            config.image = image;
        }
        if let Some(password) = lookup(ROOT_PASSWORD_ENV) {
            config.root_password = password;
        }
        if let Some(dir) = lookup(RESOURCE_DIR_ENV) {
            config.resource_dir = PathBuf::from(dir);
            config.out_dir = config.resource_dir.join(".out");
        }
        if let Some(dir) = lookup(OUT_DIR_ENV) {
            config.out_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = lookup(STARTUP_TIMEOUT_ENV) {
            config.startup_timeout =
                parse_duration(&timeout).with_context(|| format!("Invalid {STARTUP_TIMEOUT_ENV}"))?;
        }
        if let Some(timeout) = lookup(WAIT_TIMEOUT_ENV) {
            config.replication_timeout =
                parse_duration(&timeout).with_context(|| format!("Invalid {WAIT_TIMEOUT_ENV}"))?;
        }

        Ok(config)
    }

    pub fn source_config_dir(&self) -> PathBuf {
        self.resource_dir.join("configs").join("source")
    }

    pub fn replica_config_dir(&self) -> PathBuf {
        self.resource_dir.join("configs").join("replica")
    }

    pub fn seed_path(&self, name: &str) -> PathBuf {
        self.resource_dir.join("seeds").join(name)
    }
}
