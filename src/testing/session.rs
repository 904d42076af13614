//! One test session: a private Docker network plus the instances started on it
//!
//! Replaces shared module-level state with an explicit value. The network is
//! created with the session and removed when it is dropped, so instances have
//! to be dropped (or stopped) first.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use mysql_replication::{Connection, WaitOptions};

use crate::config::HarnessConfig;
use crate::testing::container::{ContainerSpec, MySQLContainer};
use crate::testing::network::DockerNetwork;
use crate::testing::test_helpers::generate_test_id;

/// Database the seed dataset is loaded into.
pub const EXAMPLE_DATABASE: &str = "example";
pub const MENAGERIE_SEED: &str = "menagerie.sql";

pub struct TestSession {
    config: HarnessConfig,
    id: u64,
    network: DockerNetwork,
}

impl TestSession {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let id = generate_test_id();
        let network = DockerNetwork::create(&format!("mysql-replication-{id}"))?;
        Ok(Self {
            config,
            id,
            network,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn network_name(&self) -> &str {
        self.network.name()
    }

    /// Catch-up wait bounded by the configured replication timeout.
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::with_timeout(self.config.replication_timeout)
    }

    /// Unique path in the shared output directory, e.g. for a dump. The same
    /// path is valid inside every container of the session.
    pub fn out_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.out_dir()?.join(format!("{name}-{}.sql", self.id)))
    }

    // Docker needs absolute paths for bind mounts
    fn out_dir(&self) -> Result<PathBuf> {
        let out_dir = &self.config.out_dir;
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
        out_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", out_dir.display()))
    }

    /// An instance configured as a replication source (`server_id` 1).
    pub async fn source(&self) -> Result<MySQLInstance> {
        self.instance("source", &self.config.source_config_dir())
            .await
    }

    /// An instance configured as a replica (`server_id` 2).
    pub async fn replica(&self) -> Result<MySQLInstance> {
        self.instance("replica", &self.config.replica_config_dir())
            .await
    }

    /// A source with the menagerie dataset loaded into `example`, which is
    /// left as the session's current database.
    pub async fn loaded_source(&self) -> Result<MySQLInstance> {
        let source = self.source().await?;
        let conn = source.connection();
        conn.execute(&format!("CREATE DATABASE {EXAMPLE_DATABASE}"))
            .await?;
        conn.execute(&format!("USE {EXAMPLE_DATABASE}")).await?;
        conn.execute_from_file(self.config.seed_path(MENAGERIE_SEED))
            .await
            .context("Failed to load menagerie seed")?;
        Ok(source)
    }

    async fn instance(&self, role: &str, config_dir: &Path) -> Result<MySQLInstance> {
        let out_dir = self.out_dir()?;
        let config_dir = config_dir
            .canonicalize()
            .with_context(|| format!("Missing config directory {}", config_dir.display()))?;

        let spec = ContainerSpec {
            name: format!("{role}-{}", self.id),
            image: self.config.image.clone(),
            network: self.network.name().to_string(),
            root_password: self.config.root_password.clone(),
            config_dir,
            out_dir,
        };

        let container = MySQLContainer::start(&spec)?;
        if let Err(e) = container
            .wait_until_ready(self.config.startup_timeout)
            .await
        {
            let logs = container.get_logs().unwrap_or_default();
            return Err(e.context(format!("{} failed to start\n{logs}", spec.name)));
        }

        let connection = container.connection().await?;
        info!("{} instance ready at {}", role, connection.endpoint());
        Ok(MySQLInstance {
            connection,
            container,
        })
    }
}

/// A started container and the session connection to it.
pub struct MySQLInstance {
    // Declared first so the connection drops before the container is stopped
    connection: Connection,
    container: MySQLContainer,
}

impl MySQLInstance {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn container(&self) -> &MySQLContainer {
        &self.container
    }

    pub fn logs(&self) -> Result<String> {
        self.container.get_logs()
    }

    /// Disconnects and removes the container.
    pub async fn stop(self) -> Result<()> {
        let Self {
            connection,
            container,
        } = self;
        connection.disconnect().await?;
        container.stop()
    }
}
