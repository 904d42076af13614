//! Docker container management for MySQL replication testing

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use mysql_async::{Opts, OptsBuilder};
use mysql_replication::sql::REDACTED;
use mysql_replication::{Connection, DumpRunner, Endpoint};

/// Port MySQL listens on inside the container.
pub const MYSQL_PORT: u16 = 3306;

/// Where the official image picks up extra server configuration.
const CONFIG_MOUNT: &str = "/etc/mysql/conf.d";

/// How to run one MySQL instance
#[derive(Clone)]
pub struct ContainerSpec {
    /// Container name, also the host name other containers on the network use
    pub name: String,
    pub image: String,
    pub network: String,
    pub root_password: String,
    /// Directory with `.cnf` files, mounted read-only
    pub config_dir: PathBuf,
    /// Mounted read-write at the same path inside the container
    pub out_dir: PathBuf,
}

impl fmt::Debug for ContainerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerSpec")
            .field("name", &self.name)
            .field("image", &self.image)
            .field("network", &self.network)
            .field("root_password", &REDACTED)
            .field("config_dir", &self.config_dir)
            .field("out_dir", &self.out_dir)
            .finish()
    }
}

impl ContainerSpec {
    /// Arguments for `docker run`. The root password is passed by name and
    /// read from the docker client's environment.
    pub fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--network".to_string(),
            self.network.clone(),
            "-e".to_string(),
            "MYSQL_ROOT_PASSWORD".to_string(),
            "-p".to_string(),
            format!("127.0.0.1::{MYSQL_PORT}"),
            "-v".to_string(),
            format!("{}:{CONFIG_MOUNT}:ro", self.config_dir.display()),
            "-v".to_string(),
            format!("{0}:{0}:rw", self.out_dir.display()),
            self.image.clone(),
        ]
    }
}

/// A running MySQL container, stopped and removed on drop
pub struct MySQLContainer {
    pub container_name: String,
    pub image_name: String,
    /// Loopback port mapped to the container's 3306
    pub host_port: u16,
    root_password: String,
}

impl MySQLContainer {
    /// Starts a container from `spec` and resolves its mapped port.
    pub fn start(spec: &ContainerSpec) -> Result<Self> {
        info!("Starting MySQL container: {}", spec.name);

        // First, try to stop and remove any existing container with the same name
        let _ = Command::new("docker")
            .args(["stop", &spec.name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let _ = Command::new("docker")
            .args(["rm", &spec.name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let output = Command::new("docker")
            .args(spec.run_args())
            .env("MYSQL_ROOT_PASSWORD", &spec.root_password)
            .output()
            .context("Failed to start Docker container")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to start container {}: {stderr}", spec.name);
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("Started container {}: {}", spec.name, container_id);

        // From here on the container is removed on drop if anything fails
        let mut container = Self {
            container_name: spec.name.clone(),
            image_name: spec.image.clone(),
            host_port: 0,
            root_password: spec.root_password.clone(),
        };
        container.host_port = container.resolve_host_port()?;

        Ok(container)
    }

    fn resolve_host_port(&self) -> Result<u16> {
        let output = Command::new("docker")
            .args(["port", &self.container_name, &format!("{MYSQL_PORT}/tcp")])
            .output()
            .context("Failed to run docker port")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to resolve port of {}: {stderr}", self.container_name);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_port_mapping(&stdout)
            .with_context(|| format!("Unexpected docker port output: {stdout}"))
    }

    /// Waits for MySQL to be ready to accept connections
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        info!("Waiting for {} to be ready...", self.container_name);

        let start = Instant::now();

        while start.elapsed() < timeout {
            match self.test_connection().await {
                Ok(_) => {
                    info!("{} is ready after {:?}", self.container_name, start.elapsed());
                    return Ok(());
                }
                Err(e) => {
                    debug!("Connection attempt failed: {:#}", e);
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                }
            }
        }

        anyhow::bail!(
            "{} did not become ready within {timeout:?}",
            self.container_name
        )
    }

    /// Tests if we can connect to MySQL
    async fn test_connection(&self) -> Result<()> {
        let pool = mysql_async::Pool::new(self.opts("root", &self.root_password));

        let mut conn = pool.get_conn().await.context("Failed to get connection")?;

        use mysql_async::prelude::*;
        let _: Option<i32> = conn
            .query_first("SELECT 1")
            .await
            .context("Failed to execute test query")?;

        drop(conn);
        pool.disconnect()
            .await
            .context("Failed to disconnect pool")?;

        Ok(())
    }

    /// Client options for `user` through the mapped loopback port.
    pub fn opts(&self, user: &str, password: &str) -> Opts {
        loopback_opts(self.host_port, user, password)
    }

    /// Opens a root [`Connection`] whose endpoint is the container's address
    /// on the Docker network and whose dumps run inside the container.
    pub async fn connection(&self) -> Result<Connection> {
        let dump_runner = DumpRunner::DockerExec {
            container: self.container_name.clone(),
            user: "root".to_string(),
            password: self.root_password.clone(),
        };
        self.connect_with("root", &self.root_password, dump_runner).await
    }

    /// Opens a [`Connection`] as another account. It cannot dump.
    pub async fn connection_as(&self, user: &str, password: &str) -> Result<Connection> {
        self.connect_with(user, password, DumpRunner::Unavailable).await
    }

    async fn connect_with(
        &self,
        user: &str,
        password: &str,
        dump_runner: DumpRunner,
    ) -> Result<Connection> {
        let endpoint = Endpoint::new(self.container_name.clone(), MYSQL_PORT);
        Connection::connect_with(self.opts(user, password), endpoint, dump_runner)
            .await
            .with_context(|| format!("Failed to connect to {} as {user}", self.container_name))
    }

    /// Stops and removes the container
    pub fn stop(&self) -> Result<()> {
        info!("Stopping container: {}", self.container_name);

        let output = Command::new("docker")
            .args(["stop", &self.container_name])
            .output()
            .context("Failed to stop container")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("Failed to stop container (may not exist): {}", stderr);
        }

        let output = Command::new("docker")
            .args(["rm", &self.container_name])
            .output()
            .context("Failed to remove container")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("Failed to remove container (may not exist): {}", stderr);
        }

        info!("Container stopped and removed");
        Ok(())
    }

    /// Gets logs from the container
    pub fn get_logs(&self) -> Result<String> {
        let output = Command::new("docker")
            .args(["logs", &self.container_name])
            .output()
            .context("Failed to get container logs")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(format!("STDOUT:\n{stdout}\n\nSTDERR:\n{stderr}"))
    }
}

impl Drop for MySQLContainer {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = self.stop();
    }
}

/// Options for a server published on a loopback port. Built field by field
/// so passwords need no URL escaping.
pub fn loopback_opts(port: u16, user: &str, password: &str) -> Opts {
    OptsBuilder::default()
        .ip_or_hostname("127.0.0.1")
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .into()
}

/// Host port from `docker port` output such as `127.0.0.1:49153`. Docker may
/// print one line per address family.
pub fn parse_port_mapping(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}
