//! Docker network shared by the instances of one test session

use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::{debug, info};

pub struct DockerNetwork {
    name: String,
    removed: bool,
}

impl DockerNetwork {
    /// Creates a bridge network. A stale network with the same name is
    /// removed first.
    pub fn create(name: &str) -> Result<Self> {
        info!("Creating Docker network: {}", name);

        let _ = Command::new("docker")
            .args(["network", "rm", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let output = Command::new("docker")
            .args(["network", "create", name])
            .output()
            .context("Failed to run docker network create")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to create network {name}: {stderr}");
        }

        Ok(Self {
            name: name.to_string(),
            removed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the network. Fails while containers are still attached.
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }

        let output = Command::new("docker")
            .args(["network", "rm", &self.name])
            .output()
            .context("Failed to run docker network rm")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to remove network {}: {stderr}", self.name);
        }

        self.removed = true;
        info!("Removed Docker network: {}", self.name);
        Ok(())
    }
}

impl Drop for DockerNetwork {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            debug!("{}", e);
        }
    }
}
