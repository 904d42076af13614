//! `mysqldump` invocation
//!
//! The dump utility runs next to the server it reads from: inside the
//! container via `docker exec`, or as a local binary pointed at a host and
//! port. The password travels through `MYSQL_PWD` so it never shows up in
//! the argument list.

use std::fmt;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ReplicationError, Result};
use crate::sql::REDACTED;

/// Flags for a dump that can seed a replica: a consistent InnoDB snapshot with
/// the source coordinates recorded as a comment.
pub const DEFAULT_DUMP_FLAGS: &[&str] = &["--single-transaction", "--source-data=2"];

/// How to run `mysqldump` against one instance.
#[derive(Clone, PartialEq, Eq)]
pub enum DumpRunner {
    /// Run inside a container; the output path must be on a volume mounted at
    /// the same path on the host.
    DockerExec {
        container: String,
        user: String,
        password: String,
    },
    /// Run a `mysqldump` binary from `PATH`.
    Local {
        host: String,
        port: u16,
        user: String,
        password: String,
    },
    /// Dumping is not supported for this connection.
    Unavailable,
}

impl fmt::Debug for DumpRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpRunner::DockerExec {
                container, user, ..
            } => f
                .debug_struct("DockerExec")
                .field("container", container)
                .field("user", user)
                .field("password", &REDACTED)
                .finish(),
            DumpRunner::Local {
                host, port, user, ..
            } => f
                .debug_struct("Local")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("password", &REDACTED)
                .finish(),
            DumpRunner::Unavailable => f.write_str("Unavailable"),
        }
    }
}

impl DumpRunner {
    /// Program, arguments and password for a dump of `database` into
    /// `output_path`, or `None` when dumping is unavailable.
    pub fn command_line(
        &self,
        database: &str,
        output_path: &Path,
        flags: &[&str],
    ) -> Option<(String, Vec<String>, String)> {
        let output = output_path.to_string_lossy().to_string();
        let (program, mut args, user, password) = match self {
            DumpRunner::DockerExec {
                container,
                user,
                password,
            } => (
                "docker".to_string(),
                vec![
                    "exec".to_string(),
                    "-e".to_string(),
                    "MYSQL_PWD".to_string(),
                    container.clone(),
                    "mysqldump".to_string(),
                ],
                user,
                password,
            ),
            DumpRunner::Local {
                host,
                port,
                user,
                password,
            } => (
                "mysqldump".to_string(),
                vec![
                    "-h".to_string(),
                    host.clone(),
                    "-P".to_string(),
                    port.to_string(),
                    "--protocol=TCP".to_string(),
                ],
                user,
                password,
            ),
            DumpRunner::Unavailable => return None,
        };

        args.push(format!("-u{user}"));
        args.push("-r".to_string());
        args.push(output);
        args.extend(flags.iter().map(|flag| flag.to_string()));
        args.push(database.to_string());

        Some((program, args, password.clone()))
    }

    /// Dumps `database` to `output_path`. A non-zero exit status is a
    /// [`ReplicationError::Dump`] carrying the utility's stderr.
    pub async fn run(&self, database: &str, output_path: &Path, flags: &[&str]) -> Result<()> {
        let Some((program, args, password)) = self.command_line(database, output_path, flags)
        else {
            return Err(ReplicationError::Dump {
                database: database.to_string(),
                status: "unavailable".to_string(),
                stderr: "no dump runner configured for this connection".to_string(),
            });
        };

        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(&program)
            .args(&args)
            .env("MYSQL_PWD", password)
            .output()
            .await
            .map_err(|e| ReplicationError::Dump {
                database: database.to_string(),
                status: format!("failed to spawn {program}"),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ReplicationError::Dump {
                database: database.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Dumped database '{}' to {}", database, output_path.display());
        Ok(())
    }
}
