//! Docker fixtures for source/replica replication tests
//!
//! Instances are plain `docker` CLI containers on a per-session network. The
//! source and replica get their server configuration from
//! `configs/source/` and `configs/replica/`.

pub mod container;
pub mod network;
pub mod session;
pub mod test_helpers;

pub use container::{ContainerSpec, MySQLContainer};
pub use network::DockerNetwork;
pub use session::{MySQLInstance, TestSession, EXAMPLE_DATABASE, MENAGERIE_SEED};
pub use test_helpers::{generate_test_id, init_logging};
