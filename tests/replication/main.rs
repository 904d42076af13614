//! Source/replica replication integration tests
//!
//! Every test starts its own source and replica MySQL containers on a private
//! Docker network, so the tests can run in parallel. They need a Docker
//! daemon and are ignored by default:
//!
//! ```bash
//! cargo test --test replication -- --ignored
//! ```

mod binlog_format_truncate;
mod connect_replica;
mod dump_and_restore;
mod properties;
