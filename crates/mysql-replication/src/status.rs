//! `SHOW REPLICA STATUS` decoding.

use mysql_async::Row;

use crate::binlog::BinlogReference;

/// The subset of `SHOW REPLICA STATUS` needed to tell whether a replica has
/// applied the source's log up to a coordinate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub source_host: String,
    pub source_port: u16,
    /// `Replica_IO_Running`: `Yes`, `No` or `Connecting`.
    pub io_running: String,
    /// `Replica_SQL_Running`: `Yes` or `No`.
    pub sql_running: String,
    /// Source file the IO thread is reading from.
    pub source_log_file: String,
    pub read_source_log_pos: u64,
    /// Source file containing the last event the SQL thread applied.
    pub relay_source_log_file: String,
    pub exec_source_log_pos: u64,
    pub last_io_error: String,
    pub last_sql_error: String,
    pub seconds_behind_source: Option<u64>,
}

impl ReplicaStatus {
    pub fn from_row(row: &Row) -> Self {
        let text = |column: &str| -> String {
            row.get_opt::<Option<String>, _>(column)
                .and_then(Result::ok)
                .flatten()
                .unwrap_or_default()
        };
        let number = |column: &str| -> Option<u64> {
            row.get_opt::<Option<u64>, _>(column)
                .and_then(Result::ok)
                .flatten()
        };

        Self {
            source_host: text("Source_Host"),
            source_port: number("Source_Port")
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or_default(),
            io_running: text("Replica_IO_Running"),
            sql_running: text("Replica_SQL_Running"),
            source_log_file: text("Source_Log_File"),
            read_source_log_pos: number("Read_Source_Log_Pos").unwrap_or_default(),
            relay_source_log_file: text("Relay_Source_Log_File"),
            exec_source_log_pos: number("Exec_Source_Log_Pos").unwrap_or_default(),
            last_io_error: text("Last_IO_Error"),
            last_sql_error: text("Last_SQL_Error"),
            seconds_behind_source: number("Seconds_Behind_Source"),
        }
    }

    /// Coordinate, in the source's log, up to which events have been applied.
    pub fn executed_reference(&self) -> Option<BinlogReference> {
        if self.relay_source_log_file.is_empty() {
            return None;
        }
        Some(BinlogReference::new(
            self.relay_source_log_file.clone(),
            self.exec_source_log_pos,
        ))
    }

    pub fn is_running(&self) -> bool {
        self.io_running == "Yes" && self.sql_running == "Yes"
    }

    /// True once a replication thread has stopped on an error. A thread that
    /// is still `Connecting` keeps retrying and does not count.
    pub fn stopped_with_error(&self) -> bool {
        (self.io_running == "No" && !self.last_io_error.is_empty())
            || (self.sql_running == "No" && !self.last_sql_error.is_empty())
    }

    pub fn has_caught_up(&self, target: &BinlogReference) -> bool {
        self.executed_reference()
            .is_some_and(|applied| applied >= *target)
    }
}
