//! Binary log coordinates
//!
//! A [`BinlogReference`] names a point in the source's binary log by file and
//! byte offset. Everything written before that point is in the log; a replica
//! configured with the reference resumes applying from there.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ReplicationError;

/// A `(filename, position)` coordinate in a source's binary log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinlogReference {
    pub filename: String,
    pub position: u64,
}

impl BinlogReference {
    pub fn new(filename: impl Into<String>, position: u64) -> Self {
        Self {
            filename: filename.into(),
            position,
        }
    }

    /// Splits `binlog.000042` into `("binlog", 42)`.
    fn file_parts(&self) -> Option<(&str, u64)> {
        let (base, sequence) = self.filename.rsplit_once('.')?;
        Some((base, sequence.parse().ok()?))
    }
}

impl fmt::Display for BinlogReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.position)
    }
}

/// Only references into the same log sequence are comparable; files with a
/// different base name yield `None`.
impl PartialOrd for BinlogReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.filename == other.filename {
            return Some(self.position.cmp(&other.position));
        }

        let (base, sequence) = self.file_parts()?;
        let (other_base, other_sequence) = other.file_parts()?;
        if base != other_base {
            return None;
        }

        Some(
            sequence
                .cmp(&other_sequence)
                .then(self.position.cmp(&other.position)),
        )
    }
}

/// Parses the `filename:position` form produced by `Display`.
impl FromStr for BinlogReference {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (filename, position) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| ReplicationError::InvalidReference(format!("expected file:position, got '{s}'")))?;

        if filename.is_empty() {
            return Err(ReplicationError::InvalidReference(format!(
                "missing file name in '{s}'"
            )));
        }

        let position = position.parse::<u64>().map_err(|e| {
            ReplicationError::InvalidReference(format!("invalid position in '{s}': {e}"))
        })?;

        Ok(Self::new(filename, position))
    }
}

/// Extracts the coordinates `mysqldump --source-data` records in its output.
///
/// Both the live (`--source-data=1`) and the commented (`--source-data=2`)
/// forms are recognised, as is the pre-8.0.23 `CHANGE MASTER TO` spelling.
pub fn dump_source_coordinates(dump: &str) -> Option<BinlogReference> {
    dump.lines().find_map(parse_change_source_line)
}

fn parse_change_source_line(line: &str) -> Option<BinlogReference> {
    let line = line.trim_start_matches(|c: char| c == '-' || c.is_whitespace());
    let upper = line.to_ascii_uppercase();
    if !upper.starts_with("CHANGE REPLICATION SOURCE TO") && !upper.starts_with("CHANGE MASTER TO") {
        return None;
    }

    let mut filename = None;
    let mut position = None;
    for assignment in line.trim_end_matches(';').split(',') {
        let Some((key, value)) = assignment.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();
        if key.ends_with("SOURCE_LOG_FILE") || key.ends_with("MASTER_LOG_FILE") {
            filename = Some(value.trim_matches('\'').to_string());
        } else if key.ends_with("SOURCE_LOG_POS") || key.ends_with("MASTER_LOG_POS") {
            position = value.parse::<u64>().ok();
        }
    }

    Some(BinlogReference::new(filename?, position?))
}
