//! SQL text for the replication administration statements.
//!
//! `CREATE USER`, `GRANT` and `CHANGE REPLICATION SOURCE` do not accept
//! placeholders for account names or passwords, so values are embedded as
//! escaped string literals.

use crate::binlog::BinlogReference;
use crate::credentials::Credentials;

/// Stands in for passwords in logs, errors and `Debug` output.
pub const REDACTED: &str = "***";

pub const FLUSH_PRIVILEGES: &str = "FLUSH PRIVILEGES";
pub const FLUSH_TABLES_WITH_READ_LOCK: &str = "FLUSH TABLES WITH READ LOCK";
pub const SHOW_BINARY_LOG_STATUS: &str = "SHOW BINARY LOG STATUS";
pub const UNLOCK_TABLES: &str = "UNLOCK TABLES";
pub const SHOW_REPLICA_STATUS: &str = "SHOW REPLICA STATUS";
pub const START_REPLICA: &str = "START REPLICA";
pub const STOP_REPLICA: &str = "STOP REPLICA";
pub const RESET_REPLICA_ALL: &str = "RESET REPLICA ALL";

/// Quotes `value` as a single-quoted MySQL string literal.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\0' => quoted.push_str("\\0"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// `'user'@'host'` account name.
pub fn account(username: &str, host: &str) -> String {
    format!("{}@{}", quote_literal(username), quote_literal(host))
}

pub fn create_user(credentials: &Credentials, host: &str, if_not_exists: bool) -> String {
    format!(
        "CREATE USER {}{} IDENTIFIED BY {}",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        account(&credentials.username, host),
        quote_literal(&credentials.password)
    )
}

pub fn grant_replication(username: &str, host: &str) -> String {
    format!("GRANT REPLICATION SLAVE ON *.* TO {}", account(username, host))
}

pub fn drop_user(username: &str, host: &str) -> String {
    format!("DROP USER IF EXISTS {}", account(username, host))
}

/// Points a replica at `source_host:source_port`, resuming at `reference`.
pub fn change_replication_source(
    source_host: &str,
    source_port: u16,
    credentials: &Credentials,
    reference: &BinlogReference,
) -> String {
    format!(
        "CHANGE REPLICATION SOURCE TO \
         GET_SOURCE_PUBLIC_KEY=1, \
         SOURCE_SSL=1, \
         SOURCE_HOST={}, \
         SOURCE_PORT={}, \
         SOURCE_USER={}, \
         SOURCE_PASSWORD={}, \
         SOURCE_LOG_FILE={}, \
         SOURCE_LOG_POS={}",
        quote_literal(source_host),
        source_port,
        quote_literal(&credentials.username),
        quote_literal(&credentials.password),
        quote_literal(&reference.filename),
        reference.position
    )
}

pub fn show_variable(name: &str) -> String {
    format!("SHOW VARIABLES WHERE Variable_name = {}", quote_literal(name))
}

/// Shortens long statements (dump `INSERT`s) for logs and error messages.
pub fn abbreviate(statement: &str, max_chars: usize) -> String {
    match statement.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &statement[..cut]),
        None => statement.to_string(),
    }
}

/// Replaces the quoted password in `statement` for logs and error messages.
pub fn redact(statement: &str, credentials: &Credentials) -> String {
    statement.replace(&quote_literal(&credentials.password), REDACTED)
}
