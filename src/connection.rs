//! Database connections
//!
//! A [`Connection`] wraps an optional native `rusqlite` handle: it exists in a
//! closed state until [`Connection::open`] and can be opened and closed any
//! number of times. Transactions are tracked with [`Transaction`] handles so a
//! command can be checked against the connection's active transaction.
//!
//! # Connection Strings
//! - Bare path: `app.db`, `:memory:`
//! - Key/value: `Data Source=app.db;Mode=ReadOnly`
//!
//! Recognised keys: `Data Source` (`DataSource`, `Filename`), `Mode`
//! (`ReadWriteCreate`, `ReadWrite`, `ReadOnly`, `Memory`). Other keys are kept
//! in the raw string; `Password`/`Pwd` values are redacted from diagnostics.
//!
//! # Stored Procedures
//! `SQLite` has no stored procedures, so each connection carries a
//! [`ProcedureCatalog`] mapping procedure names to SQL text. A
//! `StoredProcedure` command resolves its text through that catalog.

use rusqlite::OpenFlags;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{DataError, DriverError, ErrorContext, Result};

const REDACTED: &str = "*****";

/// Transaction ids are unique across connections
static NEXT_TRANSACTION: AtomicU64 = AtomicU64::new(1);

/// How the database file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
    Memory,
}

/// Parsed connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    raw: String,
    data_source: String,
    mode: OpenMode,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DataError::config("Connection string is empty"));
        }

        if !trimmed.contains('=') {
            let mode = if trimmed == ":memory:" { OpenMode::Memory } else { OpenMode::default() };
            return Ok(Self { raw: raw.to_string(), data_source: trimmed.to_string(), mode });
        }

        let mut data_source = None;
        let mut mode = OpenMode::default();
        for (key, value) in pairs(trimmed) {
            match key.to_ascii_lowercase().replace(' ', "").as_str() {
                "datasource" | "filename" => data_source = Some(value.to_string()),
                "mode" => {
                    mode = match value.to_ascii_lowercase().as_str() {
                        "readwritecreate" => OpenMode::ReadWriteCreate,
                        "readwrite" => OpenMode::ReadWrite,
                        "readonly" => OpenMode::ReadOnly,
                        "memory" => OpenMode::Memory,
                        other => {
                            return Err(DataError::config(format!(
                                "Unknown connection mode '{other}'"
                            )))
                        }
                    }
                }
                _ => {}
            }
        }

        let data_source = match (data_source, mode) {
            (Some(source), _) => source,
            (None, OpenMode::Memory) => ":memory:".to_string(),
            (None, _) => {
                return Err(DataError::config("Connection string has no 'Data Source'"));
            }
        };
        let mode = if data_source == ":memory:" { OpenMode::Memory } else { mode };

        Ok(Self { raw: raw.to_string(), data_source, mode })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    #[must_use]
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Connection string with credential values masked
    #[must_use]
    pub fn redacted(&self) -> String {
        if !self.raw.contains('=') {
            return self.raw.clone();
        }
        self.raw
            .split(';')
            .map(|part| match part.split_once('=') {
                Some((key, _)) if is_secret_key(key) => format!("{key}={REDACTED}"),
                _ => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn pairs(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

fn is_secret_key(key: &str) -> bool {
    let key = key.trim();
    key.eq_ignore_ascii_case("password") || key.eq_ignore_ascii_case("pwd")
}

/// Named SQL bodies standing in for stored procedures
#[derive(Debug, Clone, Default)]
pub struct ProcedureCatalog {
    procedures: HashMap<String, String>,
}

impl ProcedureCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a procedure; names are case-insensitive
    pub fn register(&mut self, name: impl AsRef<str>, sql: impl Into<String>) {
        self.procedures.insert(name.as_ref().to_ascii_lowercase(), sql.into());
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, sql: impl Into<String>) -> Self {
        self.register(name, sql);
        self
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.procedures.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

/// Open/closed state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Handle to a transaction begun on a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transaction {
    id: u64,
}

/// Database connection that may be open or closed
#[derive(Debug)]
pub struct Connection {
    connection_string: ConnectionString,
    native: Option<rusqlite::Connection>,
    procedures: Arc<ProcedureCatalog>,
    active_transaction: Option<Transaction>,
}

impl Connection {
    /// Create a closed connection
    pub fn new(connection_string: &str) -> Result<Self> {
        Ok(Self {
            connection_string: ConnectionString::parse(connection_string)?,
            native: None,
            procedures: Arc::new(ProcedureCatalog::default()),
            active_transaction: None,
        })
    }

    #[must_use]
    pub fn with_procedures(mut self, procedures: Arc<ProcedureCatalog>) -> Self {
        self.procedures = procedures;
        self
    }

    #[must_use]
    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    #[must_use]
    pub fn procedures(&self) -> &ProcedureCatalog {
        &self.procedures
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        if self.native.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.native.is_some()
    }

    /// Open the connection; fails if it is already open
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(DataError::invalid_operation("The connection is already open"));
        }
        self.open_native().map_err(|e| DataError::driver(e, self.context("OPEN")))
    }

    /// Close the connection; an active transaction is rolled back by the driver
    pub fn close(&mut self) -> Result<()> {
        self.close_native().map_err(|e| DataError::driver(e, self.context("CLOSE")))
    }

    /// Begin a transaction; the connection must be open and have none active
    pub fn begin_transaction(&mut self) -> Result<Transaction> {
        if self.active_transaction.is_some() {
            return Err(DataError::invalid_operation(
                "The connection already has an active transaction",
            ));
        }
        self.run_control("BEGIN")?;
        let transaction = Transaction { id: NEXT_TRANSACTION.fetch_add(1, Ordering::Relaxed) };
        self.active_transaction = Some(transaction);
        debug!(transaction = transaction.id, "transaction begun");
        Ok(transaction)
    }

    pub fn commit(&mut self, transaction: Transaction) -> Result<()> {
        self.finish(transaction, "COMMIT")
    }

    pub fn rollback(&mut self, transaction: Transaction) -> Result<()> {
        self.finish(transaction, "ROLLBACK")
    }

    #[must_use]
    pub const fn active_transaction(&self) -> Option<Transaction> {
        self.active_transaction
    }

    fn finish(&mut self, transaction: Transaction, statement: &str) -> Result<()> {
        if self.active_transaction != Some(transaction) {
            return Err(DataError::invalid_operation(
                "The transaction is not active on this connection",
            ));
        }
        self.run_control(statement)?;
        self.active_transaction = None;
        debug!(transaction = transaction.id, statement, "transaction finished");
        Ok(())
    }

    fn run_control(&mut self, statement: &str) -> Result<()> {
        let native = self.native().map_err(|e| e.with_context(self.context(statement)))?;
        native
            .execute_batch(statement)
            .map_err(|e| DataError::driver(e.into(), self.context(statement)))
    }

    pub(crate) fn native(&self) -> std::result::Result<&rusqlite::Connection, NotOpen> {
        self.native.as_ref().ok_or(NotOpen)
    }

    pub(crate) fn open_native(&mut self) -> std::result::Result<(), DriverError> {
        let source = self.connection_string.data_source();
        let native = match self.connection_string.mode() {
            OpenMode::Memory => rusqlite::Connection::open_in_memory(),
            OpenMode::ReadOnly => {
                rusqlite::Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)
            }
            OpenMode::ReadWrite => {
                rusqlite::Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_WRITE)
            }
            OpenMode::ReadWriteCreate => rusqlite::Connection::open_with_flags(
                source,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            ),
        }?;
        debug!(data_source = %source, "connection opened");
        self.native = Some(native);
        Ok(())
    }

    pub(crate) fn close_native(&mut self) -> std::result::Result<(), DriverError> {
        self.active_transaction = None;
        if let Some(native) = self.native.take() {
            native.close().map_err(|(_, e)| DriverError::from(e))?;
            debug!(data_source = %self.connection_string.data_source(), "connection closed");
        }
        Ok(())
    }

    fn context(&self, command_text: &str) -> ErrorContext {
        ErrorContext {
            connection: self.connection_string.redacted(),
            command_text: command_text.to_string(),
            command_timeout: 0,
            parameters: String::new(),
        }
    }
}

/// The connection has no native handle
#[derive(Debug, Clone, Copy)]
pub(crate) struct NotOpen;

impl NotOpen {
    pub(crate) fn with_context(self, context: ErrorContext) -> DataError {
        DataError::invalid_operation(format!(
            "Connection must be open to run '{}'",
            context.command_text
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_path() {
        let cs = ConnectionString::parse("app.db").unwrap();
        assert_eq!(cs.data_source(), "app.db");
        assert_eq!(cs.mode(), OpenMode::ReadWriteCreate);
        assert_eq!(ConnectionString::parse(":memory:").unwrap().mode(), OpenMode::Memory);
    }

    #[test]
    fn test_parse_key_value() {
        let cs = ConnectionString::parse("Data Source=/tmp/x.db; Mode=ReadOnly").unwrap();
        assert_eq!(cs.data_source(), "/tmp/x.db");
        assert_eq!(cs.mode(), OpenMode::ReadOnly);

        let cs = ConnectionString::parse("Mode=Memory").unwrap();
        assert_eq!(cs.data_source(), ":memory:");
    }

    #[test]
    fn test_parse_rejects_missing_source_and_bad_mode() {
        assert!(ConnectionString::parse("Mode=ReadOnly").is_err());
        assert!(ConnectionString::parse("Data Source=x.db;Mode=Sideways").is_err());
        assert!(ConnectionString::parse("   ").is_err());
    }

    #[test]
    fn test_redacted_masks_password() {
        let cs = ConnectionString::parse("Data Source=x.db;Password=hunter2;PWD=abc").unwrap();
        let redacted = cs.redacted();
        assert!(!redacted.contains("hunter2"));
        assert!(!redacted.contains("abc"));
        assert!(redacted.contains("Data Source=x.db"));
    }

    #[test]
    fn test_open_close_cycle() {
        let mut conn = Connection::new(":memory:").unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.open().unwrap();
        assert!(conn.is_open());
        assert!(conn.open().is_err());
        conn.close().unwrap();
        assert!(!conn.is_open());
        // closing twice is fine
        conn.close().unwrap();
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut conn = Connection::new(":memory:").unwrap();
        assert!(conn.begin_transaction().is_err());

        conn.open().unwrap();
        let tx = conn.begin_transaction().unwrap();
        assert_eq!(conn.active_transaction(), Some(tx));
        assert!(conn.begin_transaction().is_err());
        conn.commit(tx).unwrap();
        assert!(conn.active_transaction().is_none());

        // handle is single-use
        assert_eq!(conn.rollback(tx).unwrap_err().error_code(), "INVALID_OPERATION");

        let tx2 = conn.begin_transaction().unwrap();
        assert_ne!(tx, tx2);
        conn.rollback(tx2).unwrap();
    }

    #[test]
    fn test_transactions_are_distinct_across_connections() {
        let mut first = Connection::new(":memory:").unwrap();
        let mut second = Connection::new(":memory:").unwrap();
        first.open().unwrap();
        second.open().unwrap();

        let tx = first.begin_transaction().unwrap();
        let other = second.begin_transaction().unwrap();
        assert_ne!(tx, other);
        assert_eq!(second.commit(tx).unwrap_err().error_code(), "INVALID_OPERATION");
        second.commit(other).unwrap();
        first.rollback(tx).unwrap();
    }

    #[test]
    fn test_procedure_catalog_is_case_insensitive() {
        let catalog = ProcedureCatalog::new().with("CP_Menu_Load", "SELECT 1");
        assert_eq!(catalog.resolve("cp_menu_load"), Some("SELECT 1"));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.resolve("missing").is_none());
    }
}
