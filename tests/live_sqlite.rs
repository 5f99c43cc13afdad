//! Live Execution Tests
//!
//! Runs commands against real `SQLite` files and checks:
//! - Connection lifecycle (opened and closed per call, left alone when already open)
//! - Failure enrichment (connection, command text, timeout, parameter dump)
//! - Opt-in error translation
//! - Stored procedures emulated through the procedure catalog

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlcommand::{
    CommandFactory, CommandKind, Connection, DataError, ParameterDirection, ProcedureCatalog,
    Record, SqlCommand, SqlType, TranslatedKind, TranslationTable, Value,
};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

/// Temporary database with a seeded `menu` table
fn create_test_db() -> (TempDir, String) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("menu.db");

    {
        let conn = rusqlite::Connection::open(&path).expect("Failed to create database");
        conn.execute_batch(
            "CREATE TABLE menu (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                site_access INTEGER,
                LastUpdatedBY TEXT
            );
            INSERT INTO menu (name, site_access) VALUES ('home', 1), ('admin', 9);",
        )
        .expect("Failed to seed database");
    }

    let connection_string = format!("Data Source={}", path.display());
    (dir, connection_string)
}

fn command_on(connection_string: &str, text: &str) -> SqlCommand {
    let connection = Connection::new(connection_string).expect("Failed to parse connection string");
    CommandFactory::live().create_command_on(text, connection)
}

// ============================================================================
// Connection Lifecycle
// ============================================================================

#[test]
fn test_closed_connection_is_opened_and_closed_again() {
    let (_dir, cs) = create_test_db();
    let mut command = command_on(&cs, "SELECT COUNT(*) FROM menu");

    assert!(!command.connection().unwrap().is_open());
    assert_eq!(command.execute_scalar().unwrap(), Value::Integer(2));
    assert!(!command.connection().unwrap().is_open());
}

#[test]
fn test_closed_connection_is_closed_again_on_failure() {
    let (_dir, cs) = create_test_db();
    let mut command = command_on(&cs, "SELECT * FROM missing_table");

    assert!(command.execute_reader().is_err());
    assert!(!command.connection().unwrap().is_open());
}

#[test]
fn test_open_connection_stays_open() {
    let (_dir, cs) = create_test_db();
    let mut command = command_on(&cs, "SELECT name FROM menu ORDER BY id");
    command.connection_mut().unwrap().open().unwrap();

    let rows = command.execute_reader().unwrap();
    assert_eq!(rows.row_count(), 2);
    assert!(command.connection().unwrap().is_open());

    // failure leaves it open too
    command.set_text("SELECT nope FROM menu");
    assert!(command.execute_reader().is_err());
    assert!(command.connection().unwrap().is_open());
}

#[test]
fn test_reader_close_connection_behavior() {
    let (_dir, cs) = create_test_db();
    let mut command = command_on(&cs, "SELECT id, name FROM menu WHERE id = @id");
    command.connection_mut().unwrap().open().unwrap();
    command.parameters_mut().add_with_value("@id", 2).unwrap();

    let mut rows =
        command.execute_reader_with(sqlcommand::ReaderBehavior::CloseConnection).unwrap();
    assert!(!command.connection().unwrap().is_open());
    assert!(rows.advance());
    assert_eq!(rows.value(rows.ordinal("NAME").unwrap()).unwrap(), &Value::from("admin"));
}

// ============================================================================
// Failure Enrichment
// ============================================================================

#[test]
fn test_driver_failure_carries_diagnostics() {
    let (_dir, cs) = create_test_db();
    let mut command = command_on(&cs, "INSERT INTO menu (name) VALUES (@name)");
    command.set_timeout(7);
    command.parameters_mut().add_with_value("@name", "home").unwrap();

    let err = command.execute_non_query().unwrap_err();
    assert_eq!(err.error_code(), "DRIVER_FAILURE");

    let failure = err.driver_failure().unwrap();
    assert!(failure.error.message.contains("UNIQUE"));
    // SQLITE_CONSTRAINT_UNIQUE
    assert_eq!(failure.error.code, Some(2067));
    assert_eq!(failure.context.connection, cs);
    assert_eq!(failure.context.command_text, "INSERT INTO menu (name) VALUES (@name)");
    assert_eq!(failure.context.command_timeout, 7);
    assert_eq!(
        failure.context.parameters,
        "Number of parameters: 1:\n\tParameter #0\n\tName: @name\n\tValue: home\n\tType: NVarChar\n\tDirection: Input\n\n"
    );
}

#[test]
fn test_long_string_parameter_truncated_in_dump() {
    let (_dir, cs) = create_test_db();
    let mut command = command_on(&cs, "SELECT * FROM missing WHERE note = @note");
    command.parameters_mut().add("@note", SqlType::VarChar).unwrap().value =
        Value::from("x".repeat(60));

    let err = command.execute_reader().unwrap_err();
    let dump = &err.driver_failure().unwrap().context.parameters;
    assert!(dump.contains(&format!("\tValue: {}...\n", "x".repeat(50))));
    assert!(!dump.contains(&"x".repeat(51)));
}

#[test]
fn test_password_redacted_in_diagnostics() {
    let (_dir, cs) = create_test_db();
    let mut command = command_on(&format!("{cs};Password=hunter2"), "SELECT broken(");

    let err = command.execute_scalar().unwrap_err();
    let context = &err.driver_failure().unwrap().context;
    assert!(!context.connection.contains("hunter2"));
    assert!(context.connection.ends_with("Password=*****"));
}

#[test]
fn test_open_failure_is_enriched() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.db");
    let mut command =
        command_on(&format!("Data Source={};Mode=ReadWrite", missing.display()), "SELECT 1");

    let err = command.execute_scalar().unwrap_err();
    assert_eq!(err.error_code(), "DRIVER_FAILURE");
    assert_eq!(err.driver_failure().unwrap().context.command_text, "SELECT 1");
}

// ============================================================================
// Error Translation
// ============================================================================

#[test]
fn test_default_table_does_not_translate_busy() {
    let (_dir, cs) = create_test_db();

    let mut locker = rusqlite::Connection::open(cs.trim_start_matches("Data Source=")).unwrap();
    let tx = locker.transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive).unwrap();

    let mut command = command_on(&cs, "SELECT COUNT(*) FROM menu");
    command.set_timeout(1);
    let err = command.execute_scalar().unwrap_err();
    assert_eq!(err.error_code(), "DRIVER_FAILURE");
    assert_eq!(err.driver_failure().unwrap().error.code.map(|c| c & 0xff), Some(5));

    drop(tx);
}

#[test]
fn test_standard_table_translates_busy_to_timeout() {
    let (_dir, cs) = create_test_db();

    let mut locker = rusqlite::Connection::open(cs.trim_start_matches("Data Source=")).unwrap();
    let tx = locker.transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive).unwrap();

    let factory = CommandFactory::live().with_translations(TranslationTable::sqlite_standard());
    let mut command =
        factory.create_command_on("SELECT COUNT(*) FROM menu", Connection::new(&cs).unwrap());
    command.set_timeout(1);

    let err = command.execute_scalar().unwrap_err();
    assert!(matches!(err, DataError::Translated { kind: TranslatedKind::Timeout, .. }));
    assert_eq!(err.driver_failure().unwrap().context.command_text, "SELECT COUNT(*) FROM menu");

    drop(tx);
}

// ============================================================================
// Stored Procedures
// ============================================================================

#[test]
fn test_procedure_create_returns_id_through_output_parameter() {
    let (_dir, cs) = create_test_db();
    let catalog = Arc::new(ProcedureCatalog::new().with(
        "CP_Menu_Create",
        "INSERT INTO menu (name, LastUpdatedBY) VALUES (@name, @LastUpdatedBY) RETURNING id",
    ));
    let connection = Connection::new(&cs).unwrap().with_procedures(catalog);

    let mut command = CommandFactory::live().create_command_on("CP_Menu_Create", connection);
    command.set_kind(CommandKind::StoredProcedure);
    command.parameters_mut().add_with_value("name", "reports").unwrap();
    command.parameters_mut().add_with_value("LastUpdatedBY", "carol").unwrap();
    command.parameters_mut().add("id", SqlType::Int).unwrap().direction =
        ParameterDirection::Output;

    assert_eq!(command.execute_non_query().unwrap(), 1);
    assert_eq!(command.parameters().get("id").unwrap().value, Value::Integer(3));
}

#[test]
fn test_transaction_rollback_discards_changes() {
    let (_dir, cs) = create_test_db();
    let mut connection = Connection::new(&cs).unwrap();
    connection.open().unwrap();
    let tx = connection.begin_transaction().unwrap();

    let mut command = CommandFactory::live().create_command_in(
        "DELETE FROM menu",
        connection,
        tx,
    );
    assert_eq!(command.execute_non_query().unwrap(), 2);
    command.connection_mut().unwrap().rollback(tx).unwrap();

    command.set_transaction(None);
    command.set_text("SELECT COUNT(*) FROM menu");
    assert_eq!(command.execute_scalar().unwrap(), Value::Integer(2));
}
