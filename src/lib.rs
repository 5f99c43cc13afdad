//! sqlcommand - SQL command wrapper with scripted test results
//!
//! A thin data-access layer over `rusqlite`: a command object that enriches
//! driver failures with diagnostics and can be redirected to canned results
//! for tests, plus a base for simple entities persisted through stored
//! procedures.
//!
//! # Core Principles
//! - Calling code never branches on test vs. production; the
//!   [`CommandFactory`] picks the executor
//! - Every driver failure carries the connection, command text, timeout and
//!   parameters that produced it
//! - Scripted results are consumed in order, exactly once
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`value`] - Database values
//! - [`record`] - Result sets and the row access trait
//! - [`fields`] - Null-safe typed field accessors
//! - [`connection`] - Connections, transactions, procedure catalog
//! - [`command`] - Commands, parameters, live and scripted execution
//! - [`expectation`] - Expectation registry for scripted execution
//! - [`entity`] - Entity base and database access
//! - [`config`] - Configuration management
//! - [`util`] - Text obfuscation and enum helpers

pub mod command;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod expectation;
pub mod fields;
pub mod record;
pub mod util;
pub mod value;

// Re-export commonly used types for convenience
pub use command::{
    CancelHandle, CommandFactory, CommandKind, Executable, ExecuteRequest, LiveCommand, Outcome,
    Parameter, ParameterCollection, ParameterDirection, ReaderBehavior, ScriptedCommand,
    SqlCommand, SqlType, TranslationTable,
};
pub use config::{resolve_connection_string, DataSettings, StoredConnectionString};
pub use connection::{Connection, ConnectionString, ProcedureCatalog, Transaction};
pub use entity::{Database, Entity, EntityBase, EntityState};
pub use error::{DataError, DriverError, DriverFailure, ErrorContext, Result, TranslatedKind};
pub use expectation::{Expectation, ExpectationRegistry, MatchMode, Mismatch};
pub use record::{Record, RowSet};
pub use util::{JsLiteral, NamedEnum};
pub use value::Value;
