//! SQL Command Wrapper
//!
//! [`SqlCommand`] carries everything a statement needs (text, kind, timeout,
//! parameters, connection, transaction) and hands execution to an
//! [`Executable`] chosen when the command is built:
//!
//! - [`LiveCommand`] - runs the statement through the native driver and
//!   enriches failures with command diagnostics
//! - [`ScriptedCommand`] - returns the next result queued in an
//!   [`ExpectationRegistry`](crate::expectation::ExpectationRegistry)
//!
//! [`CommandFactory`] makes that choice, so calling code never branches on
//! whether it is under test.

mod live;
pub mod parameter;
mod scripted;
pub mod translate;

use std::sync::Arc;
use tracing::debug;

pub use live::{CancelHandle, LiveCommand};
pub use parameter::{base_name, Parameter, ParameterCollection, ParameterDirection, SqlType};
pub use scripted::ScriptedCommand;
pub use translate::TranslationTable;

use crate::connection::{Connection, Transaction};
use crate::error::{DataError, ErrorContext, Result, NO_CONNECTION};
use crate::expectation::ExpectationRegistry;
use crate::record::RowSet;
use crate::util::NamedEnum;
use crate::value::Value;

/// Timeout applied to new commands, in seconds
pub const DEFAULT_COMMAND_TIMEOUT: u32 = 30;

/// How the command text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum CommandKind {
    /// SQL statement text
    #[default]
    Text,
    /// Name of a procedure in the connection's catalog
    StoredProcedure,
}

impl NamedEnum for CommandKind {
    const VARIANTS: &'static [Self] = &[Self::Text, Self::StoredProcedure];

    fn name(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::StoredProcedure => "StoredProcedure",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which execute operation is being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteRequest {
    Reader,
    NonQuery,
    Scalar,
    Xml,
}

impl ExecuteRequest {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "execute_reader",
            Self::NonQuery => "execute_non_query",
            Self::Scalar => "execute_scalar",
            Self::Xml => "execute_xml_reader",
        }
    }
}

/// Reader post-processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderBehavior {
    #[default]
    Default,
    /// Close the command's connection once the rows have been read
    CloseConnection,
}

/// Result of an execute operation, live or scripted
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "lowercase")]
pub enum Outcome {
    Rows(RowSet),
    Affected(i64),
    Scalar(Value),
    Xml(String),
}

impl Outcome {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rows(_) => "rows",
            Self::Affected(_) => "affected",
            Self::Scalar(_) => "scalar",
            Self::Xml(_) => "xml",
        }
    }

    fn shape_error(&self, request: ExecuteRequest) -> DataError {
        DataError::ResultShape { expected: request.as_str(), found: self.kind() }
    }

    pub fn into_rows(self) -> Result<RowSet> {
        match self {
            Self::Rows(rows) => Ok(rows),
            other => Err(other.shape_error(ExecuteRequest::Reader)),
        }
    }

    pub fn into_affected(self) -> Result<i64> {
        match self {
            Self::Affected(n) | Self::Scalar(Value::Integer(n)) => Ok(n),
            other => Err(other.shape_error(ExecuteRequest::NonQuery)),
        }
    }

    pub fn into_scalar(self) -> Result<Value> {
        match self {
            Self::Scalar(value) => Ok(value),
            Self::Affected(n) => Ok(Value::Integer(n)),
            Self::Rows(rows) => {
                Ok(rows.rows().first().and_then(|row| row.first()).cloned().unwrap_or_default())
            }
            other @ Self::Xml(_) => Err(other.shape_error(ExecuteRequest::Scalar)),
        }
    }

    pub fn into_xml(self) -> Result<String> {
        match self {
            Self::Xml(xml) | Self::Scalar(Value::Text(xml)) => Ok(xml),
            other => Err(other.shape_error(ExecuteRequest::Xml)),
        }
    }

    /// Cast to the shape the request returns
    pub fn cast(self, request: ExecuteRequest) -> Result<Self> {
        Ok(match request {
            ExecuteRequest::Reader => Self::Rows(self.into_rows()?),
            ExecuteRequest::NonQuery => Self::Affected(self.into_affected()?),
            ExecuteRequest::Scalar => Self::Scalar(self.into_scalar()?),
            ExecuteRequest::Xml => Self::Xml(self.into_xml()?),
        })
    }
}

/// Strategy that carries out a command's execute operations
pub trait Executable: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run the command and return a result of the requested shape
    fn execute(&self, command: &mut SqlCommand, request: ExecuteRequest) -> Result<Outcome>;

    /// Validate the command without running it
    fn prepare(&self, _command: &SqlCommand) -> Result<()> {
        Ok(())
    }
}

/// A SQL statement or stored procedure call
#[derive(Debug)]
pub struct SqlCommand {
    text: String,
    kind: CommandKind,
    timeout: u32,
    parameters: ParameterCollection,
    connection: Option<Connection>,
    transaction: Option<Transaction>,
    executor: Arc<dyn Executable>,
}

impl SqlCommand {
    /// Empty command executed by `executor`
    pub fn new(executor: Arc<dyn Executable>) -> Self {
        Self {
            text: String::new(),
            kind: CommandKind::Text,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            parameters: ParameterCollection::new(),
            connection: None,
            transaction: None,
            executor,
        }
    }

    /// Command executed live with no error translation
    #[must_use]
    pub fn live(text: impl Into<String>) -> Self {
        let mut command = Self::new(Arc::new(LiveCommand::default()));
        command.text = text.into();
        command
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: CommandKind) {
        self.kind = kind;
    }

    /// Timeout in seconds; 0 waits indefinitely
    #[must_use]
    pub const fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn set_timeout(&mut self, seconds: u32) {
        self.timeout = seconds;
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterCollection {
        &mut self.parameters
    }

    /// Detached parameter with default settings, ready to be configured and pushed
    #[must_use]
    pub fn create_parameter(&self) -> Parameter {
        Parameter::new(String::new(), SqlType::NVarChar)
    }

    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    /// Attach a connection, returning the one previously attached
    pub fn set_connection(&mut self, connection: Option<Connection>) -> Option<Connection> {
        std::mem::replace(&mut self.connection, connection)
    }

    pub fn take_connection(&mut self) -> Option<Connection> {
        self.connection.take()
    }

    #[must_use]
    pub const fn transaction(&self) -> Option<Transaction> {
        self.transaction
    }

    pub fn set_transaction(&mut self, transaction: Option<Transaction>) {
        self.transaction = transaction;
    }

    /// Name of the executor this command was built with
    #[must_use]
    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    pub fn execute_reader(&mut self) -> Result<RowSet> {
        self.execute_reader_with(ReaderBehavior::Default)
    }

    pub fn execute_reader_with(&mut self, behavior: ReaderBehavior) -> Result<RowSet> {
        let rows = self.dispatch(ExecuteRequest::Reader)?.into_rows()?;
        if behavior == ReaderBehavior::CloseConnection {
            if let Some(connection) = self.connection.as_mut() {
                connection.close()?;
            }
        }
        Ok(rows)
    }

    /// Run a statement that returns no rows; yields the rows affected
    /// (-1 for read-only statements)
    pub fn execute_non_query(&mut self) -> Result<i64> {
        self.dispatch(ExecuteRequest::NonQuery)?.into_affected()
    }

    /// First column of the first row, `Null` when there are no rows
    pub fn execute_scalar(&mut self) -> Result<Value> {
        self.dispatch(ExecuteRequest::Scalar)?.into_scalar()
    }

    /// First column of every row concatenated into one XML document
    pub fn execute_xml_reader(&mut self) -> Result<String> {
        self.dispatch(ExecuteRequest::Xml)?.into_xml()
    }

    /// Check the statement compiles against the open connection
    pub fn prepare(&self) -> Result<()> {
        self.executor.prepare(self)
    }

    /// Handle that interrupts a statement running on this command's
    /// connection from another thread
    #[must_use]
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.connection.as_ref().and_then(CancelHandle::for_connection)
    }

    /// Diagnostics attached to driver failures raised by this command
    #[must_use]
    pub fn error_context(&self) -> ErrorContext {
        ErrorContext {
            connection: self
                .connection
                .as_ref()
                .map_or_else(|| NO_CONNECTION.to_string(), |c| c.connection_string().redacted()),
            command_text: self.text.clone(),
            command_timeout: self.timeout,
            parameters: self.parameters.dump(),
        }
    }

    pub(crate) fn parts_mut(&mut self) -> (Option<&mut Connection>, &mut ParameterCollection) {
        (self.connection.as_mut(), &mut self.parameters)
    }

    fn dispatch(&mut self, request: ExecuteRequest) -> Result<Outcome> {
        let executor = Arc::clone(&self.executor);
        debug!(
            executor = executor.name(),
            operation = request.as_str(),
            command_text = %self.text,
            "executing command"
        );
        executor.execute(self, request)
    }
}

/// Builds commands wired to the right executor
///
/// With a registry attached, a new command is scripted while the registry
/// holds expectations, or uses the registry's mock executor when one is set.
/// Otherwise commands run live.
#[derive(Debug, Clone, Default)]
pub struct CommandFactory {
    registry: Option<Arc<ExpectationRegistry>>,
    live: Arc<LiveCommand>,
}

impl CommandFactory {
    /// Factory that always builds live commands
    #[must_use]
    pub fn live() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_registry(registry: Arc<ExpectationRegistry>) -> Self {
        Self { registry: Some(registry), ..Self::default() }
    }

    /// Translation table used by live commands
    #[must_use]
    pub fn with_translations(mut self, translations: TranslationTable) -> Self {
        self.live = Arc::new(LiveCommand::new(translations));
        self
    }

    #[must_use]
    pub fn registry(&self) -> Option<&Arc<ExpectationRegistry>> {
        self.registry.as_ref()
    }

    fn executor(&self) -> Arc<dyn Executable> {
        if let Some(registry) = &self.registry {
            if let Some(mock) = registry.mock_executor() {
                debug!(executor = mock.name(), "using injected mock executor");
                return mock;
            }
            if registry.has_expectations() {
                return Arc::new(ScriptedCommand::new(Arc::clone(registry), self.live.clone()));
            }
        }
        self.live.clone()
    }

    #[must_use]
    pub fn create_command(&self) -> SqlCommand {
        SqlCommand::new(self.executor())
    }

    #[must_use]
    pub fn create_command_with_text(&self, text: impl Into<String>) -> SqlCommand {
        let mut command = self.create_command();
        command.set_text(text);
        command
    }

    #[must_use]
    pub fn create_command_on(&self, text: impl Into<String>, connection: Connection) -> SqlCommand {
        let mut command = self.create_command_with_text(text);
        command.connection = Some(connection);
        command
    }

    #[must_use]
    pub fn create_command_in(
        &self,
        text: impl Into<String>,
        connection: Connection,
        transaction: Transaction,
    ) -> SqlCommand {
        let mut command = self.create_command_on(text, connection);
        command.transaction = Some(transaction);
        command
    }
}
