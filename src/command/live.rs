//! Live execution through the native driver

use rusqlite::Statement;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    base_name, CommandKind, Executable, ExecuteRequest, Outcome, ParameterCollection,
    ParameterDirection, SqlCommand, TranslationTable,
};
use crate::connection::{Connection, NotOpen, Transaction};
use crate::error::{DataError, DriverError, DriverFailure, ErrorContext, Result};
use crate::record::RowSet;
use crate::value::Value;

/// Runs commands against their connection and enriches driver failures
#[derive(Debug, Clone, Default)]
pub struct LiveCommand {
    translations: TranslationTable,
}

impl LiveCommand {
    #[must_use]
    pub const fn new(translations: TranslationTable) -> Self {
        Self { translations }
    }

    #[must_use]
    pub const fn translations(&self) -> &TranslationTable {
        &self.translations
    }

    /// Attach command diagnostics to a driver error, then translate it if the
    /// table knows its code
    fn enrich(&self, error: DriverError, context: ErrorContext) -> DataError {
        let failure = Box::new(DriverFailure { error, context });
        match self.translations.translate(&failure.error) {
            Some(kind) => {
                info!(
                    %kind,
                    code = ?failure.error.code,
                    command_text = %failure.context.command_text,
                    "driver failure translated"
                );
                DataError::Translated { kind, failure }
            }
            None => {
                debug!(
                    error = %failure.error,
                    command_text = %failure.context.command_text,
                    "driver failure"
                );
                DataError::Driver(failure)
            }
        }
    }

    fn run(
        command: &mut SqlCommand,
        request: ExecuteRequest,
    ) -> std::result::Result<Outcome, Failure> {
        let text = command.text().to_string();
        let kind = command.kind();
        let timeout = command.timeout();
        let transaction = command.transaction();
        let (connection, parameters) = command.parts_mut();
        let connection = connection.ok_or_else(|| {
            Failure::Other(DataError::invalid_operation("The command has no connection"))
        })?;
        check_transaction(connection, transaction)?;

        let scope = ConnectionScope::enter(connection)?;
        let sql = resolve_text(scope.connection(), &text, kind)?;
        let native = scope.connection().native()?;

        if timeout > 0 {
            native.busy_timeout(Duration::from_secs(u64::from(timeout)))?;
        }
        let mut statement = native.prepare(&sql)?;
        bind(&mut statement, parameters)?;

        let columns: Vec<String> = statement.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let readonly = statement.readonly();
        let changes_before = native.total_changes();
        let mut rows = RowSet::new(columns);
        {
            let mut cursor = statement.raw_query();
            while let Some(row) = cursor.next()? {
                let values = (0..width)
                    .map(|i| row.get_ref(i).map(Value::from))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.push_row(values).map_err(Failure::Other)?;
            }
        }
        // changes() still reports the last DML statement after DDL
        let affected = if readonly {
            -1
        } else if native.total_changes() == changes_before {
            0
        } else {
            i64::try_from(native.changes()).unwrap_or(i64::MAX)
        };
        drop(statement);
        drop(scope);

        assign_outputs(parameters, &rows, affected);
        Ok(shape(request, rows, affected))
    }
}

impl Executable for LiveCommand {
    fn name(&self) -> &'static str {
        "live"
    }

    fn execute(&self, command: &mut SqlCommand, request: ExecuteRequest) -> Result<Outcome> {
        Self::run(command, request).map_err(|failure| match failure {
            Failure::Driver(error) => self.enrich(error, command.error_context()),
            Failure::Other(error) => error,
        })
    }

    fn prepare(&self, command: &SqlCommand) -> Result<()> {
        let connection = command
            .connection()
            .ok_or_else(|| DataError::invalid_operation("The command has no connection"))?;
        let native = connection.native().map_err(|e| e.with_context(command.error_context()))?;
        let prepared = resolve_text(connection, command.text(), command.kind())
            .and_then(|sql| native.prepare(&sql).map(drop).map_err(DriverError::from));
        prepared.map_err(|error| self.enrich(error, command.error_context()))
    }
}

/// Failure inside a live run, before diagnostics are attached
enum Failure {
    Driver(DriverError),
    Other(DataError),
}

impl From<rusqlite::Error> for Failure {
    fn from(error: rusqlite::Error) -> Self {
        Self::Driver(error.into())
    }
}

impl From<DriverError> for Failure {
    fn from(error: DriverError) -> Self {
        Self::Driver(error)
    }
}

impl From<NotOpen> for Failure {
    fn from(_: NotOpen) -> Self {
        Self::Other(DataError::invalid_operation("The connection is not open"))
    }
}

/// Opens a closed connection for the duration of one call and closes it
/// again on drop; a connection that was already open is left open
struct ConnectionScope<'a> {
    connection: &'a mut Connection,
    opened: bool,
}

impl<'a> ConnectionScope<'a> {
    fn enter(connection: &'a mut Connection) -> std::result::Result<Self, DriverError> {
        let opened = !connection.is_open();
        if opened {
            connection.open_native()?;
        }
        Ok(Self { connection, opened })
    }

    fn connection(&self) -> &Connection {
        &*self.connection
    }
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        if self.opened {
            if let Err(error) = self.connection.close_native() {
                warn!(%error, "failed to close connection after command");
            }
        }
    }
}

fn check_transaction(
    connection: &Connection,
    transaction: Option<Transaction>,
) -> std::result::Result<(), Failure> {
    let active = connection.active_transaction();
    let message = match (transaction, active) {
        (Some(tx), Some(current)) if tx == current => return Ok(()),
        (None, None) => return Ok(()),
        (Some(_), _) => "The command's transaction is not active on its connection",
        (None, Some(_)) => {
            "The connection has an active transaction; assign it to the command before executing"
        }
    };
    Err(Failure::Other(DataError::invalid_operation(message)))
}

fn resolve_text(
    connection: &Connection,
    text: &str,
    kind: CommandKind,
) -> std::result::Result<String, DriverError> {
    match kind {
        CommandKind::Text => Ok(text.to_string()),
        CommandKind::StoredProcedure => {
            connection.procedures().resolve(text.trim()).map(str::to_string).ok_or_else(|| {
                DriverError::new(None, format!("Could not find stored procedure '{}'", text.trim()))
            })
        }
    }
}

/// Bind by name for `@x`/`:x`/`$x` placeholders; `?` and `?N` take input
/// parameters positionally
fn bind(
    statement: &mut Statement<'_>,
    parameters: &ParameterCollection,
) -> std::result::Result<(), Failure> {
    let inputs: Vec<_> = parameters.iter().filter(|p| p.direction.is_input()).collect();
    let mut next_positional = 0;
    let null = Value::Null;

    for index in 1..=statement.parameter_count() {
        let name = statement.parameter_name(index).map(str::to_string);
        let parameter = match name.as_deref() {
            Some(numbered) if numbered.starts_with('?') => numbered[1..]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| inputs.get(i).copied()),
            Some(named) => parameters.get(named),
            None => {
                next_positional += 1;
                inputs.get(next_positional - 1).copied()
            }
        };
        let parameter = parameter.ok_or_else(|| {
            let label = name.unwrap_or_else(|| format!("#{index}"));
            DriverError::new(
                None,
                format!("The statement expects parameter '{label}', which was not supplied"),
            )
        })?;
        let value = if parameter.direction.is_input() { &parameter.value } else { &null };
        statement.raw_bind_parameter(index, value)?;
    }
    Ok(())
}

/// Copy same-named columns of the first row onto output parameters and the
/// rows-changed count onto a return-value parameter
fn assign_outputs(parameters: &mut ParameterCollection, rows: &RowSet, affected: i64) {
    let first = rows.rows().first();
    for parameter in parameters.iter_mut() {
        if parameter.direction == ParameterDirection::ReturnValue {
            parameter.value = Value::Integer(affected.max(0));
            continue;
        }
        if !parameter.direction.is_output() {
            continue;
        }
        let name = base_name(&parameter.name);
        let column = rows.columns().iter().position(|c| c.eq_ignore_ascii_case(name));
        if let (Some(row), Some(column)) = (first, column) {
            if let Some(value) = row.get(column) {
                parameter.value = value.clone();
            }
        }
    }
}

fn shape(request: ExecuteRequest, rows: RowSet, affected: i64) -> Outcome {
    match request {
        ExecuteRequest::Reader => Outcome::Rows(rows),
        ExecuteRequest::NonQuery => Outcome::Affected(affected),
        ExecuteRequest::Scalar => Outcome::Scalar(
            rows.rows().first().and_then(|row| row.first()).cloned().unwrap_or_default(),
        ),
        ExecuteRequest::Xml => Outcome::Xml(
            rows.rows().iter().filter_map(|row| row.first()).map(ToString::to_string).collect(),
        ),
    }
}

/// Interrupts whatever statement is running on a connection
pub struct CancelHandle(rusqlite::InterruptHandle);

impl CancelHandle {
    pub(crate) fn for_connection(connection: &Connection) -> Option<Self> {
        connection.native().ok().map(|native| Self(native.get_interrupt_handle()))
    }

    /// Request cancellation; the running statement fails with an interrupt
    /// error, a no-op when nothing is running
    pub fn cancel(&self) {
        self.0.interrupt();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}
