//! Entity Base
//!
//! Persistence pattern for business objects identified by an integer
//! surrogate key with audit columns. An entity with id 0 is transient; the
//! first successful create assigns the server's id, after which updates go
//! to the update procedure instead.
//!
//! [`Database`] supplies open connections and stored-procedure commands, and
//! loads single rows by id.

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::command::{
    CommandFactory, CommandKind, Parameter, ParameterDirection, ReaderBehavior, SqlCommand,
    SqlType, DEFAULT_COMMAND_TIMEOUT,
};
use crate::config::DataSettings;
use crate::connection::{Connection, ProcedureCatalog};
use crate::error::{DataError, Result};
use crate::fields;
use crate::record::{Record, RowSet};

/// Name of the id parameter added by [`EntityBase::add_common_update_parameters`]
pub const ID_PARAMETER: &str = "id";
/// Name of the parameter [`Database::load_by_id`] binds the id to
pub const LOAD_ID_PARAMETER: &str = "ID";
/// Audit column and parameter holding the last editor
pub const LAST_UPDATED_BY: &str = "LastUpdatedBY";
/// Audit column holding the last edit time
pub const LAST_UPDATE_DT: &str = "LastUpdateDT";
/// Declared size of the `LastUpdatedBY` parameter
pub const LAST_UPDATED_BY_SIZE: usize = 50;

/// Persistence state derived from the id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not yet created (id 0)
    Transient,
    Persisted,
}

/// Identity and audit fields shared by every entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityBase {
    pub id: i32,
    pub last_updated_by: String,
    pub last_update_dt: NaiveDateTime,
}

impl Default for EntityBase {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityBase {
    #[must_use]
    pub const fn new() -> Self {
        Self { id: 0, last_updated_by: String::new(), last_update_dt: NaiveDateTime::MIN }
    }

    /// Read `ID` and, where present and well-formed, the audit columns
    pub fn from_record<R: Record + ?Sized>(record: &R) -> Result<Self> {
        let mut base = Self::new();
        base.id = fields::get_i32(record, record.ordinal("ID")?, 0)?;

        if let Ok(Some(by)) =
            record.ordinal(LAST_UPDATED_BY).and_then(|o| fields::get_string(record, o))
        {
            base.last_updated_by = by;
        }
        if let Ok(Some(at)) =
            record.ordinal(LAST_UPDATE_DT).and_then(|o| fields::get_datetime_opt(record, o))
        {
            base.last_update_dt = at;
        }

        Ok(base)
    }

    #[must_use]
    pub const fn state(&self) -> EntityState {
        if self.id == 0 {
            EntityState::Transient
        } else {
            EntityState::Persisted
        }
    }

    /// Append `id` and `LastUpdatedBY`
    ///
    /// A transient entity's `id` is an output the create procedure fills in.
    /// A persisted entity is updated instead, so the command is retargeted
    /// at `update_procedure`.
    pub fn add_common_update_parameters(
        &self,
        command: &mut SqlCommand,
        update_procedure: &str,
    ) -> Result<()> {
        let direction = match self.state() {
            EntityState::Transient => ParameterDirection::Output,
            EntityState::Persisted => ParameterDirection::Input,
        };
        let parameters = command.parameters_mut();
        parameters.push(
            Parameter::new(ID_PARAMETER, SqlType::Int)
                .with_value(self.id)
                .with_direction(direction),
        )?;
        parameters.push(
            Parameter::new(LAST_UPDATED_BY, SqlType::VarChar)
                .with_size(LAST_UPDATED_BY_SIZE)
                .with_value(self.last_updated_by.as_str()),
        )?;

        if self.state() == EntityState::Persisted {
            command.set_text(update_procedure);
        }
        Ok(())
    }

    /// Run the command in its own transaction and close the connection
    ///
    /// The transaction is committed on success and rolled back on failure.
    /// A failed rollback is returned in place of the original error.
    pub fn update_entity(&mut self, command: &mut SqlCommand) -> Result<()> {
        let transaction = command
            .connection_mut()
            .ok_or_else(|| DataError::invalid_operation("The command has no connection"))?
            .begin_transaction()?;
        command.set_transaction(Some(transaction));

        let executed = command.execute_non_query().and_then(|_| match command.connection_mut() {
            Some(connection) => connection.commit(transaction),
            None => Err(DataError::invalid_operation("The command has no connection")),
        });
        command.set_transaction(None);

        match executed {
            Ok(()) => {
                let captured = self.capture_id(command);
                close_connection(command)?;
                captured
            }
            Err(error) => {
                warn!(
                    command_text = %command.text(),
                    error_code = error.error_code(),
                    "rolling back entity update"
                );
                let rolled_back = command
                    .connection_mut()
                    .map_or(Ok(()), |connection| connection.rollback(transaction));
                if let Err(close_error) = close_connection(command) {
                    warn!(error = %close_error, "failed to close connection after rollback");
                }
                rolled_back?;
                Err(error)
            }
        }
    }

    /// Run the command inside the caller's transaction; nothing is closed
    pub fn update_inside_transaction(&mut self, command: &mut SqlCommand) -> Result<()> {
        command.execute_non_query()?;
        self.capture_id(command)
    }

    /// Run the command and close the connection on every path; the
    /// transaction, if any, is left to the caller
    pub fn update_and_close_connection(&mut self, command: &mut SqlCommand) -> Result<()> {
        let updated = command.execute_non_query().and_then(|_| self.capture_id(command));
        let closed = close_connection(command);
        updated?;
        closed
    }

    /// Take the server-assigned id from the `id` output parameter
    fn capture_id(&mut self, command: &SqlCommand) -> Result<()> {
        if self.state() == EntityState::Persisted {
            return Ok(());
        }
        let parameter = command.parameters().get(ID_PARAMETER).ok_or_else(|| {
            DataError::invalid_operation(format!("The command has no '{ID_PARAMETER}' parameter"))
        })?;
        let id = parameter.value.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(|| {
            DataError::invalid_operation(format!(
                "The '{ID_PARAMETER}' output parameter holds '{}' rather than an id",
                parameter.value
            ))
        })?;
        debug!(id, "entity created");
        self.id = id;
        Ok(())
    }
}

fn close_connection(command: &mut SqlCommand) -> Result<()> {
    match command.connection_mut() {
        Some(connection) => connection.close(),
        None => Ok(()),
    }
}

/// Entities built on [`EntityBase`]
pub trait Entity {
    fn base(&self) -> &EntityBase;

    fn base_mut(&mut self) -> &mut EntityBase;

    fn id(&self) -> i32 {
        self.base().id
    }

    fn is_persisted(&self) -> bool {
        self.base().state() == EntityState::Persisted
    }
}

/// Access point for entities: connections, procedure commands, row loading
#[derive(Debug, Clone)]
pub struct Database {
    connection_string: String,
    factory: CommandFactory,
    procedures: Arc<ProcedureCatalog>,
    command_timeout: u32,
}

impl Database {
    pub fn new(connection_string: impl Into<String>, factory: CommandFactory) -> Self {
        Self {
            connection_string: connection_string.into(),
            factory,
            procedures: Arc::new(ProcedureCatalog::default()),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Database for a named connection string (see
    /// [`DataSettings::connection_string`]), using the settings' command
    /// timeout when set
    pub fn from_settings(
        settings: &DataSettings,
        name: Option<&str>,
        factory: CommandFactory,
    ) -> Result<Self> {
        let mut database = Self::new(settings.connection_string(name)?, factory);
        if let Some(timeout) = settings.command_timeout {
            database.command_timeout = timeout;
        }
        Ok(database)
    }

    #[must_use]
    pub fn with_procedures(mut self, procedures: Arc<ProcedureCatalog>) -> Self {
        self.procedures = procedures;
        self
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    #[must_use]
    pub const fn factory(&self) -> &CommandFactory {
        &self.factory
    }

    #[must_use]
    pub const fn command_timeout(&self) -> u32 {
        self.command_timeout
    }

    /// Open a new connection
    pub fn get_connection(&self) -> Result<Connection> {
        let mut connection = Connection::new(&self.connection_string)?
            .with_procedures(Arc::clone(&self.procedures));
        connection.open()?;
        Ok(connection)
    }

    /// Stored-procedure command on a newly opened connection
    pub fn get_stored_procedure_command(&self, procedure: &str) -> Result<SqlCommand> {
        let mut command = self.factory.create_command_on(procedure, self.get_connection()?);
        command.set_kind(CommandKind::StoredProcedure);
        command.set_timeout(self.command_timeout);
        Ok(command)
    }

    /// Run `procedure` with an `ID` parameter and return its rows positioned
    /// on the first one
    ///
    /// The connection is closed before returning on every path.
    pub fn load_by_id(&self, procedure: &str, id: i32) -> Result<RowSet> {
        let mut command = self.get_stored_procedure_command(procedure)?;
        command
            .parameters_mut()
            .push(Parameter::new(LOAD_ID_PARAMETER, SqlType::Int).with_value(id))?;

        let mut rows = match command.execute_reader_with(ReaderBehavior::CloseConnection) {
            Ok(rows) => rows,
            Err(error) => {
                if let Err(close_error) = close_connection(&mut command) {
                    warn!(error = %close_error, "failed to close connection after load failure");
                }
                return Err(error);
            }
        };

        if !rows.advance() {
            close_connection(&mut command)?;
            return Err(DataError::NotFound { procedure: procedure.to_string(), id });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Outcome;
    use crate::expectation::{Expectation, ExpectationRegistry};
    use crate::value::Value;
    use chrono::NaiveDate;

    fn scripted() -> (Arc<ExpectationRegistry>, Database) {
        let registry = Arc::new(ExpectationRegistry::new());
        let database =
            Database::new(":memory:", CommandFactory::with_registry(Arc::clone(&registry)));
        (registry, database)
    }

    #[test]
    fn test_new_is_transient() {
        let base = EntityBase::new();
        assert_eq!(base.state(), EntityState::Transient);
        assert_eq!(base.last_update_dt, NaiveDateTime::MIN);
        assert!(base.last_updated_by.is_empty());
    }

    #[test]
    fn test_from_record_reads_audit_columns() {
        let at = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().and_hms_opt(12, 30, 0).unwrap();
        let mut rows = RowSet::new(["ID", "LastUpdatedBY", "LastUpdateDT"]).with_row(vec![
            Value::Integer(12),
            Value::from("alice"),
            Value::from(at),
        ]);
        rows.advance();

        let base = EntityBase::from_record(&rows).unwrap();
        assert_eq!(base.id, 12);
        assert_eq!(base.last_updated_by, "alice");
        assert_eq!(base.last_update_dt, at);
    }

    #[test]
    fn test_from_record_tolerates_bad_audit_columns() {
        let mut rows = RowSet::new(["id", "LastUpdateDT"])
            .with_row(vec![Value::Integer(3), Value::from("not a date")]);
        rows.advance();

        let base = EntityBase::from_record(&rows).unwrap();
        assert_eq!(base.id, 3);
        assert_eq!(base.last_update_dt, NaiveDateTime::MIN);
        assert!(base.last_updated_by.is_empty());
    }

    #[test]
    fn test_from_record_requires_id() {
        let mut rows = RowSet::new(["Name"]).with_row(vec![Value::from("x")]);
        rows.advance();
        assert_eq!(EntityBase::from_record(&rows).unwrap_err().error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_common_parameters_transient() {
        let (_registry, database) = scripted();
        let mut command = database.get_stored_procedure_command("CP_Item_Create").unwrap();
        let base = EntityBase { last_updated_by: "bob".into(), ..EntityBase::new() };
        base.add_common_update_parameters(&mut command, "CP_Item_Update").unwrap();

        assert_eq!(command.text(), "CP_Item_Create");
        let id = command.parameters().get("id").unwrap();
        assert_eq!(id.direction, ParameterDirection::Output);
        let by = command.parameters().get(LAST_UPDATED_BY).unwrap();
        assert_eq!(by.size, Some(50));
        assert_eq!(by.value, Value::from("bob"));
    }

    #[test]
    fn test_common_parameters_persisted_switches_procedure() {
        let (_registry, database) = scripted();
        let mut command = database.get_stored_procedure_command("CP_Item_Create").unwrap();
        let base = EntityBase { id: 9, ..EntityBase::new() };
        base.add_common_update_parameters(&mut command, "CP_Item_Update").unwrap();

        assert_eq!(command.text(), "CP_Item_Update");
        let id = command.parameters().get("id").unwrap();
        assert_eq!(id.direction, ParameterDirection::Input);
        assert_eq!(id.value, Value::Integer(9));
    }

    #[test]
    fn test_update_entity_captures_id_and_closes() {
        let (registry, database) = scripted();
        registry.push(Expectation::affected(1).with_output("id", 42));

        let mut base = EntityBase::new();
        let mut command = database.get_stored_procedure_command("CP_Item_Create").unwrap();
        base.add_common_update_parameters(&mut command, "CP_Item_Update").unwrap();
        base.update_entity(&mut command).unwrap();

        assert_eq!(base.id, 42);
        assert!(!command.connection().unwrap().is_open());
        assert!(command.transaction().is_none());
    }

    #[test]
    fn test_update_entity_rolls_back_on_failure() {
        let (registry, database) = scripted();
        registry.push(Expectation::failing(crate::error::DriverError::new(Some(19), "constraint")));

        let mut base = EntityBase::new();
        let mut command = database.get_stored_procedure_command("CP_Item_Create").unwrap();
        base.add_common_update_parameters(&mut command, "CP_Item_Update").unwrap();

        let err = base.update_entity(&mut command).unwrap_err();
        assert_eq!(err.error_code(), "DRIVER_FAILURE");
        assert_eq!(base.id, 0);
        assert!(!command.connection().unwrap().is_open());
    }

    #[test]
    fn test_null_output_id_is_error() {
        let (registry, database) = scripted();
        registry.push(Expectation::affected(1));

        let mut base = EntityBase::new();
        let mut command = database.get_stored_procedure_command("CP_Item_Create").unwrap();
        base.add_common_update_parameters(&mut command, "CP_Item_Update").unwrap();

        let err = base.update_and_close_connection(&mut command).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
        assert!(!command.connection().unwrap().is_open());
    }

    #[test]
    fn test_update_inside_transaction_leaves_connection_open() {
        let (registry, database) = scripted();
        registry.push(Expectation::affected(1));

        let mut base = EntityBase { id: 5, ..EntityBase::new() };
        let mut command = database.get_stored_procedure_command("CP_Item_Create").unwrap();
        base.add_common_update_parameters(&mut command, "CP_Item_Update").unwrap();
        base.update_inside_transaction(&mut command).unwrap();

        assert_eq!(base.id, 5);
        assert!(command.connection().unwrap().is_open());
    }

    #[test]
    fn test_load_by_id_not_found() {
        let (registry, database) = scripted();
        registry.push(Expectation::returning(Outcome::Rows(RowSet::new(["ID"]))));

        let err = database.load_by_id("CP_Item_Load", 77).unwrap_err();
        assert!(matches!(
            err,
            DataError::NotFound { ref procedure, id: 77 } if procedure == "CP_Item_Load"
        ));
    }

    #[test]
    fn test_load_by_id_positions_on_first_row() {
        let (registry, database) = scripted();
        registry.push(
            Expectation::rows(RowSet::new(["ID"]).with_row(vec![Value::Integer(77)]))
                .with_command_text("CP_Item_Load")
                .with_parameters(vec![Parameter::new("ID", SqlType::Int).with_value(77)]),
        );

        let rows = database.load_by_id("CP_Item_Load", 77).unwrap();
        assert_eq!(fields::get_i32(&rows, 0, 0).unwrap(), 77);
        assert!(registry.mismatches().is_empty());
    }

    #[test]
    fn test_from_settings_applies_timeout() {
        let mut settings = DataSettings::default();
        settings.connection_strings.insert(
            "ConnectionString".into(),
            crate::config::StoredConnectionString::literal(":memory:"),
        );
        settings.command_timeout = Some(90);

        let database = Database::from_settings(&settings, None, CommandFactory::live()).unwrap();
        assert_eq!(database.connection_string(), ":memory:");
        let command = database.get_stored_procedure_command("CP_X").unwrap();
        assert_eq!(command.timeout(), 90);
        assert_eq!(command.kind(), CommandKind::StoredProcedure);
    }
}
