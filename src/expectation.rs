//! Expectation Registry
//!
//! Queue of scripted results consumed by commands built while the registry
//! has expectations. Results are handed out strictly in the order they were
//! added; each one is consumed exactly once.
//!
//! # Matching
//! An expectation may name the command text and parameters it expects.
//! In [`MatchMode::Advisory`] a difference is logged and recorded but the
//! scripted result is still returned. In [`MatchMode::Strict`] the call fails
//! with `ExpectationMismatch`; the slot is consumed either way.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::command::{
    base_name, Executable, Outcome, Parameter, ParameterDirection, SqlCommand, SqlType,
};
use crate::error::{DataError, DriverError, Result};
use crate::record::RowSet;
use crate::value::Value;

/// A scripted result plus what the command producing it should look like
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    command_text: Option<String>,
    parameters: Option<Vec<Parameter>>,
    result: std::result::Result<Outcome, DriverError>,
    outputs: Vec<(String, Value)>,
}

impl Expectation {
    /// Expect any command and return `outcome`
    #[must_use]
    pub const fn returning(outcome: Outcome) -> Self {
        Self { command_text: None, parameters: None, result: Ok(outcome), outputs: Vec::new() }
    }

    /// Expect any command and fail it with a driver error
    #[must_use]
    pub const fn failing(error: DriverError) -> Self {
        Self { command_text: None, parameters: None, result: Err(error), outputs: Vec::new() }
    }

    #[must_use]
    pub const fn rows(rows: RowSet) -> Self {
        Self::returning(Outcome::Rows(rows))
    }

    #[must_use]
    pub const fn affected(count: i64) -> Self {
        Self::returning(Outcome::Affected(count))
    }

    #[must_use]
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::returning(Outcome::Scalar(value.into()))
    }

    #[must_use]
    pub fn xml(xml: impl Into<String>) -> Self {
        Self::returning(Outcome::Xml(xml.into()))
    }

    /// Only match commands with this text (ignored when empty)
    #[must_use]
    pub fn with_command_text(mut self, text: impl Into<String>) -> Self {
        self.command_text = Some(text.into());
        self
    }

    /// Only match commands carrying exactly these parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Value written to the command's parameter `name` when consumed
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn command_text(&self) -> Option<&str> {
        self.command_text.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> Option<&[Parameter]> {
        self.parameters.as_deref()
    }

    #[must_use]
    pub const fn result(&self) -> &std::result::Result<Outcome, DriverError> {
        &self.result
    }

    #[must_use]
    pub fn outputs(&self) -> &[(String, Value)] {
        &self.outputs
    }

    pub(crate) fn into_parts(
        self,
    ) -> (std::result::Result<Outcome, DriverError>, Vec<(String, Value)>) {
        (self.result, self.outputs)
    }

    /// Differences between this expectation and `command`
    #[must_use]
    pub fn check(&self, command: &SqlCommand) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();

        if let Some(expected) = self.command_text.as_deref().filter(|t| !t.is_empty()) {
            if expected != command.text() {
                mismatches.push(Mismatch::CommandText {
                    expected: expected.to_string(),
                    actual: command.text().to_string(),
                });
            }
        }

        let Some(expected) = &self.parameters else {
            return mismatches;
        };
        let actual = command.parameters();
        if expected.len() != actual.len() {
            mismatches.push(Mismatch::ParameterCount {
                expected: expected.len(),
                actual: actual.len(),
            });
        }
        for parameter in expected {
            let name = base_name(&parameter.name).to_string();
            let Some(found) = actual.get(&parameter.name) else {
                mismatches.push(Mismatch::MissingParameter(name));
                continue;
            };
            if found.value != parameter.value {
                mismatches.push(Mismatch::ParameterValue {
                    name: name.clone(),
                    expected: parameter.value.clone(),
                    actual: found.value.clone(),
                });
            }
            if found.direction != parameter.direction {
                mismatches.push(Mismatch::ParameterDirection {
                    name: name.clone(),
                    expected: parameter.direction,
                    actual: found.direction,
                });
            }
            if found.sql_type != parameter.sql_type {
                mismatches.push(Mismatch::ParameterType {
                    name,
                    expected: parameter.sql_type,
                    actual: found.sql_type,
                });
            }
        }
        mismatches
    }
}

/// One way a command differed from the expectation it consumed
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    CommandText { expected: String, actual: String },
    ParameterCount { expected: usize, actual: usize },
    MissingParameter(String),
    ParameterValue { name: String, expected: Value, actual: Value },
    ParameterDirection { name: String, expected: ParameterDirection, actual: ParameterDirection },
    ParameterType { name: String, expected: SqlType, actual: SqlType },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommandText { expected, actual } => {
                write!(f, "command text '{actual}' does not match expected '{expected}'")
            }
            Self::ParameterCount { expected, actual } => {
                write!(f, "expected {expected} parameters, command has {actual}")
            }
            Self::MissingParameter(name) => write!(f, "parameter '{name}' is missing"),
            Self::ParameterValue { name, expected, actual } => {
                write!(f, "parameter '{name}' has value '{actual}', expected '{expected}'")
            }
            Self::ParameterDirection { name, expected, actual } => {
                write!(f, "parameter '{name}' has direction {actual}, expected {expected}")
            }
            Self::ParameterType { name, expected, actual } => {
                write!(f, "parameter '{name}' has type {actual}, expected {expected}")
            }
        }
    }
}

/// What happens when a command does not match its expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Log and record the mismatch, return the scripted result anyway
    #[default]
    Advisory,
    /// Fail the call with `ExpectationMismatch`
    Strict,
}

#[derive(Debug, Default)]
struct RegistryState {
    expectations: Vec<Expectation>,
    calls: usize,
    mock: Option<Arc<dyn Executable>>,
    mismatches: Vec<Mismatch>,
}

/// Shared queue of scripted results
#[derive(Debug, Default)]
pub struct ExpectationRegistry {
    state: Mutex<RegistryState>,
    mode: MatchMode,
}

impl ExpectationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that fails mismatching commands
    #[must_use]
    pub fn strict() -> Self {
        Self::with_mode(MatchMode::Strict)
    }

    #[must_use]
    pub fn with_mode(mode: MatchMode) -> Self {
        Self { state: Mutex::default(), mode }
    }

    #[must_use]
    pub const fn mode(&self) -> MatchMode {
        self.mode
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a result, optionally constrained by command text and parameters
    pub fn add_expectation(
        &self,
        command_text: Option<&str>,
        parameters: Option<Vec<Parameter>>,
        result: Outcome,
    ) {
        let mut expectation = Expectation::returning(result);
        if let Some(text) = command_text {
            expectation = expectation.with_command_text(text);
        }
        if let Some(parameters) = parameters {
            expectation = expectation.with_parameters(parameters);
        }
        self.push(expectation);
    }

    pub fn push(&self, expectation: Expectation) {
        let mut state = self.lock();
        state.expectations.push(expectation);
        debug!(defined = state.expectations.len(), "expectation added");
    }

    /// Whether any expectation has been added since the last clear
    #[must_use]
    pub fn has_expectations(&self) -> bool {
        !self.lock().expectations.is_empty()
    }

    /// Number of expectations added since the last clear
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().expectations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of expectations consumed so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Drop every expectation, the mock executor and recorded mismatches
    pub fn clear(&self) {
        let mut state = self.lock();
        *state = RegistryState::default();
        debug!("expectation registry cleared");
    }

    /// Executor handed to every command built while it is set
    pub fn set_mock_executor(&self, executor: Arc<dyn Executable>) {
        self.lock().mock = Some(executor);
    }

    #[must_use]
    pub fn mock_executor(&self) -> Option<Arc<dyn Executable>> {
        self.lock().mock.clone()
    }

    /// Mismatches recorded in advisory mode
    #[must_use]
    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.lock().mismatches.clone()
    }

    /// Claim the next expectation for `command`
    pub fn consume_next(&self, command: &SqlCommand) -> Result<Expectation> {
        let mut state = self.lock();
        let defined = state.expectations.len();
        let Some(expectation) = state.expectations.get(state.calls).cloned() else {
            return Err(DataError::RegistryExhausted { call: state.calls + 1, defined });
        };
        state.calls += 1;

        let mismatches = expectation.check(command);
        if mismatches.is_empty() {
            return Ok(expectation);
        }
        match self.mode {
            MatchMode::Strict => Err(DataError::ExpectationMismatch(mismatches)),
            MatchMode::Advisory => {
                for mismatch in &mismatches {
                    warn!(call = state.calls, %mismatch, "command does not match expectation");
                }
                state.mismatches.extend(mismatches);
                Ok(expectation)
            }
        }
    }
}
