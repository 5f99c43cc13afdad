//! Scripted execution from an expectation registry

use std::sync::Arc;
use tracing::debug;

use super::{Executable, ExecuteRequest, LiveCommand, Outcome, SqlCommand};
use crate::error::{DataError, Result};
use crate::expectation::ExpectationRegistry;

/// Answers every execute call with the registry's next expectation
///
/// Once the registry has been cleared, calls fall through to `live`.
#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    registry: Arc<ExpectationRegistry>,
    live: Arc<LiveCommand>,
}

impl ScriptedCommand {
    #[must_use]
    pub const fn new(registry: Arc<ExpectationRegistry>, live: Arc<LiveCommand>) -> Self {
        Self { registry, live }
    }
}

impl Executable for ScriptedCommand {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn execute(&self, command: &mut SqlCommand, request: ExecuteRequest) -> Result<Outcome> {
        if !self.registry.has_expectations() {
            debug!(command_text = %command.text(), "registry cleared, executing live");
            return self.live.execute(command, request);
        }

        let expectation = self.registry.consume_next(command)?;
        let (result, outputs) = expectation.into_parts();

        for (name, value) in outputs {
            match command.parameters_mut().get_mut(&name) {
                Some(parameter) => parameter.value = value,
                None => debug!(parameter = %name, "scripted output has no matching parameter"),
            }
        }

        match result {
            Ok(outcome) => outcome.cast(request),
            Err(error) => Err(DataError::driver(error, command.error_context())),
        }
    }
}
