//! Execution driver for a single build action.
//!
//! [`BuildAction::perform_action_with`] turns an [`ActionConfig`] into one run
//! of the build engine: it builds a fresh execution context, injects
//! properties in increasing precedence (host, explicit, property files),
//! redirects the process streams into the build log and runs the selected
//! targets in order. Process-wide state is restored on every exit path.

use crate::config::ActionConfig;
use crate::context::{CALL_TARGET, CONTEXT_NAME, ExecutionContext, ExecutionPlan};
use crate::engine::{AntEngine, BuildEngine, EngineError};
use crate::error::{ActionError, Result};
use crate::host::host_properties;
use crate::level::LogLevel;
use crate::lifecycle::Phase;
use crate::logger::LoggerFactory;
use crate::properties::load_files;
use crate::redirect::{SecurityPolicyGuard, StreamRedirect};
use std::error::Error;
use std::sync::Arc;

/// A build action bound to an installer's lifecycle.
///
/// # Example
///
/// ```no_run
/// use buildcall_installer::action::BuildAction;
/// use buildcall_installer::config::ActionConfig;
///
/// let mut config = ActionConfig::new();
/// config.set_build_file(Some("build.xml".into()));
/// config.add_target("init");
/// config.add_target("deploy");
/// config.set_property("env", "prod");
///
/// BuildAction::new(config).perform_install_action()?;
/// # Ok::<(), buildcall_installer::error::ActionError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct BuildAction {
    config: ActionConfig,
}

impl BuildAction {
    /// Wrap a configuration.
    #[must_use]
    pub const fn new(config: ActionConfig) -> Self {
        Self { config }
    }

    /// The action's configuration.
    #[must_use]
    pub const fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Mutable access to the action's configuration.
    pub const fn config_mut(&mut self) -> &mut ActionConfig {
        &mut self.config
    }

    /// Run the install targets with the Ant engine.
    ///
    /// # Errors
    ///
    /// See [`BuildAction::perform_action_with`].
    pub fn perform_install_action(&self) -> Result<()> {
        self.perform_action(Phase::Install)
    }

    /// Run the uninstall targets with the Ant engine.
    ///
    /// # Errors
    ///
    /// See [`BuildAction::perform_action_with`].
    pub fn perform_uninstall_action(&self) -> Result<()> {
        self.perform_action(Phase::Uninstall)
    }

    /// Run the targets of `phase` with an Ant engine located through
    /// `ANT_HOME`.
    ///
    /// # Errors
    ///
    /// See [`BuildAction::perform_action_with`].
    pub fn perform_action(&self, phase: Phase) -> Result<()> {
        let engine = AntEngine::from_env().with_log_level(self.config.effective_log_level());
        self.perform_action_with(phase, &engine)
    }

    /// Run the targets of `phase` with `engine`.
    ///
    /// Properties are applied in increasing precedence: host properties,
    /// explicit properties, then property files in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Configuration`] if no build file is set,
    /// [`ActionError::PropertyFileMissing`] or
    /// [`ActionError::PropertyFileUnreadable`] if a property file cannot be
    /// loaded, and [`ActionError::Execution`] if the engine fails. No target
    /// runs unless every property file was loaded.
    pub fn perform_action_with(&self, phase: Phase, engine: &dyn BuildEngine) -> Result<()> {
        let plan = ExecutionPlan::for_phase(&self.config, phase)?;
        log::debug!(
            "performing {phase} build action with {} target(s)",
            plan.invocations().len()
        );

        let logger = LoggerFactory::for_config(&self.config).create();
        let _policy = SecurityPolicyGuard::save();

        let mut context = ExecutionContext::new(CONTEXT_NAME);
        context.add_listener(Arc::new(logger));
        if self.config.is_verbose() {
            context
                .listeners()
                .log(LogLevel::Info, None, &self.announcement());
        }

        context.set_properties(&host_properties());
        context.set_properties(self.config.properties());
        let from_files = load_files(self.config.property_files())?;
        context.set_properties(&from_files);
        context.add_target(plan.into_target(CALL_TARGET));

        context.fire_build_started();
        let outcome = run_redirected(&context, engine);
        let failure: Option<&(dyn Error + 'static)> = match &outcome {
            Ok(()) => None,
            Err(e) => Some(e),
        };
        context.fire_build_finished(failure);
        log::debug!("{phase} build action finished: success={}", outcome.is_ok());

        outcome.map_err(ActionError::from)
    }

    fn announcement(&self) -> String {
        let build_file = self
            .config
            .build_file()
            .map_or_else(String::new, |path| path.to_string());
        match self.config.build_dir() {
            Some(dir) => format!("Calling Ant with buildfile: {build_file} in directory {dir}"),
            None => format!("Calling Ant with buildfile: {build_file} in default base directory"),
        }
    }
}

impl From<ActionConfig> for BuildAction {
    fn from(config: ActionConfig) -> Self {
        Self::new(config)
    }
}

fn run_redirected(
    context: &ExecutionContext,
    engine: &dyn BuildEngine,
) -> std::result::Result<(), EngineError> {
    let _streams = StreamRedirect::acquire(context.listeners())?;
    context.execute_target(CALL_TARGET, engine)
}

#[cfg(test)]
mod tests;
