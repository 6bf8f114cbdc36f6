//! Ephemeral execution context and the composite call target.
//!
//! Every run of a build action gets a fresh [`ExecutionContext`]: a named
//! property store with its own listeners and targets. The targets selected for
//! a phase are turned into an [`ExecutionPlan`], which becomes a single
//! [`CompositeTarget`] chaining one engine invocation per selected target.

use crate::config::ActionConfig;
use crate::engine::{BuildEngine, EngineError, Invocation};
use crate::error::{ActionError, Result};
use crate::level::LogLevel;
use crate::lifecycle::Phase;
use crate::logger::{BuildListener, Listeners};
use crate::properties::Properties;
use camino::{Utf8Path, Utf8PathBuf};
use std::error::Error;
use std::sync::Arc;

/// Name of the synthetic target chaining the selected targets.
pub const CALL_TARGET: &str = "calltarget";

/// Name given to execution contexts created by build actions.
pub const CONTEXT_NAME: &str = "buildcall";

/// Task name used when the context reports on its own invocations.
const CALL_TASK: &str = "ant";

/// The invocations selected for one phase of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    phase: Phase,
    invocations: Vec<Invocation>,
}

impl ExecutionPlan {
    /// Select the invocations `config` runs for `phase`.
    ///
    /// The build file is resolved to an absolute path against the current
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Configuration`] if no build file is set or the
    /// current directory cannot be resolved.
    pub fn for_phase(config: &ActionConfig, phase: Phase) -> Result<Self> {
        let build_file = config
            .build_file()
            .ok_or_else(|| ActionError::configuration("no build file set for the action"))?;
        let build_file = absolute(build_file)?;
        let build_dir = config.build_dir().map(Utf8Path::to_owned);

        let invocations = config
            .targets_for(phase)
            .iter()
            .map(|target| Invocation::new(build_file.clone(), build_dir.clone(), target.as_str()))
            .collect();

        Ok(Self { phase, invocations })
    }

    /// The phase the plan was selected for.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The planned invocations, in order.
    #[must_use]
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Returns true if the phase selects no target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    /// Turn the plan into a composite target named `name`.
    #[must_use]
    pub fn into_target(self, name: impl Into<String>) -> CompositeTarget {
        CompositeTarget {
            name: name.into(),
            invocations: self.invocations,
        }
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        ActionError::configuration(format!("cannot resolve build file {path}: {e}"))
    })?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| {
        ActionError::configuration(format!("current directory is not valid UTF-8: {e}"))
    })?;
    Ok(cwd.join(path))
}

/// A target made of engine invocations run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeTarget {
    name: String,
    invocations: Vec<Invocation>,
}

impl CompositeTarget {
    /// Create an empty composite target.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocations: Vec::new(),
        }
    }

    /// Append an invocation.
    pub fn add_invocation(&mut self, invocation: Invocation) {
        self.invocations.push(invocation);
    }

    /// The target's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The invocations, in execution order.
    #[must_use]
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }
}

/// An isolated property store, listener set, and target table for one run.
#[derive(Debug)]
pub struct ExecutionContext {
    name: String,
    properties: Properties,
    listeners: Listeners,
    targets: Vec<CompositeTarget>,
}

impl ExecutionContext {
    /// Create an empty context.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Properties::new(),
            listeners: Listeners::default(),
            targets: Vec::new(),
        }
    }

    /// The context's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a listener for every subsequent event.
    pub fn add_listener(&mut self, listener: Arc<dyn BuildListener>) {
        self.listeners.add(listener);
    }

    /// The registered listeners.
    #[must_use]
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Set one property, overwriting any previous value.
    pub fn set_property(&mut self, name: &str, value: &str) {
        self.listeners.log(
            LogLevel::Debug,
            None,
            &format!("Setting project property: {name} -> {value}"),
        );
        self.properties.set(name, value);
    }

    /// Set every property of `properties`, overwriting previous values.
    pub fn set_properties(&mut self, properties: &Properties) {
        for (name, value) in properties.iter() {
            self.set_property(name, value);
        }
    }

    /// Look up a property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name)
    }

    /// All properties currently set.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Add a target, replacing any target of the same name.
    pub fn add_target(&mut self, target: CompositeTarget) {
        self.targets.retain(|existing| existing.name != target.name);
        self.targets.push(target);
    }

    /// Look up a target by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&CompositeTarget> {
        self.targets.iter().find(|target| target.name == name)
    }

    /// Notify listeners that the build is starting.
    pub fn fire_build_started(&self) {
        self.listeners.build_started();
    }

    /// Notify listeners that the build has finished.
    pub fn fire_build_finished(&self, failure: Option<&(dyn Error + 'static)>) {
        self.listeners.build_finished(failure);
    }

    /// Run the named target's invocations in order, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TargetNotFound`] if the context has no such
    /// target, or the first error reported by `engine`.
    pub fn execute_target(&self, name: &str, engine: &dyn BuildEngine) -> std::result::Result<(), EngineError> {
        let target = self.target(name).ok_or_else(|| EngineError::TargetNotFound {
            target: name.to_owned(),
        })?;

        self.listeners.target_started(target.name());
        for invocation in target.invocations() {
            self.listeners.log(
                LogLevel::Verbose,
                Some(CALL_TASK),
                &format!(
                    "calling target {} in {}",
                    invocation.target(),
                    invocation.build_file()
                ),
            );
            if let Err(e) = engine.invoke(invocation, &self.properties, &self.listeners) {
                self.listeners.target_finished(target.name(), false);
                return Err(e);
            }
        }
        self.listeners.target_finished(target.name(), true);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
