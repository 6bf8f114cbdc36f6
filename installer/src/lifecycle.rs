//! Phase dispatch across several conditional build actions.
//!
//! An installer usually declares several build actions in one descriptor.
//! [`ActionList`] loads them from TOML and runs them for a lifecycle
//! [`Phase`], skipping actions whose condition does not hold.

use crate::action::BuildAction;
use crate::config::ActionConfig;
use crate::engine::BuildEngine;
use crate::error::{ActionError, Result};
use camino::Utf8Path;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// The installer lifecycle phase an action runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Installation; runs the install targets.
    Install,
    /// Uninstallation; runs the uninstall targets.
    Uninstall,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Uninstall => f.write_str("uninstall"),
        }
    }
}

/// Decides whether a named condition currently holds.
pub trait ConditionEvaluator {
    /// Returns true if the condition identified by `id` holds.
    fn is_condition_true(&self, id: &str) -> bool;
}

impl<S: std::hash::BuildHasher> ConditionEvaluator for HashSet<String, S> {
    fn is_condition_true(&self, id: &str) -> bool {
        self.contains(id)
    }
}

impl<F: Fn(&str) -> bool> ConditionEvaluator for F {
    fn is_condition_true(&self, id: &str) -> bool {
        self(id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Descriptor {
    #[serde(default)]
    action: Vec<ActionConfig>,
}

/// The build actions declared by an installer, in declaration order.
#[derive(Debug, Default)]
pub struct ActionList {
    actions: Vec<BuildAction>,
}

impl ActionList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML descriptor with one `[[action]]` table per action.
    ///
    /// # Example
    ///
    /// ```
    /// use buildcall_installer::lifecycle::ActionList;
    ///
    /// let list = ActionList::from_toml_str(r#"
    /// [[action]]
    /// build_file = "build.xml"
    /// targets = ["init", "deploy"]
    ///
    /// [action.properties]
    /// env = "prod"
    /// "#)?;
    /// assert_eq!(list.len(), 1);
    /// # Ok::<(), buildcall_installer::error::ActionError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Configuration`] if the descriptor is not valid.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let descriptor: Descriptor = toml::from_str(contents)
            .map_err(|e| ActionError::configuration(format!("invalid action descriptor: {e}")))?;
        Ok(Self {
            actions: descriptor.action.into_iter().map(BuildAction::new).collect(),
        })
    }

    /// Read and parse a TOML descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Configuration`] if the file cannot be read or is
    /// not a valid descriptor.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ActionError::configuration(format!("failed to read action descriptor {path}: {e}"))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Append an action.
    pub fn push(&mut self, action: BuildAction) {
        self.actions.push(action);
    }

    /// The actions, in declaration order.
    #[must_use]
    pub fn actions(&self) -> &[BuildAction] {
        &self.actions
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if no action is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action whose condition holds for `phase`.
    ///
    /// Actions without a condition always run. Returns the number of actions
    /// that ran.
    ///
    /// # Errors
    ///
    /// Returns the first action's error; later actions do not run.
    pub fn perform(
        &self,
        phase: Phase,
        conditions: &dyn ConditionEvaluator,
        engine: &dyn BuildEngine,
    ) -> Result<usize> {
        let mut performed = 0;
        for action in &self.actions {
            if let Some(id) = action.config().condition_id() {
                if !conditions.is_condition_true(id) {
                    log::debug!("skipping {phase} build action: condition {id} is false");
                    continue;
                }
            }
            action.perform_action_with(phase, engine)?;
            performed += 1;
        }
        Ok(performed)
    }
}

impl FromIterator<BuildAction> for ActionList {
    fn from_iter<I: IntoIterator<Item = BuildAction>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}
