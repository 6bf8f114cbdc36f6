//! Action configuration holder.
//!
//! [`ActionConfig`] records everything a build action needs: the build file,
//! the targets for each phase, properties, property files, and logging
//! settings. It is populated by a loader (see [`crate::lifecycle::ActionList`])
//! or through the accessors below before the action runs. Setters replace
//! values wholesale; the `add_*` methods append. Nothing is validated until
//! the action is performed.

use crate::level::{LogLevel, effective_level};
use crate::lifecycle::Phase;
use crate::properties::Properties;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Parameters of a single build action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionConfig {
    targets: Vec<String>,
    uninstall_targets: Vec<String>,
    build_file: Option<Utf8PathBuf>,
    build_dir: Option<Utf8PathBuf>,
    log_file: Option<Utf8PathBuf>,
    log_level: LogLevel,
    quiet: bool,
    verbose: bool,
    properties: Properties,
    property_files: Vec<Utf8PathBuf>,
    #[serde(rename = "condition")]
    condition_id: Option<String>,
}

impl ActionConfig {
    /// Create an empty configuration logging at [`LogLevel::Info`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets run during installation, in order.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Replace the installation targets.
    pub fn set_targets(&mut self, targets: Vec<String>) {
        self.targets = targets;
    }

    /// Append an installation target.
    pub fn add_target(&mut self, target: impl Into<String>) {
        self.targets.push(target.into());
    }

    /// Targets run during uninstallation, in order.
    #[must_use]
    pub fn uninstall_targets(&self) -> &[String] {
        &self.uninstall_targets
    }

    /// Replace the uninstallation targets.
    pub fn set_uninstall_targets(&mut self, targets: Vec<String>) {
        self.uninstall_targets = targets;
    }

    /// Append an uninstallation target.
    pub fn add_uninstall_target(&mut self, target: impl Into<String>) {
        self.uninstall_targets.push(target.into());
    }

    /// The targets selected for `phase`.
    #[must_use]
    pub fn targets_for(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Install => &self.targets,
            Phase::Uninstall => &self.uninstall_targets,
        }
    }

    /// The build file, if set.
    #[must_use]
    pub fn build_file(&self) -> Option<&Utf8Path> {
        self.build_file.as_deref()
    }

    /// Set the build file.
    pub fn set_build_file(&mut self, build_file: Option<Utf8PathBuf>) {
        self.build_file = build_file;
    }

    /// The build working directory, if set.
    #[must_use]
    pub fn build_dir(&self) -> Option<&Utf8Path> {
        self.build_dir.as_deref()
    }

    /// Set the build working directory.
    pub fn set_build_dir(&mut self, build_dir: Option<Utf8PathBuf>) {
        self.build_dir = build_dir;
    }

    /// The log file, if set.
    #[must_use]
    pub fn log_file(&self) -> Option<&Utf8Path> {
        self.log_file.as_deref()
    }

    /// Set the log file.
    pub fn set_log_file(&mut self, log_file: Option<Utf8PathBuf>) {
        self.log_file = log_file;
    }

    /// The configured log level.
    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Set the log level.
    pub const fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    /// The level build output is filtered at, after applying the verbose and
    /// quiet switches.
    #[must_use]
    pub const fn effective_log_level(&self) -> LogLevel {
        effective_level(self.verbose, self.quiet, self.log_level)
    }

    /// Whether the build should run quietly.
    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Set the quiet switch.
    pub const fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Whether the build should run verbosely.
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set the verbose switch.
    pub const fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Explicit properties passed to the build.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Replace the explicit properties.
    pub fn set_properties(&mut self, properties: Properties) {
        self.properties = properties;
    }

    /// Set one explicit property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.set(name, value);
    }

    /// Look up one explicit property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name)
    }

    /// Property files loaded into the build, in order.
    #[must_use]
    pub fn property_files(&self) -> &[Utf8PathBuf] {
        &self.property_files
    }

    /// Replace the property file list.
    pub fn set_property_files(&mut self, property_files: Vec<Utf8PathBuf>) {
        self.property_files = property_files;
    }

    /// Append a property file.
    pub fn add_property_file(&mut self, property_file: impl Into<Utf8PathBuf>) {
        self.property_files.push(property_file.into());
    }

    /// Identifier of the condition guarding this action, if any.
    #[must_use]
    pub fn condition_id(&self) -> Option<&str> {
        self.condition_id.as_deref()
    }

    /// Set the guarding condition identifier.
    pub fn set_condition_id(&mut self, condition_id: Option<String>) {
        self.condition_id = condition_id;
    }
}
