//! Error types for build actions.
//!
//! Every failure of a build action surfaces as an [`ActionError`]. Failures
//! reported by the build engine are kept as the error's source so callers can
//! walk the cause chain without depending on engine-specific types.

use crate::engine::EngineError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while performing a build action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action is not configured well enough to run.
    #[error("invalid build action configuration: {reason}")]
    Configuration {
        /// Description of what is missing or malformed.
        reason: String,
    },

    /// A declared property file does not exist.
    #[error("required property file {path} for the build call doesn't exist")]
    PropertyFileMissing {
        /// Path of the missing property file.
        path: Utf8PathBuf,
    },

    /// A declared property file exists but could not be read.
    #[error("failed to read property file {path}")]
    PropertyFileUnreadable {
        /// Path of the unreadable property file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The build engine reported a failure while running the call target.
    #[error("build action failed")]
    Execution {
        /// The failure reported by the build engine.
        #[source]
        source: EngineError,
    },
}

impl ActionError {
    /// Shorthand for a [`ActionError::Configuration`] error.
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

impl From<EngineError> for ActionError {
    fn from(source: EngineError) -> Self {
        Self::Execution { source }
    }
}

/// Result type alias using [`ActionError`].
pub type Result<T> = std::result::Result<T, ActionError>;
