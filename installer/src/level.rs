//! Build log levels.
//!
//! Levels follow Ant's message priorities: lower values are more severe, and
//! a sink configured at a given level shows every message at that level or
//! below.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Message priority understood by build listeners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warning,
    /// Regular build progress.
    #[default]
    Info,
    /// Detailed progress, including property and task wiring.
    Verbose,
    /// Everything the engine reports.
    Debug,
}

impl LogLevel {
    /// All levels from most to least severe.
    pub const ALL: [Self; 5] = [
        Self::Error,
        Self::Warning,
        Self::Info,
        Self::Verbose,
        Self::Debug,
    ];

    /// Ant's numeric priority for this level.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Error => 0,
            Self::Warning => 1,
            Self::Info => 2,
            Self::Verbose => 3,
            Self::Debug => 4,
        }
    }

    /// Lower-case name used in descriptors and log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
        }
    }

    /// Returns true if a message at `message` level passes this threshold.
    #[must_use]
    pub fn admits(self, message: Self) -> bool {
        message <= self
    }
}

/// Derive the level a build sink should use.
///
/// `verbose` wins over `quiet`; when neither is set the configured level is
/// used unchanged.
#[must_use]
pub const fn effective_level(verbose: bool, quiet: bool, configured: LogLevel) -> LogLevel {
    if verbose {
        LogLevel::Verbose
    } else if quiet {
        LogLevel::Warning
    } else {
        configured
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a log level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level {name:?}; expected one of error, warning, info, verbose, debug")]
pub struct ParseLogLevelError {
    /// The rejected name.
    pub name: String,
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "err" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            _ => Err(ParseLogLevelError { name: s.to_owned() }),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ParseLogLevelError;

    fn try_from(value: String) -> Result<Self, ParseLogLevelError> {
        value.parse()
    }
}
