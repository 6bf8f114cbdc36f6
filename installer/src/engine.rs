//! Build engine abstraction and the command-line Ant engine.
//!
//! The execution driver never talks to a build tool directly. It hands each
//! [`Invocation`] to a [`BuildEngine`] together with the property set and the
//! listeners that should observe the build. [`AntEngine`] is the production
//! implementation: it runs one `ant` process per invocation and streams the
//! process output into the listeners.

use crate::level::LogLevel;
use crate::logger::Listeners;
use crate::properties::Properties;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Number of trailing error lines kept to describe a failed build.
const FAILURE_CONTEXT_LINES: usize = 20;

/// Failures reported by a build engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The build file does not define the requested target.
    #[error("target \"{target}\" does not exist in the build file")]
    TargetNotFound {
        /// The unknown target.
        target: String,
    },

    /// The build of a target failed.
    #[error("build of target {target} failed: {message}")]
    BuildFailed {
        /// The target whose build failed.
        target: String,
        /// Exit status of the engine process, when there was one.
        status: Option<i32>,
        /// Description of the failure.
        message: String,
    },

    /// The engine process could not be started.
    #[error("failed to start build engine {program}")]
    Spawn {
        /// The program that could not be started.
        program: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// An I/O operation failed while preparing or running the build.
    #[error("I/O error while running the build: {0}")]
    Io(#[from] io::Error),
}

/// One call of a single target in a build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    build_file: Utf8PathBuf,
    build_dir: Option<Utf8PathBuf>,
    target: String,
}

impl Invocation {
    /// Create an invocation of `target` in `build_file`.
    #[must_use]
    pub fn new(
        build_file: impl Into<Utf8PathBuf>,
        build_dir: Option<Utf8PathBuf>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            build_file: build_file.into(),
            build_dir,
            target: target.into(),
        }
    }

    /// The build file to load.
    #[must_use]
    pub fn build_file(&self) -> &Utf8Path {
        &self.build_file
    }

    /// The base directory for the build, if one is configured.
    #[must_use]
    pub fn build_dir(&self) -> Option<&Utf8Path> {
        self.build_dir.as_deref()
    }

    /// The target to run.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Runs targets of a build file.
pub trait BuildEngine {
    /// Run one invocation to completion.
    ///
    /// Progress and output are reported through `listeners`.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the target is unknown, the build fails,
    /// or the engine cannot be run.
    fn invoke(
        &self,
        invocation: &Invocation,
        properties: &Properties,
        listeners: &Listeners,
    ) -> Result<(), EngineError>;
}

/// Runs Apache Ant from the command line.
///
/// # Example
///
/// ```
/// use buildcall_installer::engine::AntEngine;
/// use buildcall_installer::level::LogLevel;
///
/// let engine = AntEngine::new("ant").with_log_level(LogLevel::Verbose);
/// assert_eq!(engine.program().to_str(), Some("ant"));
/// ```
#[derive(Debug, Clone)]
pub struct AntEngine {
    program: PathBuf,
    leading_args: Vec<OsString>,
    log_level: LogLevel,
}

impl Default for AntEngine {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AntEngine {
    /// Create an engine running `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            log_level: LogLevel::Info,
        }
    }

    /// Locate Ant through `ANT_HOME`, falling back to `ant` on the `PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        let launcher = if cfg!(windows) { "ant.bat" } else { "ant" };
        match std::env::var_os("ANT_HOME") {
            Some(home) if !home.is_empty() => {
                Self::new(PathBuf::from(home).join("bin").join(launcher))
            }
            _ => Self::new(launcher),
        }
    }

    /// Add an argument passed before the generated Ant arguments.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Set the level Ant itself should log at.
    #[must_use]
    pub const fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// The program this engine runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn arguments(&self, invocation: &Invocation, property_file: &Path) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push("-noinput".into());
        args.push("-buildfile".into());
        args.push(invocation.build_file().as_str().into());
        args.push("-propertyfile".into());
        args.push(property_file.into());
        if let Some(flag) = level_flag(self.log_level) {
            args.push(flag.into());
        }
        if let Some(dir) = invocation.build_dir() {
            args.push(format!("-Dbasedir={dir}").into());
        }
        args.push(invocation.target().into());
        args
    }
}

const fn level_flag(level: LogLevel) -> Option<&'static str> {
    match level {
        LogLevel::Error | LogLevel::Warning => Some("-quiet"),
        LogLevel::Info => None,
        LogLevel::Verbose => Some("-verbose"),
        LogLevel::Debug => Some("-debug"),
    }
}

impl BuildEngine for AntEngine {
    fn invoke(
        &self,
        invocation: &Invocation,
        properties: &Properties,
        listeners: &Listeners,
    ) -> Result<(), EngineError> {
        let mut property_file = tempfile::Builder::new()
            .prefix("buildcall-")
            .suffix(".properties")
            .tempfile()?;
        properties.write_to(&mut property_file)?;
        property_file.flush()?;

        let args = self.arguments(invocation, property_file.path());
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = invocation.build_dir() {
            command.current_dir(dir);
        }

        log::debug!(
            "running {} for target {}",
            self.program.display(),
            invocation.target()
        );
        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (output_tail, error_tail) = std::thread::scope(|scope| {
            let errors = scope.spawn(|| forward_lines(stderr, LogLevel::Error, listeners));
            let output = forward_lines(stdout, LogLevel::Info, listeners);
            (output, errors.join().unwrap_or_default())
        });
        let status = child.wait()?;

        if status.success() {
            return Ok(());
        }
        Err(classify_failure(
            invocation.target(),
            status.code(),
            &output_tail,
            &error_tail,
        ))
    }
}

/// Forward each line of `reader` to the listeners and keep the tail.
fn forward_lines(
    reader: Option<impl Read>,
    level: LogLevel,
    listeners: &Listeners,
) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(FAILURE_CONTEXT_LINES);
    let Some(reader) = reader else {
        return tail;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                listeners.log(level, None, line);
                if tail.len() == FAILURE_CONTEXT_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.to_owned());
            }
            Err(e) => {
                log::trace!("stopped reading build output: {e}");
                break;
            }
        }
    }
    tail
}

fn classify_failure(
    target: &str,
    status: Option<i32>,
    output: &VecDeque<String>,
    errors: &VecDeque<String>,
) -> EngineError {
    let missing = format!("Target \"{target}\" does not exist");
    if errors.iter().chain(output).any(|line| line.contains(&missing)) {
        return EngineError::TargetNotFound {
            target: target.to_owned(),
        };
    }

    let described: Vec<&str> = errors
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && *line != "BUILD FAILED")
        .collect();
    let message = if described.is_empty() {
        output
            .iter()
            .rev()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
            .map_or_else(
                || describe_status(status),
                str::to_owned,
            )
    } else {
        described.join("\n")
    };

    EngineError::BuildFailed {
        target: target.to_owned(),
        status,
        message,
    }
}

fn describe_status(status: Option<i32>) -> String {
    status.map_or_else(
        || "terminated by signal".to_owned(),
        |code| format!("exit status {code}"),
    )
}

#[cfg(test)]
mod tests;
