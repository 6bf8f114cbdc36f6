//! Build listeners, the default build logger, and the logger factory.
//!
//! An execution context reports build events to its registered
//! [`BuildListener`]s. [`BuildLogger`] renders those events in the layout of
//! Ant's default logger and filters messages by a threshold level.
//! [`LoggerFactory`] derives that logger from an action's configuration,
//! binding it to a log file when one is configured and to the host console
//! otherwise.

use crate::config::ActionConfig;
use crate::level::LogLevel;
use crate::redirect;
use camino::{Utf8Path, Utf8PathBuf};
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Width of the task label column in rendered messages.
const LEFT_COLUMN_SIZE: usize = 12;

/// A single message emitted during a build.
#[derive(Debug, Clone, Copy)]
pub struct LogEvent<'a> {
    /// Priority of the message.
    pub level: LogLevel,
    /// Name of the task that emitted the message, if any.
    pub task: Option<&'a str>,
    /// The message text, possibly spanning several lines.
    pub message: &'a str,
}

/// Receives events from an execution context.
///
/// Listeners are shared with the threads that capture redirected output, so
/// they must be thread-safe.
pub trait BuildListener: Send + Sync {
    /// The build is about to start.
    fn build_started(&self) {}

    /// The build has finished, with the failure if it did not succeed.
    fn build_finished(&self, _failure: Option<&(dyn Error + 'static)>) {}

    /// A target is about to run.
    fn target_started(&self, _target: &str) {}

    /// A target has finished.
    fn target_finished(&self, _target: &str, _succeeded: bool) {}

    /// A message was logged.
    fn message_logged(&self, event: &LogEvent<'_>);
}

/// The listeners registered with an execution context.
///
/// Events delivered to the set are forwarded to every member in registration
/// order.
#[derive(Clone, Default)]
pub struct Listeners(Vec<Arc<dyn BuildListener>>);

impl Listeners {
    /// Register a listener.
    pub fn add(&mut self, listener: Arc<dyn BuildListener>) {
        self.0.push(listener);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Log a message to every listener.
    pub fn log(&self, level: LogLevel, task: Option<&str>, message: &str) {
        self.message_logged(&LogEvent {
            level,
            task,
            message,
        });
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.0.len())
            .finish()
    }
}

impl BuildListener for Listeners {
    fn build_started(&self) {
        self.0.iter().for_each(|l| l.build_started());
    }

    fn build_finished(&self, failure: Option<&(dyn Error + 'static)>) {
        self.0.iter().for_each(|l| l.build_finished(failure));
    }

    fn target_started(&self, target: &str) {
        self.0.iter().for_each(|l| l.target_started(target));
    }

    fn target_finished(&self, target: &str, succeeded: bool) {
        self.0
            .iter()
            .for_each(|l| l.target_finished(target, succeeded));
    }

    fn message_logged(&self, event: &LogEvent<'_>) {
        self.0.iter().for_each(|l| l.message_logged(event));
    }
}

/// Where a [`BuildLogger`] writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkDestination {
    /// The host's standard output and error.
    Console,
    /// A log file receiving both channels.
    File(Utf8PathBuf),
    /// The configured log file could not be opened; the console is used.
    ConsoleFallback {
        /// The log file that could not be opened.
        path: Utf8PathBuf,
        /// Why opening it failed.
        reason: String,
    },
    /// Caller-supplied writers.
    Custom,
}

enum Channels {
    Shared(Box<dyn Write + Send>),
    Split {
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    },
}

impl Channels {
    fn writer(&mut self, error: bool) -> &mut dyn Write {
        match self {
            Self::Shared(writer) => writer.as_mut(),
            Self::Split { out, err } => {
                if error {
                    err.as_mut()
                } else {
                    out.as_mut()
                }
            }
        }
    }
}

/// Renders build events in Ant's default logger layout.
pub struct BuildLogger {
    threshold: LogLevel,
    destination: SinkDestination,
    channels: Mutex<Channels>,
    started: Mutex<Option<Instant>>,
}

impl BuildLogger {
    /// Create a logger writing to caller-supplied channels.
    #[must_use]
    pub fn new(
        threshold: LogLevel,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self::with_channels(
            threshold,
            SinkDestination::Custom,
            Channels::Split { out, err },
        )
    }

    fn with_channels(threshold: LogLevel, destination: SinkDestination, channels: Channels) -> Self {
        Self {
            threshold,
            destination,
            channels: Mutex::new(channels),
            started: Mutex::new(None),
        }
    }

    /// The threshold level; more verbose messages are dropped.
    #[must_use]
    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }

    /// Where this logger writes.
    #[must_use]
    pub fn destination(&self) -> &SinkDestination {
        &self.destination
    }

    fn emit(&self, error: bool, text: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = channels.writer(error);
        if let Err(e) = writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.flush())
        {
            log::trace!("build logger: failed to write to sink: {e}");
        }
    }
}

impl fmt::Debug for BuildLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildLogger")
            .field("threshold", &self.threshold)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl BuildListener for BuildLogger {
    fn build_started(&self) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn build_finished(&self, failure: Option<&(dyn Error + 'static)>) {
        let started = *self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = started.map(|start| start.elapsed()).unwrap_or_default();
        let total = format!("\nTotal time: {}\n", format_elapsed(elapsed));

        match failure {
            None => {
                if self.threshold.admits(LogLevel::Info) {
                    self.emit(false, &format!("\nBUILD SUCCESSFUL\n{total}"));
                }
            }
            Some(err) => {
                self.emit(true, &format!("\nBUILD FAILED\n{}\n{total}", error_chain(err)));
            }
        }
    }

    fn target_started(&self, target: &str) {
        if self.threshold.admits(LogLevel::Info) && !target.is_empty() {
            self.emit(false, &format!("\n{target}:\n"));
        }
    }

    fn message_logged(&self, event: &LogEvent<'_>) {
        if !self.threshold.admits(event.level) {
            return;
        }
        let text = render_message(event);
        self.emit(event.level == LogLevel::Error, &text);
    }
}

fn render_message(event: &LogEvent<'_>) -> String {
    let Some(task) = event.task else {
        return format!("{}\n", event.message);
    };
    let label = format!("[{task}] ");
    let prefix = format!("{label:>LEFT_COLUMN_SIZE$}");
    let mut text = String::new();
    for line in event.message.lines() {
        text.push_str(&prefix);
        text.push_str(line);
        text.push('\n');
    }
    if text.is_empty() {
        text.push_str(&prefix);
        text.push('\n');
    }
    text
}

fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    text
}

/// Format a duration the way Ant reports total build time.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let minutes = seconds / 60;
    let rest = seconds % 60;
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    if minutes > 0 {
        format!("{} {}", plural(minutes, "minute"), plural(rest, "second"))
    } else {
        plural(rest, "second")
    }
}

/// Derives a [`BuildLogger`] from an action's settings.
#[derive(Debug, Clone)]
pub struct LoggerFactory<'a> {
    level: LogLevel,
    log_file: Option<&'a Utf8Path>,
}

impl<'a> LoggerFactory<'a> {
    /// Create a factory for an explicit level and optional log file.
    #[must_use]
    pub const fn new(level: LogLevel, log_file: Option<&'a Utf8Path>) -> Self {
        Self { level, log_file }
    }

    /// Create a factory using the effective level and log file of `config`.
    #[must_use]
    pub fn for_config(config: &'a ActionConfig) -> Self {
        Self::new(config.effective_log_level(), config.log_file())
    }

    /// The level the created logger will filter at.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Create the logger.
    ///
    /// A log file that cannot be opened is not an error: the logger falls
    /// back to the console and records the reason in its destination.
    #[must_use]
    pub fn create(&self) -> BuildLogger {
        let Some(path) = self.log_file else {
            return BuildLogger::with_channels(
                self.level,
                SinkDestination::Console,
                console_channels(),
            );
        };

        match open_log_file(path) {
            Ok(file) => BuildLogger::with_channels(
                self.level,
                SinkDestination::File(path.to_owned()),
                Channels::Shared(Box::new(file)),
            ),
            Err(e) => {
                log::debug!("log file {path} unavailable, using console: {e}");
                BuildLogger::with_channels(
                    self.level,
                    SinkDestination::ConsoleFallback {
                        path: path.to_owned(),
                        reason: e.to_string(),
                    },
                    console_channels(),
                )
            }
        }
    }
}

fn open_log_file(path: &Utf8Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    File::create(path)
}

/// Bind both channels to the host's standard streams.
///
/// On Unix the descriptors are duplicated up front so the logger keeps
/// writing to the original console while the process streams are redirected.
fn console_channels() -> Channels {
    redirect::while_unredirected(|| Channels::Split {
        out: console_stream(false),
        err: console_stream(true),
    })
}

#[cfg(unix)]
fn console_stream(error: bool) -> Box<dyn Write + Send> {
    use std::os::fd::AsFd;

    let duplicated = if error {
        io::stderr().as_fd().try_clone_to_owned()
    } else {
        io::stdout().as_fd().try_clone_to_owned()
    };
    match duplicated {
        Ok(fd) => Box::new(File::from(fd)),
        Err(e) => {
            log::trace!("failed to duplicate standard stream: {e}");
            plain_stream(error)
        }
    }
}

#[cfg(not(unix))]
fn console_stream(error: bool) -> Box<dyn Write + Send> {
    plain_stream(error)
}

fn plain_stream(error: bool) -> Box<dyn Write + Send> {
    if error {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    }
}
