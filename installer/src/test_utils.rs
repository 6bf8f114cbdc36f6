//! Shared test utilities for the installer crate.

use crate::engine::{BuildEngine, EngineError, Invocation};
use crate::logger::{BuildListener, Listeners, LogEvent};
use crate::level::LogLevel;
use crate::properties::Properties;
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// An in-memory writer whose contents can be inspected after it has been
/// handed to a logger.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far, decoded lossily as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One invocation observed by a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// The invocation the engine was asked to run.
    pub invocation: Invocation,
    /// The property set visible to the engine at that point.
    pub properties: Properties,
}

/// A `BuildEngine` that records invocations instead of running a build.
///
/// Each invocation logs `running <target>` at info level through the
/// listeners it receives, mimicking an engine that reports progress.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<RecordedCall>>,
    failing: HashSet<String>,
    missing: HashSet<String>,
}

impl RecordingEngine {
    /// Creates an engine where every target succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named target fail with a build failure.
    #[must_use]
    pub fn failing(mut self, target: &str) -> Self {
        self.failing.insert(target.to_owned());
        self
    }

    /// Makes the named target unknown to the engine.
    #[must_use]
    pub fn missing(mut self, target: &str) -> Self {
        self.missing.insert(target.to_owned());
        self
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the targets invoked so far, in order.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.invocation.target().to_owned())
            .collect()
    }
}

impl BuildEngine for RecordingEngine {
    fn invoke(
        &self,
        invocation: &Invocation,
        properties: &Properties,
        listeners: &Listeners,
    ) -> Result<(), EngineError> {
        let target = invocation.target();
        if self.missing.contains(target) {
            return Err(EngineError::TargetNotFound {
                target: target.to_owned(),
            });
        }

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                invocation: invocation.clone(),
                properties: properties.clone(),
            });
        listeners.log(LogLevel::Info, Some(target), &format!("running {target}"));

        if self.failing.contains(target) {
            return Err(EngineError::BuildFailed {
                target: target.to_owned(),
                status: Some(1),
                message: format!("target {target} failed"),
            });
        }
        Ok(())
    }
}

/// A listener that keeps every message it receives.
#[derive(Debug, Default)]
pub struct CollectingListener {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl CollectingListener {
    /// Creates an empty listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected messages with their levels.
    #[must_use]
    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BuildListener for CollectingListener {
    fn message_logged(&self, event: &LogEvent<'_>) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.level, event.message.to_owned()));
    }
}
