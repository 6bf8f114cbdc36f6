//! Installer build-action hook.
//!
//! This crate drives an external build engine (Apache Ant by default) from an
//! installer's install and uninstall phases. Each [`action::BuildAction`] owns
//! an [`config::ActionConfig`] describing the build file, the targets to call
//! per phase, the properties to inject, and where build output should be
//! logged.
//!
//! # Modules
//!
//! - [`action`] - Execution driver for a single build action
//! - [`config`] - Action configuration holder
//! - [`context`] - Ephemeral execution context and composite call target
//! - [`engine`] - Build engine abstraction and the command-line Ant engine
//! - [`error`] - Uniform error type for action failures
//! - [`host`] - Ambient properties derived from the host process
//! - [`level`] - Build log levels and effective-level derivation
//! - [`lifecycle`] - Phases, descriptor loading, and conditional dispatch
//! - [`logger`] - Build listeners, the default build logger and its factory
//! - [`properties`] - Property sets and the `.properties` file codec
//! - [`redirect`] - Scoped redirection of process-wide streams and policy

pub mod action;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod host;
pub mod level;
pub mod lifecycle;
pub mod logger;
pub mod properties;
pub mod redirect;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
