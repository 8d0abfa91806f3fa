// src/resolve/mod.rs

//! Turning task definitions into concrete strings.
//!
//! - [`variables`] defines the `VariableResolver` service consumed by the
//!   engine plus a map-backed implementation used by the CLI and tests.
//! - [`command`] builds the shell invocation for a task's command
//!   configuration, resolving variables piecewise.

pub mod command;
pub mod variables;

pub use command::{CommandResolver, ShellInvocation, WORKSPACE_FOLDER};
pub use variables::{MapVariableResolver, VariableResolver};
