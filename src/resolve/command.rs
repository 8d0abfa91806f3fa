// src/resolve/command.rs

//! Builds the shell invocation for a task.
//!
//! Every command value goes through the variable resolver. Values that look
//! like paths are split on the separator and resolved component by
//! component, so `${workspaceFolder}/bin/run` resolves the variable even when
//! the resolver only understands whole-segment placeholders.

use std::sync::Arc;

use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::resolve::variables::VariableResolver;
use crate::task::{CommandConfiguration, CommandString, CommandValue, ShellQuoting, Task};

/// Expression used when a task does not set a working directory.
pub const WORKSPACE_FOLDER: &str = "${workspaceFolder}";

/// Arguments passed to the shell program: the command flag, then the whole
/// command line as a single string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    pub args: Vec<String>,
}

impl ShellInvocation {
    pub fn command_line(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or("")
    }
}

#[derive(Clone)]
pub struct CommandResolver {
    variables: Arc<dyn VariableResolver>,
    separator: char,
}

impl CommandResolver {
    pub fn new(variables: Arc<dyn VariableResolver>) -> Self {
        Self {
            variables,
            separator: std::path::MAIN_SEPARATOR,
        }
    }

    /// Override the path separator used for piecewise resolution.
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Resolve a whole string in one go, without path splitting.
    pub fn resolve_str(&self, value: &str) -> Result<String> {
        self.variables.resolve(value)
    }

    /// Resolve one argument segment, splitting on the path separator first.
    pub fn resolve_segment(&self, value: &str) -> Result<String> {
        if !value.contains(self.separator) {
            return self.variables.resolve(value);
        }

        let parts = value
            .split(self.separator)
            .map(|part| self.variables.resolve(part))
            .collect::<Result<Vec<_>>>()?;

        Ok(parts.join(&self.separator.to_string()))
    }

    /// Resolve a command value, keeping its quoting mode.
    pub fn resolve_value(&self, value: &CommandValue) -> Result<CommandValue> {
        match value {
            CommandValue::Literal(s) => Ok(CommandValue::Literal(self.resolve_segment(s)?)),
            CommandValue::Quoted(cs) => Ok(CommandValue::Quoted(CommandString {
                value: self.resolve_segment(&cs.value)?,
                quoting: cs.quoting,
            })),
        }
    }

    /// Build the shell invocation for `task`.
    ///
    /// Fails with [`EngineError::MissingCommand`] when the task has no command
    /// name. An empty argument list is fine.
    pub fn resolve_shell(&self, task: &Task) -> Result<ShellInvocation> {
        self.resolve_command(task.display_label(), &task.command)
    }

    pub fn resolve_command(
        &self,
        label: &str,
        command: &CommandConfiguration,
    ) -> Result<ShellInvocation> {
        let name = command
            .name
            .as_ref()
            .ok_or_else(|| EngineError::MissingCommand(label.to_string()))?;

        let mut rendered = Vec::with_capacity(command.args.len() + 1);
        for value in std::iter::once(name).chain(command.args.iter()) {
            let resolved = self.resolve_value(value)?;
            rendered.push(render(&resolved)?);
        }

        let command_line = rendered.join(" ");
        debug!(task = %label, command = %command_line, "resolved shell command");

        Ok(ShellInvocation {
            args: vec![shell_flag().to_string(), command_line],
        })
    }

    /// Resolve the working directory, defaulting to the workspace folder.
    pub fn resolve_cwd(&self, cwd: Option<&str>) -> Result<String> {
        self.variables.resolve(cwd.unwrap_or(WORKSPACE_FOLDER))
    }
}

fn shell_flag() -> &'static str {
    if cfg!(windows) { "/C" } else { "-c" }
}

/// Render a resolved value into command-line text.
fn render(value: &CommandValue) -> Result<String> {
    match value {
        CommandValue::Literal(s) => Ok(s.clone()),
        CommandValue::Quoted(cs) => match cs.quoting {
            ShellQuoting::Strong => Ok(format!("'{}'", cs.value.replace('\'', r"'\''"))),
            ShellQuoting::Weak => {
                let mut quoted = String::with_capacity(cs.value.len() + 2);
                quoted.push('"');
                for c in cs.value.chars() {
                    if matches!(c, '"' | '\\' | '`') {
                        quoted.push('\\');
                    }
                    quoted.push(c);
                }
                quoted.push('"');
                Ok(quoted)
            }
            ShellQuoting::Escape => shlex::try_quote(&cs.value)
                .map(|q| q.into_owned())
                .map_err(|e| EngineError::ConfigError(format!("cannot quote '{}': {e}", cs.value))),
        },
    }
}
