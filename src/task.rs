// src/task.rs

//! Task description submitted to the engine.
//!
//! A [`Task`] is built by the caller and is read-only once handed to
//! [`crate::engine::TaskEngine::run`]. The same task may be submitted many
//! times; runs are correlated through [`Task::map_key`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::matcher::ProblemMatcher;

/// How a [`CommandString`] is quoted when joined into the shell command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellQuoting {
    /// Escape shell metacharacters.
    Escape,
    /// Single quotes, no expansion inside.
    Strong,
    /// Double quotes, the shell still expands variables.
    Weak,
}

/// A command value that carries an explicit quoting mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandString {
    pub value: String,
    pub quoting: ShellQuoting,
}

impl CommandString {
    pub fn new(value: impl Into<String>, quoting: ShellQuoting) -> Self {
        Self {
            value: value.into(),
            quoting,
        }
    }
}

/// Command name or argument: either a literal string or a quoted command string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Literal(String),
    Quoted(CommandString),
}

impl CommandValue {
    pub fn text(&self) -> &str {
        match self {
            CommandValue::Literal(s) => s,
            CommandValue::Quoted(cs) => &cs.value,
        }
    }
}

impl From<&str> for CommandValue {
    fn from(value: &str) -> Self {
        CommandValue::Literal(value.to_string())
    }
}

impl From<String> for CommandValue {
    fn from(value: String) -> Self {
        CommandValue::Literal(value)
    }
}

impl From<CommandString> for CommandValue {
    fn from(value: CommandString) -> Self {
        CommandValue::Quoted(value)
    }
}

/// Working directory and environment for a task's process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// May contain variables; `None` falls back to `${workspaceFolder}`.
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandConfiguration {
    pub name: Option<CommandValue>,
    pub args: Vec<CommandValue>,
    pub options: CommandOptions,
}

/// Reference to a problem matcher, by registry name or as an inline definition.
#[derive(Debug, Clone)]
pub enum MatcherRef {
    /// `"$tsc"` looks up `tsc`; a bare name is looked up as-is.
    Named(String),
    Inline(ProblemMatcher),
}

impl From<&str> for MatcherRef {
    fn from(value: &str) -> Self {
        MatcherRef::Named(value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    /// Stable identity; see [`Task::map_key`].
    pub id: String,
    pub label: String,
    /// Label including its source (e.g. `"workspace: build"`), when known.
    pub qualified_label: Option<String>,
    pub command: CommandConfiguration,
    pub problem_matchers: Vec<MatcherRef>,
}

impl Task {
    pub fn new(id: impl Into<String>, label: impl Into<String>, command: CommandConfiguration) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            qualified_label: None,
            command,
            problem_matchers: Vec::new(),
        }
    }

    /// Key of this task in the engine's active-task table.
    pub fn map_key(&self) -> &str {
        &self.id
    }

    /// Qualified label if present, otherwise the plain label.
    pub fn display_label(&self) -> &str {
        self.qualified_label.as_deref().unwrap_or(&self.label)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_label())
    }
}
