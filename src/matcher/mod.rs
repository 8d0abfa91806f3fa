// src/matcher/mod.rs

//! Problem matchers: turning task output into diagnostics.
//!
//! - This module defines the matcher data model and the registry lookup
//!   used to resolve matchers by name.
//! - [`binder`] resolves a task's matcher references into concrete matchers.
//! - [`collector`] is the per-run sink fed with (ANSI-stripped) output.

pub mod binder;
pub mod collector;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

pub use binder::MatcherBinder;
pub use collector::{Problem, ProblemCollector, ProblemSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Parse a severity word captured from output (`"error"`, `"warn"`, ...).
    pub fn from_captured(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" | "err" | "fatal" => Some(Severity::Error),
            "warning" | "warn" => Some(Severity::Warning),
            "info" | "note" | "hint" => Some(Severity::Info),
            _ => None,
        }
    }
}

/// Regex plus the capture groups holding each field of a problem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProblemPattern {
    pub regexp: String,
    #[serde(default = "default_file_group")]
    pub file: usize,
    #[serde(default)]
    pub line: Option<usize>,
    #[serde(default)]
    pub column: Option<usize>,
    #[serde(default)]
    pub severity: Option<usize>,
    #[serde(default = "default_message_group")]
    pub message: usize,
}

fn default_file_group() -> usize {
    1
}

fn default_message_group() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProblemMatcher {
    #[serde(default)]
    pub name: Option<String>,
    pub owner: String,
    /// Prefix for relative file paths; may contain variables.
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Used when the pattern has no severity group or it doesn't parse.
    #[serde(default)]
    pub severity: Severity,
    pub pattern: ProblemPattern,
}

/// Lookup of named matchers.
pub trait ProblemMatcherRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<ProblemMatcher>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMatcherRegistry {
    matchers: HashMap<String, Arc<ProblemMatcher>>,
}

impl InMemoryMatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[matchers.<name>]` config tables.
    pub fn from_config(matchers: &BTreeMap<String, ProblemMatcher>) -> Self {
        let mut registry = Self::new();
        for (name, matcher) in matchers {
            registry.register(name.clone(), matcher.clone());
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, mut matcher: ProblemMatcher) {
        let name = name.into();
        matcher.name.get_or_insert_with(|| name.clone());
        self.matchers.insert(name, Arc::new(matcher));
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl ProblemMatcherRegistry for InMemoryMatcherRegistry {
    fn get(&self, name: &str) -> Option<Arc<ProblemMatcher>> {
        self.matchers.get(name).cloned()
    }
}
