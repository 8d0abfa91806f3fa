// src/resolve/variables.rs

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{EngineError, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex is valid"));

/// Substitutes `${...}` placeholders in strings.
///
/// Implementations must return strings without placeholders unchanged.
pub trait VariableResolver: Send + Sync {
    fn resolve(&self, value: &str) -> Result<String>;
}

/// Resolver backed by a fixed variable map.
///
/// Supports `${name}` lookups in the map and `${env:NAME}` lookups in the
/// process environment (unset variables become empty strings). Any other
/// unknown placeholder is an error.
#[derive(Debug, Clone, Default)]
pub struct MapVariableResolver {
    variables: BTreeMap<String, String>,
}

impl MapVariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(variables: BTreeMap<String, String>) -> Self {
        Self { variables }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn lookup(&self, name: &str, value: &str) -> Result<String> {
        if let Some(env_name) = name.strip_prefix("env:") {
            return Ok(std::env::var(env_name).unwrap_or_default());
        }

        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownVariable {
                variable: name.to_string(),
                value: value.to_string(),
            })
    }
}

impl VariableResolver for MapVariableResolver {
    fn resolve(&self, value: &str) -> Result<String> {
        if !value.contains("${") {
            return Ok(value.to_string());
        }

        let mut resolved = String::with_capacity(value.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(value) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            resolved.push_str(&value[last..whole.start()]);
            resolved.push_str(&self.lookup(name.as_str(), value)?);
            last = whole.end();
        }

        resolved.push_str(&value[last..]);
        Ok(resolved)
    }
}
