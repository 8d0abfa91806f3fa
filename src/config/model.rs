// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::matcher::ProblemMatcher;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// shell = "sh"
/// kill_timeout = "5s"
/// event_capacity = 256
///
/// [variables]
/// workspaceFolder = "/home/me/project"
///
/// [matchers.tsc]
/// owner = "typescript"
/// file_prefix = "${workspaceFolder}"
/// pattern = { regexp = '^(.*)\((\d+),(\d+)\): (error|warning) (.*)$', file = 1, line = 2, column = 3, severity = 4, message = 5 }
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Values for `${name}` placeholders.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Named problem matchers, looked up as `"$<name>"` or `"<name>"`.
    #[serde(default)]
    pub matchers: BTreeMap<String, ProblemMatcher>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Program that receives the `-c <command line>` invocation.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// How long `terminate` waits for a disposed process before killing it.
    /// Accepts `ms`, `s`, `m` and `h` suffixes.
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: String,

    /// Buffer size of the lifecycle event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_shell() -> String {
    if cfg!(windows) { "cmd".to_string() } else { "sh".to_string() }
}

fn default_kill_timeout() -> String {
    "5s".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            kill_timeout: default_kill_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Engine settings with parsed values, as consumed by
/// [`crate::engine::TaskEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub shell: String,
    pub kill_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            kill_timeout: Duration::from_secs(5),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineSection {
    pub fn settings(&self) -> Result<EngineSettings, String> {
        Ok(EngineSettings {
            shell: self.shell.clone(),
            kill_timeout: parse_duration(&self.kill_timeout)?,
            event_capacity: self.event_capacity,
        })
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
