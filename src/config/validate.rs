// src/config/validate.rs

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;

use crate::config::model::ConfigFile;

/// Upper bound for `[engine].kill_timeout`.
pub const MAX_KILL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - `[engine].shell` is not empty
/// - `[engine].kill_timeout` parses, is non-zero and at most a day
/// - `[engine].event_capacity >= 1`
/// - every matcher regex compiles and its capture groups exist
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_engine(cfg)?;
    validate_matchers(cfg)?;
    Ok(())
}

fn validate_engine(cfg: &ConfigFile) -> Result<()> {
    if cfg.engine.shell.trim().is_empty() {
        return Err(anyhow!("[engine].shell must not be empty"));
    }

    let settings = cfg
        .engine
        .settings()
        .map_err(|e| anyhow!(e))
        .context("invalid [engine].kill_timeout")?;

    if settings.kill_timeout.is_zero() {
        return Err(anyhow!("[engine].kill_timeout must be greater than zero"));
    }
    if settings.kill_timeout > MAX_KILL_TIMEOUT {
        return Err(anyhow!(
            "[engine].kill_timeout must be at most {:?} (got {:?})",
            MAX_KILL_TIMEOUT,
            settings.kill_timeout
        ));
    }

    if cfg.engine.event_capacity == 0 {
        return Err(anyhow!("[engine].event_capacity must be >= 1 (got 0)"));
    }

    Ok(())
}

fn validate_matchers(cfg: &ConfigFile) -> Result<()> {
    for (name, matcher) in cfg.matchers.iter() {
        let regex = Regex::new(&matcher.pattern.regexp)
            .with_context(|| format!("matcher '{}' has an invalid regexp", name))?;

        let groups = regex.captures_len() - 1;
        let pattern = &matcher.pattern;
        let referenced = [Some(pattern.file), Some(pattern.message), pattern.line, pattern.column, pattern.severity];

        if let Some(idx) = referenced.into_iter().flatten().find(|&idx| idx > groups) {
            return Err(anyhow!(
                "matcher '{}' refers to capture group {} but its regexp has only {}",
                name,
                idx,
                groups
            ));
        }
    }
    Ok(())
}
