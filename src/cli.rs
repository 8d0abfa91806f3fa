// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskexec",
    version,
    about = "Run a shell command as a task: lifecycle tracking, problem matching and channel reuse.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskexec.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKEXEC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Task label. Defaults to the command line.
    #[arg(long, value_name = "NAME")]
    pub label: Option<String>,

    /// Working directory for the task. May contain `${variables}`.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<String>,

    /// Extra environment variable for the task process.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Problem matcher to apply, e.g. `$tsc`. Repeatable.
    #[arg(long = "problem-matcher", value_name = "REF")]
    pub problem_matchers: Vec<String>,

    /// Resolve and print the invocation, but don't execute it.
    #[arg(long)]
    pub dry_run: bool,

    /// Command and its arguments.
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse `KEY=VALUE`. The value may be empty and may contain `=`.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
