// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod matcher;
pub mod resolve;
pub mod task;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::engine::{TaskEngine, TaskEvent};
use crate::exec::ShellSurfaceFactory;
use crate::matcher::{InMemoryMatcherRegistry, MatcherBinder, Problem};
use crate::resolve::{CommandResolver, MapVariableResolver};
use crate::task::{
    CommandConfiguration, CommandOptions, CommandString, CommandValue, MatcherRef, ShellQuoting,
    Task,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - variable resolver and matcher registry
/// - the engine with the shell surface
/// - Ctrl-C handling
///
/// Returns the process exit code: the task's exit code, or 1 if it has none.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_or_default(args.config.as_deref().map(Path::new))?;
    let settings = cfg.engine.settings().map_err(|e| anyhow!(e))?;

    let variables = workspace_variables(&cfg)?;
    let registry = InMemoryMatcherRegistry::from_config(&cfg.matchers);
    let task = task_from_args(&args)?;

    if args.dry_run {
        print_dry_run(&settings.shell, &task, variables, registry)?;
        return Ok(0);
    }

    let engine = TaskEngine::new(
        settings,
        Arc::new(ShellSurfaceFactory::new(true)),
        Arc::new(variables),
        Arc::new(registry),
    );

    tokio::spawn(log_events(engine.subscribe()));

    // Ctrl-C → terminate everything.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received; terminating tasks");
            engine.terminate_all().await;
        });
    }

    let result = engine.run(task).await?;
    let exit = result.completion.wait().await;

    let problems = result.problems.snapshot();
    if !problems.is_empty() {
        eprintln!();
        for problem in &problems {
            eprintln!("{}", format_problem(problem));
        }
        eprintln!("{} problem(s) found", problems.len());
    }

    Ok(exit.exit_code.unwrap_or(1))
}

/// Variables from `[variables]`, with `workspaceFolder` defaulting to the
/// current directory.
fn workspace_variables(cfg: &ConfigFile) -> Result<MapVariableResolver> {
    let variables = MapVariableResolver::from_map(cfg.variables.clone());
    if variables.contains("workspaceFolder") {
        return Ok(variables);
    }

    let cwd = std::env::current_dir().context("reading current directory")?;
    Ok(variables.with_variable("workspaceFolder", cwd.display().to_string()))
}

/// Build the ad-hoc task described by the command line.
///
/// The first word is the command name and is passed to the shell as-is, so
/// `taskexec -- 'make && make test'` works. The remaining words are
/// shell-escaped.
pub fn task_from_args(args: &CliArgs) -> Result<Task> {
    let (name, rest) = args
        .command
        .split_first()
        .ok_or_else(|| anyhow!("no command given"))?;

    let label = args
        .label
        .clone()
        .unwrap_or_else(|| args.command.join(" "));

    let command = CommandConfiguration {
        name: Some(CommandValue::Literal(name.clone())),
        args: rest
            .iter()
            .map(|arg| CommandValue::Quoted(CommandString::new(arg.as_str(), ShellQuoting::Escape)))
            .collect(),
        options: CommandOptions {
            cwd: args.cwd.clone(),
            env: args.env.iter().cloned().collect(),
        },
    };

    let mut task = Task::new(label.clone(), label, command);
    task.problem_matchers = args
        .problem_matchers
        .iter()
        .map(|r| MatcherRef::from(r.as_str()))
        .collect();
    Ok(task)
}

/// Print what would be executed: shell, arguments, cwd and matchers.
fn print_dry_run(
    shell: &str,
    task: &Task,
    variables: MapVariableResolver,
    registry: InMemoryMatcherRegistry,
) -> Result<()> {
    let resolver = CommandResolver::new(Arc::new(variables));
    let invocation = resolver.resolve_shell(task)?;
    let cwd = resolver.resolve_cwd(task.command.options.cwd.as_deref())?;
    let matchers = MatcherBinder::new(Arc::new(registry)).resolve(&task.problem_matchers, &resolver)?;

    println!("taskexec dry-run");
    println!("  task: {}", task.display_label());
    println!("  shell: {shell}");
    println!("  args: {:?}", invocation.args);
    println!("  cwd: {cwd}");
    if !task.command.options.env.is_empty() {
        println!("  env: {:?}", task.command.options.env);
    }
    println!("  problem matchers ({}):", matchers.len());
    for matcher in &matchers {
        let name = matcher.name.as_deref().unwrap_or("<inline>");
        println!("    - {name} (owner: {})", matcher.owner);
        if let Some(ref prefix) = matcher.file_prefix {
            println!("        file_prefix: {prefix}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<TaskEvent>) {
    loop {
        match events.recv().await {
            Ok(TaskEvent::ProcessStarted { task, pid }) => {
                debug!(task = %task, pid = ?pid, "process started");
            }
            Ok(TaskEvent::ProcessEnded { task, exit_code }) => {
                info!(task = %task, exit_code = ?exit_code, "task finished");
            }
            Ok(event) => debug!(kind = ?event.kind(), task = %event.task(), "task event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn format_problem(problem: &Problem) -> String {
    let mut location = problem.file.clone();
    if let Some(line) = problem.line {
        location.push_str(&format!(":{line}"));
        if let Some(column) = problem.column {
            location.push_str(&format!(":{column}"));
        }
    }
    format!(
        "{location}: {:?}: {} [{}]",
        problem.severity, problem.message, problem.owner
    )
}
