#![allow(dead_code)]

use taskexec::matcher::{ProblemMatcher, ProblemPattern, Severity};
use taskexec::task::{
    CommandConfiguration, CommandString, CommandValue, MatcherRef, ShellQuoting, Task,
};

/// Builder for `Task` to simplify test setup.
///
/// Defaults: id = label, command `echo` with no arguments, no matchers.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(label: &str) -> Self {
        let command = CommandConfiguration {
            name: Some(CommandValue::from("echo")),
            ..Default::default()
        };
        Self {
            task: Task::new(label, label, command),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn qualified_label(mut self, label: &str) -> Self {
        self.task.qualified_label = Some(label.to_string());
        self
    }

    pub fn command(mut self, name: &str) -> Self {
        self.task.command.name = Some(CommandValue::from(name));
        self
    }

    pub fn no_command(mut self) -> Self {
        self.task.command.name = None;
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.task.command.args.push(CommandValue::from(arg));
        self
    }

    pub fn quoted_arg(mut self, arg: &str, quoting: ShellQuoting) -> Self {
        self.task
            .command
            .args
            .push(CommandValue::Quoted(CommandString::new(arg, quoting)));
        self
    }

    pub fn cwd(mut self, cwd: &str) -> Self {
        self.task.command.options.cwd = Some(cwd.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task
            .command
            .options
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn matcher(mut self, reference: &str) -> Self {
        self.task.problem_matchers.push(MatcherRef::from(reference));
        self
    }

    pub fn inline_matcher(mut self, matcher: ProblemMatcher) -> Self {
        self.task.problem_matchers.push(MatcherRef::Inline(matcher));
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// `file(line,col): severity message`, tsc style.
pub fn tsc_matcher(file_prefix: Option<&str>) -> ProblemMatcher {
    ProblemMatcher {
        name: None,
        owner: "typescript".to_string(),
        file_prefix: file_prefix.map(str::to_string),
        severity: Severity::Error,
        pattern: ProblemPattern {
            regexp: r"^(.*)\((\d+),(\d+)\): (error|warning) (.*)$".to_string(),
            file: 1,
            line: Some(2),
            column: Some(3),
            severity: Some(4),
            message: 5,
        },
    }
}

/// `file:line: message`, gcc-ish, with a fixed severity.
pub fn simple_matcher(owner: &str, severity: Severity) -> ProblemMatcher {
    ProblemMatcher {
        name: None,
        owner: owner.to_string(),
        file_prefix: None,
        severity,
        pattern: ProblemPattern {
            regexp: r"^([^:\s]+):(\d+): (.*)$".to_string(),
            file: 1,
            line: Some(2),
            column: None,
            severity: None,
            message: 3,
        },
    }
}
