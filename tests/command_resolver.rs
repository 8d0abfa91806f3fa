// tests/command_resolver.rs

use std::error::Error;
use std::sync::Arc;

use proptest::prelude::*;

use taskexec::errors::EngineError;
use taskexec::resolve::{CommandResolver, MapVariableResolver};
use taskexec::task::ShellQuoting;
use taskexec_test_utils::builders::TaskBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn resolver() -> CommandResolver {
    let variables = MapVariableResolver::new()
        .with_variable("workspaceFolder", "/proj")
        .with_variable("target", "release");
    CommandResolver::new(Arc::new(variables)).with_separator('/')
}

fn flag() -> &'static str {
    if cfg!(windows) { "/C" } else { "-c" }
}

#[test]
fn path_segments_are_resolved_piecewise() -> TestResult {
    let task = TaskBuilder::new("run")
        .command("${workspaceFolder}/bin/run")
        .arg("--out=${workspaceFolder}/out/${target}")
        .build();

    let invocation = resolver().resolve_shell(&task)?;

    assert_eq!(invocation.args.len(), 2);
    assert_eq!(invocation.args[0], flag());
    assert_eq!(invocation.command_line(), "/proj/bin/run --out=/proj/out/release");
    Ok(())
}

#[test]
fn empty_argument_list_is_fine() -> TestResult {
    let task = TaskBuilder::new("make").command("make").build();

    let invocation = resolver().resolve_shell(&task)?;

    assert_eq!(invocation.args, vec![flag().to_string(), "make".to_string()]);
    Ok(())
}

#[test]
fn strong_and_weak_quoting_are_rendered() -> TestResult {
    let task = TaskBuilder::new("echo")
        .quoted_arg("it's ${target}", ShellQuoting::Strong)
        .quoted_arg(r#"say "hi" `now`"#, ShellQuoting::Weak)
        .build();

    let invocation = resolver().resolve_shell(&task)?;

    assert_eq!(
        invocation.command_line(),
        r#"echo 'it'\''s release' "say \"hi\" \`now\`""#
    );
    Ok(())
}

#[test]
fn escaped_arguments_survive_shell_splitting() -> TestResult {
    let task = TaskBuilder::new("echo")
        .quoted_arg("hello world", ShellQuoting::Escape)
        .quoted_arg("$HOME; rm", ShellQuoting::Escape)
        .build();

    let invocation = resolver().resolve_shell(&task)?;
    let words = shlex::split(invocation.command_line()).ok_or("unbalanced quoting")?;

    assert_eq!(words, vec!["echo", "hello world", "$HOME; rm"]);
    Ok(())
}

#[test]
fn literal_values_are_joined_verbatim() -> TestResult {
    let task = TaskBuilder::new("chain")
        .command("make && make test")
        .build();

    let invocation = resolver().resolve_shell(&task)?;

    assert_eq!(invocation.command_line(), "make && make test");
    Ok(())
}

#[test]
fn missing_command_name_fails() {
    let task = TaskBuilder::new("broken").no_command().arg("x").build();

    let err = resolver().resolve_shell(&task).unwrap_err();

    assert!(matches!(err, EngineError::MissingCommand(ref label) if label == "broken"));
}

#[test]
fn unknown_variable_fails() {
    let task = TaskBuilder::new("t").command("${nope}/bin").build();

    let err = resolver().resolve_shell(&task).unwrap_err();

    assert!(matches!(err, EngineError::UnknownVariable { ref variable, .. } if variable == "nope"));
}

#[test]
fn cwd_defaults_to_workspace_folder() -> TestResult {
    let r = resolver();

    assert_eq!(r.resolve_cwd(None)?, "/proj");
    assert_eq!(r.resolve_cwd(Some("${workspaceFolder}/sub"))?, "/proj/sub");
    assert_eq!(r.resolve_cwd(Some("/tmp"))?, "/tmp");
    Ok(())
}

#[test]
fn label_in_error_uses_qualified_label() {
    let task = TaskBuilder::new("build")
        .qualified_label("workspace: build")
        .no_command()
        .build();

    let err = resolver().resolve_shell(&task).unwrap_err();

    assert_eq!(err.to_string(), "task 'workspace: build' has no command name");
}

proptest! {
    #[test]
    fn strings_without_placeholders_are_unchanged(value in "[a-zA-Z0-9/._ -]{0,40}") {
        let resolved = resolver().resolve_segment(&value).unwrap();
        prop_assert_eq!(resolved, value);
    }

    #[test]
    fn path_splitting_matches_whole_string_resolution(
        parts in proptest::collection::vec("[a-z]{0,6}", 1..6)
    ) {
        let value = format!("${{workspaceFolder}}/{}", parts.join("/"));
        let r = resolver();
        prop_assert_eq!(r.resolve_segment(&value).unwrap(), r.resolve_str(&value).unwrap());
    }
}
