// tests/matcher_binder.rs

use std::error::Error;
use std::sync::Arc;

use taskexec::matcher::{InMemoryMatcherRegistry, MatcherBinder, ProblemMatcherRegistry, Severity};
use taskexec::resolve::{CommandResolver, MapVariableResolver};
use taskexec::task::MatcherRef;
use taskexec_test_utils::builders::{simple_matcher, tsc_matcher};

type TestResult = Result<(), Box<dyn Error>>;

fn registry() -> Arc<InMemoryMatcherRegistry> {
    let mut registry = InMemoryMatcherRegistry::new();
    registry.register("tsc", tsc_matcher(Some("${workspaceFolder}/src")));
    registry.register("gcc", simple_matcher("cpp", Severity::Error));
    Arc::new(registry)
}

fn resolver() -> CommandResolver {
    CommandResolver::new(Arc::new(
        MapVariableResolver::new().with_variable("workspaceFolder", "/proj"),
    ))
}

#[test]
fn empty_refs_give_no_matchers() -> TestResult {
    let binder = MatcherBinder::new(registry());

    let matchers = binder.resolve(&[], &resolver())?;

    assert!(matchers.is_empty());
    Ok(())
}

#[test]
fn unknown_matchers_are_skipped() -> TestResult {
    let binder = MatcherBinder::new(registry());
    let refs = vec![MatcherRef::from("$nonexistent"), MatcherRef::from("$tsc")];

    let matchers = binder.resolve(&refs, &resolver())?;

    assert_eq!(matchers.len(), 1);
    assert_eq!(matchers[0].owner, "typescript");
    Ok(())
}

#[test]
fn bare_names_are_looked_up_as_is() -> TestResult {
    let binder = MatcherBinder::new(registry());

    let matchers = binder.resolve(&[MatcherRef::from("gcc")], &resolver())?;

    assert_eq!(matchers.len(), 1);
    assert_eq!(matchers[0].name.as_deref(), Some("gcc"));
    Ok(())
}

#[test]
fn matchers_without_prefix_are_shared() -> TestResult {
    let registry = registry();
    let binder = MatcherBinder::new(registry.clone());

    let matchers = binder.resolve(&[MatcherRef::from("$gcc")], &resolver())?;
    let shared = registry.get("gcc").ok_or("gcc not registered")?;

    assert!(Arc::ptr_eq(&matchers[0], &shared));
    Ok(())
}

#[test]
fn file_prefix_is_resolved_on_a_copy() -> TestResult {
    let registry = registry();
    let binder = MatcherBinder::new(registry.clone());

    let matchers = binder.resolve(&[MatcherRef::from("$tsc")], &resolver())?;
    let original = registry.get("tsc").ok_or("tsc not registered")?;

    assert_eq!(matchers[0].file_prefix.as_deref(), Some("/proj/src"));
    assert_eq!(original.file_prefix.as_deref(), Some("${workspaceFolder}/src"));
    assert!(!Arc::ptr_eq(&matchers[0], &original));
    Ok(())
}

#[test]
fn inline_matchers_take_part_in_prefix_resolution() -> TestResult {
    let binder = MatcherBinder::new(registry());
    let refs = vec![
        MatcherRef::Inline(tsc_matcher(Some("${workspaceFolder}"))),
        MatcherRef::from("$gcc"),
    ];

    let matchers = binder.resolve(&refs, &resolver())?;

    assert_eq!(matchers.len(), 2);
    assert_eq!(matchers[0].file_prefix.as_deref(), Some("/proj"));
    assert_eq!(matchers[1].owner, "cpp");
    Ok(())
}

#[test]
fn unresolvable_prefix_is_an_error() {
    let binder = MatcherBinder::new(registry());
    let refs = vec![MatcherRef::Inline(tsc_matcher(Some("${missing}")))];

    assert!(binder.resolve(&refs, &resolver()).is_err());
}

#[test]
fn repeated_names_resolve_once() -> TestResult {
    let binder = MatcherBinder::new(registry());
    let refs = vec![
        MatcherRef::from("$gcc"),
        MatcherRef::from("$tsc"),
        MatcherRef::from("$gcc"),
        MatcherRef::from("tsc"),
    ];

    let matchers = binder.resolve(&refs, &resolver())?;

    let owners: Vec<_> = matchers.iter().map(|m| m.owner.as_str()).collect();
    assert_eq!(owners, ["cpp", "typescript"]);
    Ok(())
}
