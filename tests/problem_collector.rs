// tests/problem_collector.rs

use std::sync::Arc;

use taskexec::matcher::{ProblemCollector, ProblemMatcher, ProblemPattern, Severity};
use taskexec_test_utils::builders::{simple_matcher, tsc_matcher};

fn collector(matchers: Vec<ProblemMatcher>) -> ProblemCollector {
    ProblemCollector::new(matchers.into_iter().map(Arc::new).collect())
}

#[test]
fn chunks_split_mid_line_are_reassembled() {
    let mut c = collector(vec![tsc_matcher(None)]);
    let sink = c.sink();

    c.process_line("src/a.ts(3,");
    assert!(sink.is_empty());
    c.process_line("7): error TS2322: bad type\nnoise\n");

    let problems = sink.snapshot();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].file, "src/a.ts");
    assert_eq!(problems[0].line, Some(3));
    assert_eq!(problems[0].column, Some(7));
    assert_eq!(problems[0].severity, Severity::Error);
    assert_eq!(problems[0].message, "TS2322: bad type");
}

#[test]
fn relative_files_get_the_prefix() {
    let mut c = collector(vec![tsc_matcher(Some("/proj"))]);
    let sink = c.sink();

    c.process_line("src/a.ts(1,1): warning unused\r\n/abs/b.ts(2,2): error broken\n");

    let problems = sink.snapshot();
    assert_eq!(problems.len(), 2);
    assert_eq!(problems[0].file, "/proj/src/a.ts");
    assert_eq!(problems[0].severity, Severity::Warning);
    assert_eq!(problems[1].file, "/abs/b.ts");
}

#[test]
fn default_severity_is_used_without_a_severity_group() {
    let mut c = collector(vec![simple_matcher("lint", Severity::Info)]);
    let sink = c.sink();

    c.process_line("main.c:12: consider const\n");

    let problems = sink.snapshot();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].owner, "lint");
    assert_eq!(problems[0].severity, Severity::Info);
    assert_eq!(problems[0].column, None);
}

#[test]
fn flush_processes_the_trailing_partial_line() {
    let mut c = collector(vec![simple_matcher("lint", Severity::Error)]);
    let sink = c.sink();

    c.process_line("main.c:4: no newline");
    assert!(sink.is_empty());
    c.flush();

    assert_eq!(sink.len(), 1);
}

#[test]
fn invalid_regex_is_dropped_and_others_still_match() {
    let broken = ProblemMatcher {
        name: Some("broken".to_string()),
        owner: "broken".to_string(),
        file_prefix: None,
        severity: Severity::Error,
        pattern: ProblemPattern {
            regexp: "(unclosed".to_string(),
            file: 1,
            line: None,
            column: None,
            severity: None,
            message: 1,
        },
    };
    let mut c = collector(vec![broken, simple_matcher("lint", Severity::Warning)]);
    let sink = c.sink();

    c.process_line("lib.rs:9: something\n");

    let problems = sink.snapshot();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].owner, "lint");
}

#[test]
fn first_matching_matcher_wins() {
    let mut c = collector(vec![
        simple_matcher("first", Severity::Error),
        simple_matcher("second", Severity::Error),
    ]);
    let sink = c.sink();

    c.process_line("x.c:1: once\n");

    let problems = sink.snapshot();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].owner, "first");
}

#[test]
fn multibyte_characters_survive_chunk_splits() {
    let mut c = collector(vec![tsc_matcher(None)]);
    let sink = c.sink();

    c.process_output(b"a.ts(1,1): error caf\xC3");
    assert!(sink.is_empty());
    c.process_output(b"\xA9\n");

    let problems = sink.snapshot();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].message, "caf\u{e9}");
}

#[test]
fn invalid_bytes_and_escapes_do_not_block_matching() {
    let mut c = collector(vec![simple_matcher("lint", Severity::Error)]);
    let sink = c.sink();

    c.process_output(b"\x1b[1mbad\xFF.c:3: oops\x1b[0m\n");
    c.process_output(b"tail.c:4: cut \xE2\x82");
    c.flush();

    let problems = sink.snapshot();
    assert_eq!(problems.len(), 2);
    assert_eq!(problems[0].file, "bad\u{FFFD}.c");
    assert_eq!(problems[0].message, "oops");
    assert_eq!(problems[1].file, "tail.c");
    assert_eq!(problems[1].message, "cut \u{FFFD}");
}
