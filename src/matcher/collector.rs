// src/matcher/collector.rs

//! Per-run problem collector.
//!
//! The execution channel feeds every raw output chunk into
//! [`ProblemCollector::process_output`]. Chunks respect neither line nor
//! UTF-8 boundaries, so the collector keeps an incomplete trailing character
//! and the trailing partial line until the next chunk (or
//! [`ProblemCollector::flush`] at process exit).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use regex::Regex;
use tracing::{debug, warn};

use crate::matcher::{ProblemMatcher, Severity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub owner: String,
    pub file: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub severity: Severity,
    pub message: String,
}

/// Shared view of the problems found during one run.
#[derive(Debug, Clone, Default)]
pub struct ProblemSink {
    problems: Arc<Mutex<Vec<Problem>>>,
}

impl ProblemSink {
    pub fn snapshot(&self) -> Vec<Problem> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, problem: Problem) {
        self.lock().push(problem);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Problem>> {
        self.problems.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct CompiledMatcher {
    matcher: Arc<ProblemMatcher>,
    regex: Regex,
}

pub struct ProblemCollector {
    matchers: Vec<CompiledMatcher>,
    /// Bytes of a character split across chunks.
    partial: Vec<u8>,
    pending: String,
    sink: ProblemSink,
}

impl std::fmt::Debug for ProblemCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProblemCollector")
            .field("matchers", &self.matchers.len())
            .field("problems", &self.sink.len())
            .finish_non_exhaustive()
    }
}

impl ProblemCollector {
    /// Build a collector for one run. Matchers whose regex does not compile
    /// are dropped with a warning.
    pub fn new(matchers: Vec<Arc<ProblemMatcher>>) -> Self {
        let matchers = matchers
            .into_iter()
            .filter_map(|matcher| match Regex::new(&matcher.pattern.regexp) {
                Ok(regex) => Some(CompiledMatcher { matcher, regex }),
                Err(e) => {
                    warn!(
                        owner = %matcher.owner,
                        pattern = %matcher.pattern.regexp,
                        error = %e,
                        "invalid problem matcher regex; ignoring"
                    );
                    None
                }
            })
            .collect();

        Self {
            matchers,
            partial: Vec::new(),
            pending: String::new(),
            sink: ProblemSink::default(),
        }
    }

    pub fn sink(&self) -> ProblemSink {
        self.sink.clone()
    }

    /// Feed a chunk of raw process output. ANSI escapes are stripped before
    /// matching.
    pub fn process_output(&mut self, bytes: &[u8]) {
        if self.matchers.is_empty() {
            return;
        }
        let text = self.decode(bytes);
        if !text.is_empty() {
            self.process_line(&strip_ansi_escapes::strip_str(text));
        }
    }

    /// Decode every complete character of `partial + bytes`; an incomplete
    /// sequence at the end is kept for the next chunk.
    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.partial);
        buf.extend_from_slice(bytes);

        let mut text = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.partial = rest.to_vec();
        text
    }

    /// Feed a chunk of output text.
    pub fn process_line(&mut self, text: &str) {
        if self.matchers.is_empty() {
            return;
        }

        self.pending.push_str(text);
        while let Some(idx) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=idx).collect();
            self.match_line(line.trim_end_matches(['\r', '\n']));
        }
    }

    /// Process whatever partial line is still buffered.
    pub fn flush(&mut self) {
        if !self.partial.is_empty() {
            let tail = String::from_utf8_lossy(&std::mem::take(&mut self.partial)).into_owned();
            self.pending.push_str(&tail);
        }
        if self.pending.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.pending);
        self.match_line(line.trim_end_matches('\r'));
    }

    fn match_line(&self, line: &str) {
        for compiled in &self.matchers {
            if let Some(problem) = extract(&compiled.matcher, &compiled.regex, line) {
                debug!(
                    owner = %problem.owner,
                    file = %problem.file,
                    line = ?problem.line,
                    "problem matched"
                );
                self.sink.push(problem);
                return;
            }
        }
    }
}

fn extract(matcher: &ProblemMatcher, regex: &Regex, line: &str) -> Option<Problem> {
    let caps = regex.captures(line)?;
    let pattern = &matcher.pattern;
    let group = |idx: usize| caps.get(idx).map(|m| m.as_str());
    let number = |idx: Option<usize>| idx.and_then(group).and_then(|s| s.parse::<u32>().ok());

    let file = group(pattern.file)?;
    let message = group(pattern.message).unwrap_or_default();
    let severity = pattern
        .severity
        .and_then(group)
        .and_then(Severity::from_captured)
        .unwrap_or(matcher.severity);

    let file = match matcher.file_prefix.as_deref() {
        Some(prefix) if Path::new(file).is_relative() => {
            Path::new(prefix).join(file).to_string_lossy().into_owned()
        }
        _ => file.to_string(),
    };

    Some(Problem {
        owner: matcher.owner.clone(),
        file,
        line: number(pattern.line),
        column: number(pattern.column),
        severity,
        message: message.to_string(),
    })
}
