// src/matcher/binder.rs

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::matcher::{ProblemMatcher, ProblemMatcherRegistry};
use crate::resolve::CommandResolver;
use crate::task::MatcherRef;

/// Resolves a task's matcher references against the registry.
#[derive(Clone)]
pub struct MatcherBinder {
    registry: Arc<dyn ProblemMatcherRegistry>,
}

impl MatcherBinder {
    pub fn new(registry: Arc<dyn ProblemMatcherRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve `refs` into matchers for one run.
    ///
    /// Unknown names are skipped and a name referenced twice yields one
    /// matcher. Matchers with a `file_prefix` are cloned and
    /// get their prefix resolved through `resolver`; the rest are returned as
    /// the registry's shared instance.
    pub fn resolve(
        &self,
        refs: &[MatcherRef],
        resolver: &CommandResolver,
    ) -> Result<Vec<Arc<ProblemMatcher>>> {
        let mut resolved = Vec::with_capacity(refs.len());
        let mut seen = HashSet::new();

        for matcher_ref in refs {
            let matcher = match matcher_ref {
                MatcherRef::Named(name) => {
                    let lookup = name.strip_prefix('$').unwrap_or(name);
                    if !seen.insert(lookup) {
                        debug!(matcher = %name, "duplicate problem matcher reference ignored");
                        continue;
                    }
                    match self.registry.get(lookup) {
                        Some(m) => m,
                        None => {
                            warn!(matcher = %name, "unknown problem matcher; skipping");
                            continue;
                        }
                    }
                }
                MatcherRef::Inline(m) => Arc::new(m.clone()),
            };

            match matcher.file_prefix.as_deref() {
                None => resolved.push(matcher),
                Some(prefix) => {
                    let mut copy = ProblemMatcher::clone(&matcher);
                    copy.file_prefix = Some(resolver.resolve_str(prefix)?);
                    debug!(
                        owner = %copy.owner,
                        prefix = ?copy.file_prefix,
                        "resolved problem matcher file prefix"
                    );
                    resolved.push(Arc::new(copy));
                }
            }
        }

        Ok(resolved)
    }
}
