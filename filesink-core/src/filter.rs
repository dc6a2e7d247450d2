use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Exclusion filter compiled from the configured glob patterns.
#[derive(Debug, Clone)]
pub struct PathFilter {
    exclude: GlobSet,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            exclude: GlobSet::empty(),
        }
    }
}

impl PathFilter {
    /// Build a filter from patterns. Patterns that fail to compile are ignored individually.
    pub fn new<S: AsRef<str>>(exclude: &[S]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pat in exclude {
            match Glob::new(pat.as_ref()) {
                Ok(g) => {
                    builder.add(g);
                }
                Err(e) => tracing::warn!("ignoring exclude pattern {:?}: {e}", pat.as_ref()),
            }
        }
        Self {
            exclude: builder.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }

    /// Whether a given file should be synced.
    pub fn check<P: AsRef<Path>>(&self, path: P) -> bool {
        !self.exclude.is_match(path.as_ref())
    }
}
