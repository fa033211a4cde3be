//! Include/exclude filtering of tables by dotted path.
//!
//! Patterns use glob syntax and are matched case-insensitively against
//! `database.schema.table`:
//! - `*` matches any sequence of characters, dots included
//! - `?` matches any single character
//! - `[abc]` matches any character in the set
//!
//! A table is eligible iff it matches at least one include pattern and no
//! exclude pattern. An empty include list matches nothing; callers that want
//! "everything" pass `*` explicitly.

use crate::error::{DmapError, Result};
use crate::models::TablePath;
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled include and exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    /// Compiles include and exclude patterns.
    ///
    /// # Errors
    /// Returns `InvalidPattern` for the first pattern that fails to compile.
    pub fn new<I, E>(include: I, exclude: E) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Filter that admits every table.
    pub fn include_all() -> Self {
        Self {
            include: vec![Pattern::new("*").unwrap_or_default()],
            exclude: Vec::new(),
        }
    }

    /// Returns true if the table at `path` should be sampled.
    pub fn matches(&self, path: &TablePath) -> bool {
        self.matches_dotted(&path.to_string())
    }

    /// Same as [`PathFilter::matches`] for an already dotted path.
    pub fn matches_dotted(&self, dotted: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches_with(dotted, MATCH_OPTIONS)) {
            return false;
        }
        self.include.iter().any(|p| p.matches_with(dotted, MATCH_OPTIONS))
    }
}

fn compile<P>(patterns: P) -> Result<Vec<Pattern>>
where
    P: IntoIterator,
    P::Item: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| {
            let p = p.as_ref();
            Pattern::new(p).map_err(|source| DmapError::InvalidPattern {
                pattern: p.to_string(),
                source,
            })
        })
        .collect()
}
