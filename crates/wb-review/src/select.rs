// select.rs — Path pattern matching for selective review.
//
// Patterns are globs over workspace-relative paths:
//   "src/**"      → every file under src/
//   "*.md"        → markdown files at the root only
//   "**/*.rs"     → Rust files anywhere
// `*` never crosses a `/`.

use glob::{MatchOptions, Pattern};

use crate::error::ReviewError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled set of path patterns; a path matches if any pattern does.
#[derive(Debug, Clone)]
pub struct PathSelector {
    patterns: Vec<Pattern>,
}

impl PathSelector {
    /// Compile patterns. An invalid pattern is an error, not a silent non-match.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ReviewError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|source| ReviewError::InvalidPattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_stays_within_a_directory() {
        let selector = PathSelector::new(&["*.md"]).unwrap();
        assert!(selector.matches("README.md"));
        assert!(!selector.matches("docs/guide.md"));
    }

    #[test]
    fn double_star_recurses() {
        let selector = PathSelector::new(&["src/**"]).unwrap();
        assert!(selector.matches("src/main.rs"));
        assert!(selector.matches("src/a/b/c.rs"));
        assert!(!selector.matches("tests/main.rs"));
    }

    #[test]
    fn any_pattern_matches() {
        let selector = PathSelector::new(&["*.toml", "**/*.rs"]).unwrap();
        assert!(selector.matches("Cargo.toml"));
        assert!(selector.matches("crates/x/src/lib.rs"));
        assert!(!selector.matches("notes.txt"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = PathSelector::new(&["src/[unclosed"]).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidPattern { .. }));
    }
}
