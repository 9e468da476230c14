//! Query matching against resource paths
//!
//! A query containing `*` is a glob: `*` matches within one path segment and
//! `**` across segments. Any other query is a literal path that matches itself
//! and every resource below it.

use crate::errors::{DiscoveryError, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::sync::Arc;

/// Whether `query` contains a glob wildcard
#[inline]
pub fn is_glob(query: &str) -> bool {
    query.contains('*')
}

/// Whether `base` is `path` itself or one of its ancestor directories
pub fn is_base_path(base: &str, path: &str) -> bool {
    if base == path {
        return true;
    }
    let prefix = base.trim_end_matches('/');
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Longest literal directory prefix of a glob (`/app/*.xlf` -> `/app`)
pub fn glob_base_path(pattern: &str) -> &str {
    let literal = match pattern.find(['*', '?', '[', '{']) {
        Some(idx) => &pattern[..idx],
        None => return pattern,
    };
    match literal.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &literal[..idx],
    }
}

/// Compile a glob with separator-aware wildcards
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| DiscoveryError::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Whether `resource_path` is selected by the stored binding `query`
///
/// Malformed glob queries never match.
pub fn resource_path_matches_query(resource_path: &str, query: &str) -> bool {
    if is_glob(query) {
        compile_glob(query).is_ok_and(|matcher| matcher.is_match(resource_path))
    } else {
        is_base_path(query, resource_path)
    }
}

/// A binding query compiled once for repeated matching
#[derive(Debug, Clone)]
pub enum QueryPattern {
    Glob(GlobMatcher),
    Path(Arc<str>),
}

impl QueryPattern {
    pub fn parse(query: &str) -> Result<Self> {
        if is_glob(query) {
            compile_glob(query).map(QueryPattern::Glob)
        } else {
            Ok(QueryPattern::Path(Arc::from(query)))
        }
    }

    /// Same semantics as [`resource_path_matches_query`]
    pub fn matches(&self, resource_path: &str) -> bool {
        match self {
            QueryPattern::Glob(matcher) => matcher.is_match(resource_path),
            QueryPattern::Path(base) => is_base_path(base, resource_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_query_matches_itself_and_descendants() {
        assert!(resource_path_matches_query("/app/trans", "/app/trans"));
        assert!(resource_path_matches_query(
            "/app/trans/errors.fr.xlf",
            "/app/trans"
        ));
        assert!(!resource_path_matches_query("/app/translations", "/app/trans"));
        assert!(!resource_path_matches_query("/app", "/app/trans"));
    }

    #[test]
    fn test_root_is_base_of_everything() {
        assert!(is_base_path("/", "/file1"));
        assert!(is_base_path("/", "/"));
        assert!(is_base_path("/app/", "/app/x"));
    }

    #[test]
    fn test_glob_star_stays_within_segment() {
        assert!(resource_path_matches_query("/file1", "/file*"));
        assert!(!resource_path_matches_query("/dir/file1", "/file*"));
        assert!(resource_path_matches_query("/app/a/b.xlf", "/app/**/*.xlf"));
        assert!(!resource_path_matches_query("/app/a/b.xlf", "/app/*.xlf"));
    }

    #[test]
    fn test_malformed_glob_never_matches() {
        assert!(!resource_path_matches_query("/a[", "/a[*"));
        assert!(matches!(
            QueryPattern::parse("/a[*"),
            Err(DiscoveryError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_glob_base_path() {
        assert_eq!(glob_base_path("/app/trans/*.xlf"), "/app/trans");
        assert_eq!(glob_base_path("/file*"), "/");
        assert_eq!(glob_base_path("/a/b*/c"), "/a");
        assert_eq!(glob_base_path("/plain/path"), "/plain/path");
    }

    #[test]
    fn test_pattern_agrees_with_free_function() {
        for (path, query) in [
            ("/file1", "/file*"),
            ("/a/b", "/a"),
            ("/a/b", "/a/*"),
            ("/ab", "/a"),
        ] {
            let Ok(pattern) = QueryPattern::parse(query) else {
                panic!("query {query} should parse");
            };
            assert_eq!(
                pattern.matches(path),
                resource_path_matches_query(path, query)
            );
        }
    }
}
