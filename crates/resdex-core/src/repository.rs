//! Resource repository contract and an in-memory implementation
//!
//! The discovery only reads from repositories: `find` resolves a glob or
//! literal path to resources, `contains` checks a single path. Results must be
//! in a stable order for a given repository state.

use crate::errors::{DiscoveryError, Result};
use crate::glob::{compile_glob, is_glob};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A resource addressed by its absolute path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    path: Arc<str>,
}

impl Resource {
    pub fn new(path: impl Into<Arc<str>>) -> Self {
        Resource { path: path.into() }
    }

    pub fn path(&self) -> &Arc<str> {
        &self.path
    }

    /// Last path segment (`/app/errors.xlf` -> `errors.xlf`)
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Ordered set of resources returned by a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCollection {
    resources: Vec<Resource>,
}

impl ResourceCollection {
    pub fn new(resources: Vec<Resource>) -> Self {
        ResourceCollection { resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.resources.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Arc<str>> {
        self.resources.iter().map(Resource::path)
    }

    pub fn first(&self) -> Option<&Resource> {
        self.resources.first()
    }
}

impl FromIterator<Resource> for ResourceCollection {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        ResourceCollection {
            resources: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ResourceCollection {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceCollection {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

/// Read-only view of a resource store
pub trait ResourceRepository: Send + Sync {
    /// Resolve a glob or literal path
    fn find(&self, query: &str) -> Result<ResourceCollection>;

    /// Whether a resource exists at `path`
    fn contains(&self, path: &str) -> Result<bool>;
}

/// Normalize an absolute resource path, trimming trailing slashes
pub fn normalize_path(path: &str) -> Result<Arc<str>> {
    if !path.starts_with('/') {
        return Err(DiscoveryError::Repository(format!(
            "resource paths must be absolute, got '{}'",
            path
        )));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(DiscoveryError::Repository(format!(
            "resource paths must not contain '..', got '{}'",
            path
        )));
    }
    let trimmed = path.trim_end_matches('/');
    Ok(Arc::from(if trimmed.is_empty() { "/" } else { trimmed }))
}

// =============================================================================
// IN-MEMORY REPOSITORY
// =============================================================================

/// Repository holding a set of paths in memory
///
/// Adding a path also adds every ancestor directory, so `/app/trans/a.xlf`
/// makes `/app/trans`, `/app` and `/` resolvable as well. The set sits behind a
/// lock so a repository shared with a discovery can keep changing.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    paths: RwLock<BTreeSet<Arc<str>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let repository = Self::new();
        for path in paths {
            repository.add(path)?;
        }
        Ok(repository)
    }

    pub fn add(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let mut paths = self.paths.write();
        let mut current: &str = &path;
        while let Some(idx) = current.rfind('/') {
            let parent = if idx == 0 { "/" } else { &current[..idx] };
            if parent == current {
                break;
            }
            paths.insert(Arc::from(parent));
            current = parent;
        }
        paths.insert(path);
        Ok(())
    }

    /// Remove a path and everything below it; returns the number of removed paths
    pub fn remove(&self, path: &str) -> Result<usize> {
        let path = normalize_path(path)?;
        let mut paths = self.paths.write();
        let before = paths.len();
        paths.retain(|p| !crate::glob::is_base_path(&path, p));
        Ok(before - paths.len())
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }
}

impl ResourceRepository for InMemoryRepository {
    fn find(&self, query: &str) -> Result<ResourceCollection> {
        let paths = self.paths.read();
        if is_glob(query) {
            let matcher = compile_glob(query)?;
            Ok(paths
                .iter()
                .filter(|p| matcher.is_match(p.as_ref()))
                .map(|p| Resource::new(p.clone()))
                .collect())
        } else {
            let path = normalize_path(query)?;
            Ok(paths
                .get(&path)
                .map(|p| Resource::new(p.clone()))
                .into_iter()
                .collect())
        }
    }

    fn contains(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        Ok(self.paths.read().contains(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(paths: &[&str]) -> InMemoryRepository {
        match InMemoryRepository::with_paths(paths.iter().copied()) {
            Ok(repo) => repo,
            Err(e) => panic!("repository should build: {e}"),
        }
    }

    #[test]
    fn test_add_registers_ancestors() {
        let repo = repo(&["/app/trans/errors.fr.xlf"]);
        assert_eq!(repo.contains("/app/trans"), Ok(true));
        assert_eq!(repo.contains("/app"), Ok(true));
        assert_eq!(repo.contains("/"), Ok(true));
        assert_eq!(repo.len(), 4);
    }

    #[test]
    fn test_find_glob_in_sorted_order() {
        let repo = repo(&["/file2", "/file1", "/dir/file3"]);
        let found = repo.find("/file*").unwrap_or_default();
        let paths: Vec<&str> = found.paths().map(|p| p.as_ref()).collect();
        assert_eq!(paths, vec!["/file1", "/file2"]);
    }

    #[test]
    fn test_find_literal_path() {
        let repo = repo(&["/file1"]);
        assert_eq!(repo.find("/file1").map(|c| c.len()), Ok(1));
        assert_eq!(repo.find("/missing").map(|c| c.len()), Ok(0));
    }

    #[test]
    fn test_remove_drops_descendants() {
        let repo = repo(&["/app/a", "/app/b", "/other"]);
        assert_eq!(repo.remove("/app"), Ok(3));
        assert_eq!(repo.contains("/app/a"), Ok(false));
        assert_eq!(repo.contains("/other"), Ok(true));
    }

    #[test]
    fn test_relative_paths_rejected() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.add("relative/path"),
            Err(DiscoveryError::Repository(_))
        ));
        assert!(repo.add("/a/../b").is_err());
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(Resource::new("/app/errors.xlf").name(), "errors.xlf");
    }
}
