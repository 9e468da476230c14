//! Filesystem-backed resource repository
//!
//! Resources are the files and directories below a root directory, addressed
//! as `/`-rooted paths relative to that root. Glob queries only walk the
//! literal base directory of the pattern.

use crate::errors::{DiscoveryError, Result};
use crate::glob::{compile_glob, glob_base_path, is_glob};
use crate::repository::{normalize_path, Resource, ResourceCollection, ResourceRepository};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct FilesystemRepository {
    root: PathBuf,
}

impl FilesystemRepository {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DiscoveryError::Repository(format!(
                "repository root is not a directory: {}",
                root.display()
            )));
        }
        Ok(FilesystemRepository { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn to_fs_path(&self, resource_path: &str) -> Result<PathBuf> {
        let normalized = normalize_path(resource_path)?;
        Ok(normalized
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment)))
    }

    fn to_resource_path(&self, fs_path: &Path) -> Option<String> {
        let relative = fs_path.strip_prefix(&self.root).ok()?;
        let mut path = String::new();
        for component in relative.components() {
            if let Component::Normal(segment) = component {
                path.push('/');
                path.push_str(segment.to_str()?);
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Some(path)
    }
}

impl ResourceRepository for FilesystemRepository {
    fn find(&self, query: &str) -> Result<ResourceCollection> {
        if !is_glob(query) {
            let fs_path = self.to_fs_path(query)?;
            if !fs_path.exists() {
                return Ok(ResourceCollection::default());
            }
            let path = normalize_path(query)?;
            return Ok(ResourceCollection::new(vec![Resource::new(path)]));
        }

        let matcher = compile_glob(query)?;
        let base = self.to_fs_path(glob_base_path(query))?;
        if !base.exists() {
            return Ok(ResourceCollection::default());
        }

        let mut found: Vec<Resource> = WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.to_resource_path(entry.path()))
            .filter(|path| matcher.is_match(path))
            .map(Resource::new)
            .collect();
        found.sort();

        tracing::debug!(query, matches = found.len(), "resolved glob on filesystem");
        Ok(ResourceCollection::new(found))
    }

    fn contains(&self, path: &str) -> Result<bool> {
        Ok(self.to_fs_path(path)?.exists())
    }
}
