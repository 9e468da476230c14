//! Synchronized binding indices
//!
//! `BindingIndex` stores every binding under an integer id and keeps the
//! secondary indices (query, class name, type name, uuid and optionally
//! resolved resource path) in step with that store.
//!
//! Mutations are split into a fallible `prepare` step, which does all
//! resolution work, and an infallible `insert`/`remove` step, so a failed
//! operation never leaves the indices half updated.

use crate::binding::{Binding, BindingKind, BindingTarget};
use crate::errors::Result;
use crate::glob::QueryPattern;
use ahash::AHashMap;
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Internal binding id, assigned in insertion order and never reused
pub type BindingId = u64;

/// Ordered id set; iteration order is insertion order
pub type IdSet = BTreeSet<BindingId>;

/// How `ids_for_path` answers resource-path lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathLookup {
    /// Test every stored query against the path; follows repository changes
    #[default]
    GlobScan,
    /// Read the resource paths resolved when each binding was inserted
    ResolvedIndex,
}

/// A binding whose index keys have been computed
#[derive(Debug)]
pub struct PreparedBinding {
    binding: Binding,
    resource_paths: SmallVec<[Arc<str>; 4]>,
}

impl PreparedBinding {
    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

#[derive(Debug, Clone)]
struct QueryEntry {
    pattern: QueryPattern,
    ids: IdSet,
}

#[derive(Debug, Clone, Default)]
pub struct BindingIndex {
    lookup: PathLookup,
    next_id: BindingId,
    bindings: BTreeMap<BindingId, Binding>,
    by_query: AHashMap<Arc<str>, QueryEntry>,
    by_class: AHashMap<Arc<str>, IdSet>,
    by_type: AHashMap<Arc<str>, IdSet>,
    by_uuid: AHashMap<Uuid, BindingId>,
    by_resource_path: AHashMap<Arc<str>, IdSet>,
    /// Resource paths each id was indexed under, so removal never resolves
    indexed_paths: AHashMap<BindingId, SmallVec<[Arc<str>; 4]>>,
}

impl BindingIndex {
    pub fn new(lookup: PathLookup) -> Self {
        BindingIndex {
            lookup,
            ..Default::default()
        }
    }

    pub fn lookup(&self) -> PathLookup {
        self.lookup
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Id the next inserted binding will receive
    pub fn next_id(&self) -> BindingId {
        self.next_id
    }

    /// Move the id counter forward to at least `next_id`; it never moves back
    pub fn advance_next_id(&mut self, next_id: BindingId) {
        self.next_id = self.next_id.max(next_id);
    }

    /// Compute every index key of `binding` before touching the index
    ///
    /// With the resolved-index strategy this resolves the binding's resources.
    pub fn prepare(&self, binding: Binding) -> Result<PreparedBinding> {
        let resource_paths = match (self.lookup, binding.kind()) {
            (PathLookup::ResolvedIndex, BindingKind::Resource) => {
                binding.resources()?.paths().cloned().collect()
            }
            _ => SmallVec::new(),
        };
        Ok(PreparedBinding {
            binding,
            resource_paths,
        })
    }

    /// Id of a stored binding equal to `binding`, looking only under the same key
    pub fn find_duplicate(&self, binding: &Binding) -> Option<BindingId> {
        self.ids_for_key(binding.kind(), binding.key())
            .into_iter()
            .flatten()
            .copied()
            .find(|id| self.bindings.get(id).is_some_and(|stored| stored == binding))
    }

    /// Whether `insert` can still hand out an unused id
    pub fn has_free_id(&self) -> bool {
        self.next_id < BindingId::MAX
    }

    pub fn insert(&mut self, prepared: PreparedBinding) -> BindingId {
        let id = self.next_id;
        self.insert_with_id(id, prepared);
        id
    }

    /// Insert under a persisted id; later inserts continue after the highest id seen
    ///
    /// `BindingId::MAX` is never a valid persisted id: nothing could follow it.
    pub fn insert_with_id(&mut self, id: BindingId, prepared: PreparedBinding) {
        let PreparedBinding {
            binding,
            resource_paths,
        } = prepared;

        if self.bindings.contains_key(&id) {
            self.remove(id);
        }

        match binding.target() {
            BindingTarget::Resource { query, pattern, .. } => {
                self.by_query
                    .entry(query.clone())
                    .or_insert_with(|| QueryEntry {
                        pattern: pattern.clone(),
                        ids: IdSet::new(),
                    })
                    .ids
                    .insert(id);
            }
            BindingTarget::Class { class_name } => {
                self.by_class
                    .entry(class_name.clone())
                    .or_default()
                    .insert(id);
            }
        }

        self.by_type
            .entry(binding.type_name().clone())
            .or_default()
            .insert(id);
        self.by_uuid.insert(binding.uuid(), id);

        for path in &resource_paths {
            self.by_resource_path
                .entry(path.clone())
                .or_default()
                .insert(id);
        }
        if !resource_paths.is_empty() {
            self.indexed_paths.insert(id, resource_paths);
        }

        self.bindings.insert(id, binding);
        self.next_id = self.next_id.max(id.saturating_add(1));
    }

    /// Remove one binding from the store and every index
    pub fn remove(&mut self, id: BindingId) -> Option<Binding> {
        let binding = self.bindings.remove(&id)?;

        match binding.kind() {
            BindingKind::Resource => {
                if let Some(entry) = self.by_query.get_mut(binding.key().as_ref()) {
                    entry.ids.remove(&id);
                    if entry.ids.is_empty() {
                        self.by_query.remove(binding.key().as_ref());
                    }
                }
            }
            BindingKind::Class => detach(&mut self.by_class, binding.key(), id),
        }
        detach(&mut self.by_type, binding.type_name(), id);
        self.by_uuid.remove(&binding.uuid());

        if let Some(paths) = self.indexed_paths.remove(&id) {
            for path in &paths {
                detach(&mut self.by_resource_path, path, id);
            }
        }

        Some(binding)
    }

    /// Remove every binding in `ids`, returning them with their ids
    pub fn remove_all(&mut self, ids: impl IntoIterator<Item = BindingId>) -> Vec<(BindingId, Binding)> {
        ids.into_iter()
            .filter_map(|id| self.remove(id).map(|binding| (id, binding)))
            .collect()
    }

    /// Drop all bindings; ids keep counting from where they were
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.by_query.clear();
        self.by_class.clear();
        self.by_type.clear();
        self.by_uuid.clear();
        self.by_resource_path.clear();
        self.indexed_paths.clear();
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    pub fn id_for_uuid(&self, uuid: &Uuid) -> Option<BindingId> {
        self.by_uuid.get(uuid).copied()
    }

    /// All bindings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.bindings.iter().map(|(id, binding)| (*id, binding))
    }

    pub fn ids_for_type(&self, type_name: &str) -> Option<&IdSet> {
        self.by_type.get(type_name)
    }

    /// Ids stored under an exact query (resource) or class name (class)
    pub fn ids_for_key(&self, kind: BindingKind, key: &str) -> Option<&IdSet> {
        match kind {
            BindingKind::Resource => self.by_query.get(key).map(|entry| &entry.ids),
            BindingKind::Class => self.by_class.get(key),
        }
    }

    /// Ids of resource bindings selecting `resource_path`, deduplicated and ordered
    pub fn ids_for_path(&self, resource_path: &str) -> IdSet {
        match self.lookup {
            PathLookup::GlobScan => self
                .by_query
                .values()
                .filter(|entry| entry.pattern.matches(resource_path))
                .flat_map(|entry| entry.ids.iter().copied())
                .collect(),
            PathLookup::ResolvedIndex => self
                .by_resource_path
                .get(resource_path)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Materialize ids into bindings, skipping unknown ids
    pub fn materialize<I>(&self, ids: I) -> Vec<&Binding>
    where
        I: IntoIterator,
        I::Item: Borrow<BindingId>,
    {
        ids.into_iter()
            .filter_map(|id| self.bindings.get(id.borrow()))
            .collect()
    }

    /// Check that every index agrees with the store
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let mut from_types = IdSet::new();
        for (name, ids) in &self.by_type {
            assert!(!ids.is_empty(), "empty type entry {name}");
            for id in ids {
                let binding = self.bindings.get(id);
                assert!(binding.is_some_and(|b| b.type_name() == name));
                from_types.insert(*id);
            }
        }
        let stored: IdSet = self.bindings.keys().copied().collect();
        assert_eq!(from_types, stored);

        let mut from_keys = IdSet::new();
        for entry in self.by_query.values() {
            from_keys.extend(entry.ids.iter().copied());
        }
        for ids in self.by_class.values() {
            from_keys.extend(ids.iter().copied());
        }
        assert_eq!(from_keys, stored);
        assert_eq!(self.by_uuid.len(), self.bindings.len());
        for (id, paths) in &self.indexed_paths {
            assert!(self.bindings.contains_key(id));
            for path in paths {
                assert!(self
                    .by_resource_path
                    .get(path)
                    .is_some_and(|ids| ids.contains(id)));
            }
        }
    }
}

fn detach(index: &mut AHashMap<Arc<str>, IdSet>, key: &Arc<str>, id: BindingId) {
    if let Some(ids) = index.get_mut(key.as_ref()) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key.as_ref());
        }
    }
}
