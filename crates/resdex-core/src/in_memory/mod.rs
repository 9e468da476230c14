//! In-memory discovery
//!
//! `InMemoryDiscovery` owns the type registry and a `BindingIndex`, and
//! implements the bind/unbind/define/undefine protocol on top of them. The
//! editable and manageable variants are the same struct with a different
//! `DiscoveryConfig`.
//!
//! The `*_tracked` methods return the ids they touched so persistent
//! discoveries can write through only what changed.

use crate::binding::{Binding, BindingKind};
use crate::discovery::{
    BindRequest, Discovery, DiscoveryConfig, EditableDiscovery, Resolution, UnbindRequest,
    UnknownTypePolicy,
};
use crate::errors::{DiscoveryError, Result};
use crate::index::{BindingId, BindingIndex};
use crate::initializer::{initialize, BindingInitializer, RepositoryInitializer};
use crate::repository::ResourceRepository;
use crate::types::BindingType;
use crate::validation::complete_parameters;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;


pub struct InMemoryDiscovery {
    config: DiscoveryConfig,
    repository: Arc<dyn ResourceRepository>,
    initializers: Vec<Arc<dyn BindingInitializer>>,
    types: BTreeMap<Arc<str>, Arc<BindingType>>,
    index: BindingIndex,
}

impl InMemoryDiscovery {
    pub fn new(repository: Arc<dyn ResourceRepository>, config: DiscoveryConfig) -> Self {
        let initializers: Vec<Arc<dyn BindingInitializer>> =
            vec![Arc::new(RepositoryInitializer::new(repository.clone()))];
        InMemoryDiscovery {
            config,
            repository,
            initializers,
            types: BTreeMap::new(),
            index: BindingIndex::new(config.lookup),
        }
    }

    /// Lazy bindings, glob-scan lookups, unknown types are errors
    pub fn editable(repository: Arc<dyn ResourceRepository>) -> Self {
        Self::new(repository, DiscoveryConfig::editable())
    }

    /// Eager bindings, resolved-path index, unknown types yield nothing
    pub fn manageable(repository: Arc<dyn ResourceRepository>) -> Self {
        Self::new(repository, DiscoveryConfig::manageable())
    }

    /// Register an initializer run after the built-in repository initializer
    pub fn with_initializer(mut self, initializer: Arc<dyn BindingInitializer>) -> Self {
        self.initializers.push(initializer);
        self
    }

    pub fn config(&self) -> DiscoveryConfig {
        self.config
    }

    pub fn repository(&self) -> &Arc<dyn ResourceRepository> {
        &self.repository
    }

    pub fn index(&self) -> &BindingIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bindings with their ids, in insertion order
    pub fn bindings_with_ids(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.index.iter()
    }

    fn lookup_type(&self, name: &str) -> Result<&Arc<BindingType>> {
        self.types
            .get(name)
            .ok_or_else(|| DiscoveryError::NoSuchType(name.to_string()))
    }

    fn build_binding(&self, request: &BindRequest) -> Result<Binding> {
        let binding_type = self.lookup_type(&request.type_name)?.clone();
        let parameters = request.parameters.clone();
        match request.kind {
            BindingKind::Class => Binding::class(&request.key, binding_type, parameters),
            BindingKind::Resource => match self.config.resolution {
                Resolution::Eager => Binding::eager(
                    &request.key,
                    binding_type,
                    parameters,
                    &request.language,
                    self.repository.as_ref(),
                ),
                Resolution::Lazy => Binding::lazy(
                    &request.key,
                    binding_type,
                    parameters,
                    &request.language,
                    None,
                ),
            },
        }
    }

    /// `bind`, returning the id of the inserted binding (`None` for duplicates)
    pub fn bind_tracked(&mut self, request: BindRequest) -> Result<Option<BindingId>> {
        crate::binding::check_language(&request.language)?;
        let mut binding = self.build_binding(&request)?;

        if self.index.find_duplicate(&binding).is_some() {
            debug!(key = %binding.key(), type_name = %binding.type_name(), "binding already present");
            return Ok(None);
        }

        if !self.index.has_free_id() {
            return Err(DiscoveryError::Binding(
                "no binding ids left to assign".to_string(),
            ));
        }

        initialize(&self.initializers, &mut binding)?;
        let prepared = self.index.prepare(binding)?;
        let id = self.index.insert(prepared);
        debug!(id, key = %request.key, type_name = %request.type_name, "bound");
        Ok(Some(id))
    }

    /// `unbind`, returning the removed bindings with their ids
    pub fn unbind_tracked(&mut self, request: UnbindRequest) -> Result<Vec<(BindingId, Binding)>> {
        if let Some(language) = &request.language {
            crate::binding::check_language(language)?;
        }

        let Some(candidates) = self.index.ids_for_key(request.kind, &request.key) else {
            return Ok(Vec::new());
        };

        let doomed: Vec<BindingId> = candidates
            .iter()
            .copied()
            .filter(|id| {
                self.index
                    .get(*id)
                    .is_some_and(|binding| unbind_matches(binding, &request))
            })
            .collect();

        let removed = self.index.remove_all(doomed);
        debug!(key = %request.key, removed = removed.len(), "unbound");
        Ok(removed)
    }

    /// `undefine_type`, returning the cascaded bindings with their ids
    pub fn undefine_tracked(&mut self, type_name: &str) -> Vec<(BindingId, Binding)> {
        if self.types.remove(type_name).is_none() {
            return Vec::new();
        }
        let ids: Vec<BindingId> = self
            .index
            .ids_for_type(type_name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let removed = self.index.remove_all(ids);
        debug!(type_name, removed = removed.len(), "undefined binding type");
        removed
    }

    /// `remove_binding`, returning the removed id
    pub fn remove_binding_tracked(&mut self, uuid: &Uuid) -> Result<(BindingId, Binding)> {
        let id = self
            .index
            .id_for_uuid(uuid)
            .ok_or(DiscoveryError::NoSuchBinding(*uuid))?;
        self.index
            .remove(id)
            .map(|binding| (id, binding))
            .ok_or(DiscoveryError::NoSuchBinding(*uuid))
    }

    /// Re-insert a type read from storage
    pub fn restore_type(&mut self, binding_type: BindingType) -> Result<()> {
        self.define_type(binding_type)
            .map_err(|e| DiscoveryError::StorageCorrupt(e.to_string()))
    }

    /// Re-insert a binding read from storage under its persisted id
    ///
    /// The binding must reference a restored type with identical schema.
    /// Initializers run on it exactly once.
    pub fn restore_binding(&mut self, id: BindingId, mut binding: Binding) -> Result<()> {
        if id.checked_add(1).is_none() {
            return Err(DiscoveryError::StorageCorrupt(format!(
                "binding key {} is out of range",
                id
            )));
        }
        let defined = self.types.get(binding.type_name().as_ref()).ok_or_else(|| {
            DiscoveryError::StorageCorrupt(format!(
                "binding {} references undefined type '{}'",
                id,
                binding.type_name()
            ))
        })?;
        if defined.as_ref() != binding.binding_type().as_ref() {
            return Err(DiscoveryError::StorageCorrupt(format!(
                "binding {} was stored with a different schema for type '{}'",
                id,
                binding.type_name()
            )));
        }
        if self.index.get(id).is_some() || self.index.id_for_uuid(&binding.uuid()).is_some() {
            return Err(DiscoveryError::StorageCorrupt(format!(
                "binding {} ({}) is stored twice",
                id,
                binding.uuid()
            )));
        }

        initialize(&self.initializers, &mut binding)?;
        let prepared = self.index.prepare(binding)?;
        self.index.insert_with_id(id, prepared);
        Ok(())
    }

    /// Keep ids counting from at least `next_id` (ids are never reused)
    pub fn reserve_ids(&mut self, next_id: BindingId) {
        self.index.advance_next_id(next_id);
    }

    pub fn next_id(&self) -> BindingId {
        self.index.next_id()
    }
}

fn unbind_matches(binding: &Binding, request: &UnbindRequest) -> bool {
    if let Some(type_name) = &request.type_name {
        if binding.type_name().as_ref() != type_name.as_str() {
            return false;
        }
    }
    if let Some(language) = &request.language {
        if binding.language() != Some(language.as_str()) {
            return false;
        }
    }
    match &request.parameters {
        None => true,
        Some(parameters) => complete_parameters(parameters, binding.binding_type())
            .is_some_and(|completed| &completed == binding.parameters()),
    }
}

impl Discovery for InMemoryDiscovery {
    fn find_by_type(&self, type_name: &str) -> Result<Vec<&Binding>> {
        if self.config.unknown_type == UnknownTypePolicy::Error {
            self.lookup_type(type_name)?;
        }
        Ok(self
            .index
            .ids_for_type(type_name)
            .map(|ids| self.index.materialize(ids))
            .unwrap_or_default())
    }

    fn get_bindings(
        &self,
        resource_path: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<&Binding>> {
        match (resource_path, type_name) {
            (None, None) => Ok(self.index.iter().map(|(_, binding)| binding).collect()),
            (None, Some(type_name)) => self.find_by_type(type_name),
            (Some(path), type_name) => {
                let ids = self.index.ids_for_path(path);
                let type_ids = type_name.map(|name| self.index.ids_for_type(name));
                Ok(match type_ids {
                    None => self.index.materialize(&ids),
                    Some(None) => Vec::new(),
                    Some(Some(type_ids)) => self.index.materialize(ids.intersection(type_ids)),
                })
            }
        }
    }

    fn get_binding(&self, uuid: &Uuid) -> Result<&Binding> {
        self.index
            .id_for_uuid(uuid)
            .and_then(|id| self.index.get(id))
            .ok_or(DiscoveryError::NoSuchBinding(*uuid))
    }

    fn has_binding(&self, uuid: &Uuid) -> Result<bool> {
        Ok(self.index.id_for_uuid(uuid).is_some())
    }

    fn get_binding_type(&self, name: &str) -> Result<&Arc<BindingType>> {
        self.lookup_type(name)
    }

    fn binding_types(&self) -> Result<Vec<&Arc<BindingType>>> {
        Ok(self.types.values().collect())
    }

    fn has_binding_type(&self, name: &str) -> Result<bool> {
        Ok(self.types.contains_key(name))
    }
}

impl EditableDiscovery for InMemoryDiscovery {
    fn define_type(&mut self, binding_type: BindingType) -> Result<()> {
        let name = binding_type.name().clone();
        if self.types.contains_key(&name) {
            return Err(DiscoveryError::DuplicateType(name.to_string()));
        }
        debug!(type_name = %name, "defined binding type");
        self.types.insert(name, Arc::new(binding_type));
        Ok(())
    }

    fn undefine_type(&mut self, type_name: &str) -> Result<()> {
        self.undefine_tracked(type_name);
        Ok(())
    }

    fn remove_binding_types(&mut self) -> Result<()> {
        self.clear()
    }

    fn bind(&mut self, request: BindRequest) -> Result<bool> {
        self.bind_tracked(request).map(|id| id.is_some())
    }

    fn unbind(&mut self, request: UnbindRequest) -> Result<usize> {
        self.unbind_tracked(request).map(|removed| removed.len())
    }

    fn remove_binding(&mut self, uuid: &Uuid) -> Result<()> {
        self.remove_binding_tracked(uuid).map(|_| ())
    }

    fn clear(&mut self) -> Result<()> {
        self.types.clear();
        self.index.clear();
        debug!("cleared discovery");
        Ok(())
    }
}
