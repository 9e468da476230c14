//! Hooks run on bindings right after they are built or deserialized

use crate::binding::{Binding, BindingKind};
use crate::errors::Result;
use crate::repository::ResourceRepository;
use std::sync::Arc;

/// Prepares freshly constructed or restored bindings
///
/// Called exactly once per binding instance. Bindings that are only read to be
/// filtered or removed are never passed through initializers.
pub trait BindingInitializer: Send + Sync {
    fn accepts_binding(&self, kind: BindingKind) -> bool;

    fn initialize_binding(&self, binding: &mut Binding) -> Result<()>;
}

/// Attaches a repository to lazy resource bindings
pub struct RepositoryInitializer {
    repository: Arc<dyn ResourceRepository>,
}

impl RepositoryInitializer {
    pub fn new(repository: Arc<dyn ResourceRepository>) -> Self {
        RepositoryInitializer { repository }
    }
}

impl BindingInitializer for RepositoryInitializer {
    fn accepts_binding(&self, kind: BindingKind) -> bool {
        kind == BindingKind::Resource
    }

    fn initialize_binding(&self, binding: &mut Binding) -> Result<()> {
        if !binding.is_initialized() {
            binding.attach_repository(self.repository.clone());
        }
        Ok(())
    }
}

/// Run every accepting initializer over `binding`
pub fn initialize(initializers: &[Arc<dyn BindingInitializer>], binding: &mut Binding) -> Result<()> {
    let kind = binding.kind();
    for initializer in initializers {
        if initializer.accepts_binding(kind) {
            initializer.initialize_binding(binding)?;
        }
    }
    Ok(())
}
