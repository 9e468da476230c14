//! Resdex core
//!
//! Resource discovery index: binding types with parameter schemas, bindings
//! of resource queries or class names to those types, and the synchronized
//! indices that answer lookups by type and by resource path.
//!
//! `InMemoryDiscovery` is the engine every other discovery builds on; the
//! persistence adapters in `resdex-store` hydrate one from storage and write
//! their changes through.

pub mod binding;
pub mod discovery;
pub mod errors;
pub mod filesystem;
pub mod glob;
pub mod in_memory;
pub mod index;
pub mod initializer;
pub mod record;
pub mod repository;
pub mod shared;
pub mod types;
pub mod validation;

pub use binding::{Binding, BindingKind, BindingTarget, ResourceSource, GLOB_LANGUAGE};
pub use discovery::{
    BindRequest, Discovery, DiscoveryConfig, EditableDiscovery, Resolution, UnbindRequest,
    UnknownTypePolicy,
};
pub use errors::{DiscoveryError, Result};
pub use filesystem::FilesystemRepository;
pub use in_memory::InMemoryDiscovery;
pub use index::{BindingId, BindingIndex, PathLookup};
pub use initializer::{BindingInitializer, RepositoryInitializer};
pub use record::BindingRecord;
pub use repository::{InMemoryRepository, Resource, ResourceCollection, ResourceRepository};
pub use shared::SharedDiscovery;
pub use types::{BindingParameter, BindingType, ParamValue, Parameters};
pub use validation::{validate_parameters, ParameterViolation};
