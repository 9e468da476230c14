//! Discovery traits, request builders and variant configuration
//!
//! `Discovery` is the read side shared by every implementation (in-memory and
//! persistent). `EditableDiscovery` adds type definition and binding edits.
//! Reads return `Result` because persistent discoveries hydrate from storage
//! on first access.

use crate::binding::{Binding, BindingKind, GLOB_LANGUAGE};
use crate::errors::Result;
use crate::index::PathLookup;
use crate::types::{BindingType, ParamValue, Parameters};
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// When resource bindings resolve their query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolution {
    /// Resolve at bind time; zero matches is an error
    Eager,
    /// Resolve on first access
    #[default]
    Lazy,
}

/// Result of `find_by_type` for a type that was never defined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownTypePolicy {
    #[default]
    Error,
    Empty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub resolution: Resolution,
    pub lookup: PathLookup,
    pub unknown_type: UnknownTypePolicy,
}

impl DiscoveryConfig {
    /// Lazy bindings, glob-scan path lookups, unknown types are errors
    pub fn editable() -> Self {
        DiscoveryConfig {
            resolution: Resolution::Lazy,
            lookup: PathLookup::GlobScan,
            unknown_type: UnknownTypePolicy::Error,
        }
    }

    /// Eager bindings, resolved-path index, unknown types yield nothing
    pub fn manageable() -> Self {
        DiscoveryConfig {
            resolution: Resolution::Eager,
            lookup: PathLookup::ResolvedIndex,
            unknown_type: UnknownTypePolicy::Empty,
        }
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Arguments of a `bind` call
#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub kind: BindingKind,
    pub key: String,
    pub type_name: String,
    pub parameters: Parameters,
    pub language: String,
}

impl BindRequest {
    pub fn resource(query: impl Into<String>, type_name: impl Into<String>) -> Self {
        BindRequest {
            kind: BindingKind::Resource,
            key: query.into(),
            type_name: type_name.into(),
            parameters: Parameters::new(),
            language: GLOB_LANGUAGE.to_string(),
        }
    }

    pub fn class(class_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        BindRequest {
            kind: BindingKind::Class,
            ..Self::resource(class_name, type_name)
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(Arc::from(name), value.into());
        self
    }

    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Arguments of an `unbind` call; every filter is optional
#[derive(Debug, Clone, PartialEq)]
pub struct UnbindRequest {
    pub kind: BindingKind,
    pub key: String,
    pub type_name: Option<String>,
    pub parameters: Option<Parameters>,
    pub language: Option<String>,
}

impl UnbindRequest {
    pub fn resource(query: impl Into<String>) -> Self {
        UnbindRequest {
            kind: BindingKind::Resource,
            key: query.into(),
            type_name: None,
            parameters: None,
            language: None,
        }
    }

    pub fn class(class_name: impl Into<String>) -> Self {
        UnbindRequest {
            kind: BindingKind::Class,
            ..Self::resource(class_name)
        }
    }

    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters
            .get_or_insert_with(Parameters::new)
            .insert(Arc::from(name), value.into());
        self
    }

    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// Read access to bindings and binding types
pub trait Discovery {
    /// Bindings of one type in insertion order
    fn find_by_type(&self, type_name: &str) -> Result<Vec<&Binding>>;

    /// Bindings filtered by resource path and/or type name; all bindings when both are `None`
    fn get_bindings(
        &self,
        resource_path: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<&Binding>>;

    fn find_by_path(&self, resource_path: &str, type_name: Option<&str>) -> Result<Vec<&Binding>> {
        self.get_bindings(Some(resource_path), type_name)
    }

    fn has_bindings(&self, resource_path: Option<&str>, type_name: Option<&str>) -> Result<bool> {
        Ok(!self.get_bindings(resource_path, type_name)?.is_empty())
    }

    fn get_binding(&self, uuid: &Uuid) -> Result<&Binding>;

    fn has_binding(&self, uuid: &Uuid) -> Result<bool>;

    fn get_binding_type(&self, name: &str) -> Result<&Arc<BindingType>>;

    /// Defined types sorted by name
    fn binding_types(&self) -> Result<Vec<&Arc<BindingType>>>;

    fn has_binding_type(&self, name: &str) -> Result<bool>;

    fn has_binding_types(&self) -> Result<bool> {
        Ok(!self.binding_types()?.is_empty())
    }
}

/// Discovery whose types and bindings can be edited
pub trait EditableDiscovery: Discovery {
    fn define_type(&mut self, binding_type: BindingType) -> Result<()>;

    /// Remove a type and all of its bindings; unknown types are ignored
    fn undefine_type(&mut self, type_name: &str) -> Result<()>;

    /// Remove every type and binding
    fn remove_binding_types(&mut self) -> Result<()>;

    /// Add a binding; returns `false` when an equal binding already exists
    fn bind(&mut self, request: BindRequest) -> Result<bool>;

    /// Remove bindings stored under the exact query or class name; returns the count
    fn unbind(&mut self, request: UnbindRequest) -> Result<usize>;

    fn remove_binding(&mut self, uuid: &Uuid) -> Result<()>;

    fn clear(&mut self) -> Result<()>;
}
