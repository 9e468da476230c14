//! Serialized form of bindings
//!
//! Records carry what is needed to rebuild a binding (target, type name,
//! resolved parameters, uuid) but never resources. Restored resource bindings
//! come back lazy and uninitialized; the discovery's initializers attach the
//! repository.

use crate::binding::{Binding, BindingKind};
use crate::errors::{DiscoveryError, Result};
use crate::types::{BindingType, Parameters};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingRecord {
    pub uuid: Uuid,
    pub kind: BindingKind,
    /// Query for resource bindings, class name for class bindings
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub type_name: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl BindingRecord {
    pub fn from_binding(binding: &Binding) -> Self {
        BindingRecord {
            uuid: binding.uuid(),
            kind: binding.kind(),
            key: binding.key().to_string(),
            language: binding.language().map(str::to_string),
            type_name: binding.type_name().to_string(),
            parameters: binding.parameters().clone(),
        }
    }

    /// Rebuild the binding against its (already restored) type
    pub fn into_binding(self, binding_type: Arc<BindingType>) -> Result<Binding> {
        if binding_type.name().as_ref() != self.type_name {
            return Err(DiscoveryError::StorageCorrupt(format!(
                "binding {} is of type '{}', not '{}'",
                self.uuid,
                self.type_name,
                binding_type.name()
            )));
        }
        let binding = match self.kind {
            BindingKind::Resource => {
                let language = self.language.as_deref().unwrap_or(crate::binding::GLOB_LANGUAGE);
                Binding::lazy(&self.key, binding_type, self.parameters, language, None)
            }
            BindingKind::Class => Binding::class(&self.key, binding_type, self.parameters),
        };
        binding
            .map(|binding| binding.with_uuid(self.uuid))
            .map_err(|e| DiscoveryError::Loading(format!("binding {}: {}", self.uuid, e)))
    }
}
