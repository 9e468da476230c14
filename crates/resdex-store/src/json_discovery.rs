//! Discovery persisted as one JSON document
//!
//! The document is read on first access and rewritten (atomically) after
//! every mutation that changed something. When a write fails the in-memory
//! state is dropped, so the next access reloads what is actually on disk.

use crate::layout::{self, EngineParts, KeysByTypeName, KeysByUuid};
use crate::store::write_atomic;
use once_cell::sync::OnceCell;
use resdex_core::{
    BindRequest, Binding, BindingId, BindingInitializer, BindingRecord, BindingType, Discovery,
    DiscoveryConfig, DiscoveryError, EditableDiscovery, InMemoryDiscovery, ResourceRepository,
    Result, UnbindRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    keys_by_type_name: KeysByTypeName,
    #[serde(default)]
    keys_by_uuid: KeysByUuid,
    #[serde(default)]
    types_by_key: BTreeMap<String, BindingType>,
    #[serde(default)]
    bindings_by_key: BTreeMap<BindingId, BindingRecord>,
    #[serde(default)]
    next_key: BindingId,
}

impl Document {
    fn from_discovery(discovery: &InMemoryDiscovery) -> Result<Self> {
        let types_by_key = discovery
            .binding_types()?
            .into_iter()
            .map(|ty| (ty.name().to_string(), ty.as_ref().clone()))
            .collect();
        let bindings_by_key = discovery
            .bindings_with_ids()
            .map(|(id, binding)| (id, BindingRecord::from_binding(binding)))
            .collect();
        Ok(Document {
            keys_by_type_name: layout::keys_by_type_name(discovery),
            keys_by_uuid: layout::keys_by_uuid(discovery),
            types_by_key,
            bindings_by_key,
            next_key: discovery.next_id(),
        })
    }

    fn restore(self, parts: &EngineParts) -> Result<InMemoryDiscovery> {
        let mut discovery = parts.build();
        for (key, binding_type) in self.types_by_key {
            if binding_type.name().as_ref() != key {
                return Err(DiscoveryError::StorageCorrupt(format!(
                    "type '{}' is stored under the key '{}'",
                    binding_type.name(),
                    key
                )));
            }
            discovery.restore_type(binding_type)?;
        }
        for (key, record) in self.bindings_by_key {
            layout::restore_record(&mut discovery, key, record)?;
        }
        layout::verify_tables(&discovery, &self.keys_by_type_name, &self.keys_by_uuid)?;
        discovery.reserve_ids(self.next_key);
        Ok(discovery)
    }
}

pub struct JsonFileDiscovery {
    path: PathBuf,
    parts: EngineParts,
    state: OnceCell<InMemoryDiscovery>,
}

impl JsonFileDiscovery {
    pub fn new(
        path: impl Into<PathBuf>,
        repository: Arc<dyn ResourceRepository>,
        config: DiscoveryConfig,
    ) -> Self {
        JsonFileDiscovery {
            path: path.into(),
            parts: EngineParts {
                repository,
                config,
                initializers: Vec::new(),
            },
            state: OnceCell::new(),
        }
    }

    /// Register an initializer applied to every loaded or newly bound binding
    pub fn with_initializer(mut self, initializer: Arc<dyn BindingInitializer>) -> Self {
        self.parts.initializers.push(initializer);
        self.state = OnceCell::new();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document has been read yet
    pub fn is_loaded(&self) -> bool {
        self.state.get().is_some()
    }

    fn load(&self) -> Result<InMemoryDiscovery> {
        if !self.path.exists() {
            debug!("No discovery document at {:?}, starting empty", self.path);
            return Ok(self.parts.build());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| DiscoveryError::Loading(format!("{}: {}", self.path.display(), e)))?;
        let document: Document = if content.trim().is_empty() {
            Document::default()
        } else {
            serde_json::from_str(&content)
                .map_err(|e| DiscoveryError::Loading(format!("{}: {}", self.path.display(), e)))?
        };
        let discovery = document.restore(&self.parts)?;
        debug!(
            "Loaded discovery from {:?} ({} bindings)",
            self.path,
            discovery.len()
        );
        Ok(discovery)
    }

    fn loaded(&self) -> Result<&InMemoryDiscovery> {
        self.state.get_or_try_init(|| self.load())
    }

    fn loaded_mut(&mut self) -> Result<&mut InMemoryDiscovery> {
        self.loaded()?;
        self.state
            .get_mut()
            .ok_or_else(|| DiscoveryError::Loading(self.path.display().to_string()))
    }

    fn flush(&mut self) -> Result<()> {
        let result = self.write_document();
        if result.is_err() {
            self.state = OnceCell::new();
        }
        result
    }

    fn write_document(&self) -> Result<()> {
        let discovery = self.loaded()?;
        let document = Document::from_discovery(discovery)?;
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| DiscoveryError::Storage(e.to_string()))?;
        write_atomic(&self.path, &content)?;
        info!("Discovery written to {:?}", self.path);
        Ok(())
    }

    /// Apply `edit` to the loaded engine and persist when `changed` says so
    fn edit<T>(
        &mut self,
        edit: impl FnOnce(&mut InMemoryDiscovery) -> Result<T>,
        changed: impl FnOnce(&T) -> bool,
    ) -> Result<T> {
        let outcome = edit(self.loaded_mut()?)?;
        if changed(&outcome) {
            self.flush()?;
        }
        Ok(outcome)
    }
}

impl Discovery for JsonFileDiscovery {
    fn find_by_type(&self, type_name: &str) -> Result<Vec<&Binding>> {
        self.loaded()?.find_by_type(type_name)
    }

    fn get_bindings(
        &self,
        resource_path: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<&Binding>> {
        self.loaded()?.get_bindings(resource_path, type_name)
    }

    fn get_binding(&self, uuid: &Uuid) -> Result<&Binding> {
        self.loaded()?.get_binding(uuid)
    }

    fn has_binding(&self, uuid: &Uuid) -> Result<bool> {
        self.loaded()?.has_binding(uuid)
    }

    fn get_binding_type(&self, name: &str) -> Result<&Arc<BindingType>> {
        self.loaded()?.get_binding_type(name)
    }

    fn binding_types(&self) -> Result<Vec<&Arc<BindingType>>> {
        self.loaded()?.binding_types()
    }

    fn has_binding_type(&self, name: &str) -> Result<bool> {
        self.loaded()?.has_binding_type(name)
    }
}

impl EditableDiscovery for JsonFileDiscovery {
    fn define_type(&mut self, binding_type: BindingType) -> Result<()> {
        self.edit(|d| d.define_type(binding_type), |()| true)
    }

    fn undefine_type(&mut self, type_name: &str) -> Result<()> {
        let existed = self.loaded()?.has_binding_type(type_name)?;
        self.edit(|d| d.undefine_type(type_name), |()| existed)
    }

    fn remove_binding_types(&mut self) -> Result<()> {
        self.clear()
    }

    fn bind(&mut self, request: BindRequest) -> Result<bool> {
        self.edit(|d| d.bind(request), |added| *added)
    }

    fn unbind(&mut self, request: UnbindRequest) -> Result<usize> {
        self.edit(|d| d.unbind(request), |removed| *removed > 0)
    }

    fn remove_binding(&mut self, uuid: &Uuid) -> Result<()> {
        self.edit(|d| d.remove_binding(uuid), |()| true)
    }

    fn clear(&mut self) -> Result<()> {
        self.edit(|d| d.clear(), |()| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resdex_core::{BindingParameter, InMemoryRepository, ParamValue};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn repo() -> Arc<InMemoryRepository> {
        match InMemoryRepository::with_paths(["/app/errors.fr.xlf", "/app/messages.fr.xlf"]) {
            Ok(repo) => Arc::new(repo),
            Err(e) => panic!("repository should build: {e}"),
        }
    }

    fn catalog() -> BindingType {
        let ty = BindingParameter::required("domain").and_then(|domain| {
            BindingParameter::optional_with_default("locale", "en")
                .and_then(|locale| BindingType::new("catalog", [domain, locale]))
        });
        match ty {
            Ok(ty) => ty,
            Err(e) => panic!("type should build: {e}"),
        }
    }

    fn populate(discovery: &mut JsonFileDiscovery) {
        assert!(discovery.define_type(catalog()).is_ok());
        assert!(BindingType::named("listener").is_ok_and(|ty| discovery.define_type(ty).is_ok()));
        let request = BindRequest::resource("/app/*", "catalog").param("domain", "errors");
        assert_eq!(discovery.bind(request), Ok(true));
        let request = BindRequest::resource("/app/messages.fr.xlf", "catalog")
            .param("domain", "messages")
            .param("locale", "fr");
        assert_eq!(discovery.bind(request), Ok(true));
        assert_eq!(discovery.bind(BindRequest::class("App\\Listener", "listener")), Ok(true));
    }

    fn read_json(path: &Path) -> Value {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    #[test]
    fn test_round_trip() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("discovery.json");

        let mut discovery = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        populate(&mut discovery);
        let before: Vec<Binding> = discovery
            .get_bindings(None, None)
            .unwrap_or_default()
            .into_iter()
            .cloned()
            .collect();

        let reloaded = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        assert!(!reloaded.is_loaded());
        let after = reloaded.get_bindings(None, None);
        assert!(reloaded.is_loaded());
        let Ok(after) = after else {
            panic!("document should load");
        };
        assert_eq!(after.len(), before.len());
        for (restored, original) in after.iter().zip(&before) {
            assert_eq!(*restored, original);
            assert_eq!(restored.uuid(), original.uuid());
        }

        // Restored lazy bindings are attached to the repository
        let found = reloaded.find_by_path("/app/errors.fr.xlf", Some("catalog"));
        let Ok(found) = found else {
            panic!("lookup should succeed");
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resources().map(|r| r.len()), Ok(2));
        assert_eq!(found[0].parameter("locale"), Ok(&ParamValue::from("en")));
    }

    #[test]
    fn test_document_layout() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("discovery.json");
        let mut discovery = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        populate(&mut discovery);
        assert_eq!(discovery.unbind(UnbindRequest::resource("/app/*")), Ok(1));

        let document = read_json(&path);
        assert_eq!(document["nextKey"], json!(3));
        assert_eq!(document["keysByTypeName"]["catalog"], json!([1]));
        assert_eq!(document["keysByTypeName"]["listener"], json!([2]));
        assert_eq!(document["typesByKey"]["catalog"]["name"], json!("catalog"));
        assert_eq!(document["bindingsByKey"]["1"]["key"], json!("/app/messages.fr.xlf"));
        assert!(document["bindingsByKey"]["0"].is_null());
        assert_eq!(document["keysByUuid"].as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_ids_keep_counting_after_reload() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("discovery.json");
        let mut discovery = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        populate(&mut discovery);
        assert!(discovery.clear().is_ok());

        let mut reloaded = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        assert!(BindingType::named("t").is_ok_and(|ty| reloaded.define_type(ty).is_ok()));
        assert_eq!(reloaded.bind(BindRequest::resource("/app", "t")), Ok(true));
        assert_eq!(read_json(&path)["keysByTypeName"]["t"], json!([3]));
    }

    #[test]
    fn test_missing_file_is_empty_and_not_created_by_reads() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("missing.json");
        let discovery = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::manageable());
        assert_eq!(discovery.has_binding_types(), Ok(false));
        assert_eq!(discovery.find_by_type("anything").map(|b| b.len()), Ok(0));
        assert!(!path.exists());
    }

    #[test]
    fn test_undecodable_document_fails_loading() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("discovery.json");
        assert!(std::fs::write(&path, "{ not json").is_ok());
        let discovery = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        assert!(matches!(
            discovery.binding_types(),
            Err(DiscoveryError::Loading(_))
        ));
    }

    fn corrupt(edit: impl FnOnce(&mut Value)) -> Result<usize> {
        let Ok(temp_dir) = TempDir::new() else {
            return Ok(0);
        };
        let path = temp_dir.path().join("discovery.json");
        let mut discovery = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        populate(&mut discovery);

        let mut document = read_json(&path);
        edit(&mut document);
        assert!(std::fs::write(&path, document.to_string()).is_ok());

        let reloaded = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::editable());
        reloaded.get_bindings(None, None).map(|b| b.len())
    }

    #[test]
    fn test_corrupt_documents_are_detected() {
        // Key listed without a record
        let result = corrupt(|doc| {
            if let Some(bindings) = doc["bindingsByKey"].as_object_mut() {
                bindings.remove("0");
            }
        });
        assert!(matches!(result, Err(DiscoveryError::StorageCorrupt(_))));

        // Record whose type is not defined
        let result = corrupt(|doc| {
            if let Some(types) = doc["typesByKey"].as_object_mut() {
                types.remove("listener");
            }
        });
        assert!(matches!(result, Err(DiscoveryError::StorageCorrupt(_))));

        // Uuid index pointing at the wrong key
        let result = corrupt(|doc| {
            if let Some(uuids) = doc["keysByUuid"].as_object_mut() {
                for key in uuids.values_mut() {
                    *key = json!(99);
                }
            }
        });
        assert!(matches!(result, Err(DiscoveryError::StorageCorrupt(_))));
    }

    #[test]
    fn test_out_of_range_binding_key_is_corrupt() {
        let last = u64::MAX.to_string();
        let result = corrupt(|doc| {
            if let Some(bindings) = doc["bindingsByKey"].as_object_mut() {
                if let Some(record) = bindings.remove("0") {
                    bindings.insert(last.clone(), record);
                }
            }
            if let Some(keys) = doc["keysByTypeName"]["catalog"].as_array_mut() {
                for key in keys.iter_mut().filter(|key| **key == json!(0)) {
                    *key = json!(u64::MAX);
                }
            }
            if let Some(uuids) = doc["keysByUuid"].as_object_mut() {
                for key in uuids.values_mut().filter(|key| **key == json!(0)) {
                    *key = json!(u64::MAX);
                }
            }
            doc["nextKey"] = json!(u64::MAX);
        });
        assert!(matches!(result, Err(DiscoveryError::StorageCorrupt(_))));
    }

    #[test]
    fn test_manageable_reload_rebuilds_resolved_index() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("discovery.json");
        let mut discovery = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::manageable());
        populate(&mut discovery);

        let reloaded = JsonFileDiscovery::new(&path, repo(), DiscoveryConfig::manageable());
        assert_eq!(
            reloaded
                .find_by_path("/app/messages.fr.xlf", None)
                .map(|b| b.len()),
            Ok(2)
        );
    }
}
