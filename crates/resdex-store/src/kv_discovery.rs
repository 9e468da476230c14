//! Discovery persisted in a key-value store
//!
//! Layout:
//! - `nextKey`: next binding key
//! - `keysByTypeName`: type name to ordered binding keys
//! - `keysByUuid`: binding uuid to binding key
//! - `t:<type name>`: serialized binding type
//! - `b:<key>`: serialized binding record
//!
//! The store is read on first access. Each mutation writes only the keys it
//! touched: the records it added or removed plus the two lookup tables.

use crate::layout::{
    self, EngineParts, KeysByTypeName, KeysByUuid, BINDING_PREFIX, KEYS_BY_TYPE_NAME,
    KEYS_BY_UUID, NEXT_KEY, TYPE_PREFIX,
};
use crate::store::KeyValueStore;
use once_cell::sync::OnceCell;
use resdex_core::{
    BindRequest, Binding, BindingId, BindingInitializer, BindingRecord, BindingType, Discovery,
    DiscoveryConfig, DiscoveryError, EditableDiscovery, InMemoryDiscovery, ResourceRepository,
    Result, UnbindRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct KeyValueStoreDiscovery<S> {
    store: S,
    parts: EngineParts,
    state: OnceCell<InMemoryDiscovery>,
}

impl<S: KeyValueStore> KeyValueStoreDiscovery<S> {
    pub fn new(store: S, repository: Arc<dyn ResourceRepository>, config: DiscoveryConfig) -> Self {
        KeyValueStoreDiscovery {
            store,
            parts: EngineParts {
                repository,
                config,
                initializers: Vec::new(),
            },
            state: OnceCell::new(),
        }
    }

    pub fn with_initializer(mut self, initializer: Arc<dyn BindingInitializer>) -> Self {
        self.parts.initializers.push(initializer);
        self.state = OnceCell::new();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn is_loaded(&self) -> bool {
        self.state.get().is_some()
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.store.get(key)? {
            None => Ok(T::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| DiscoveryError::Loading(format!("key '{}': {}", key, e))),
        }
    }

    fn load(&self) -> Result<InMemoryDiscovery> {
        let mut discovery = self.parts.build();

        for key in self.store.keys()? {
            let Some(name) = key.strip_prefix(TYPE_PREFIX) else {
                continue;
            };
            let binding_type: Option<BindingType> = self.read(&key)?;
            let Some(binding_type) = binding_type else {
                continue;
            };
            if binding_type.name().as_ref() != name {
                return Err(DiscoveryError::StorageCorrupt(format!(
                    "type '{}' is stored under the key '{}'",
                    binding_type.name(),
                    key
                )));
            }
            discovery.restore_type(binding_type)?;
        }

        let keys_by_type_name: KeysByTypeName = self.read(KEYS_BY_TYPE_NAME)?;
        let keys_by_uuid: KeysByUuid = self.read(KEYS_BY_UUID)?;
        let mut keys: Vec<BindingId> = keys_by_type_name.values().flatten().copied().collect();
        keys.sort_unstable();
        for id in keys {
            let record: Option<BindingRecord> = self.read(&layout::binding_key(id))?;
            let record = record.ok_or_else(|| {
                DiscoveryError::StorageCorrupt(format!(
                    "binding key {} is indexed but has no record",
                    id
                ))
            })?;
            layout::restore_record(&mut discovery, id, record)?;
        }
        layout::verify_tables(&discovery, &keys_by_type_name, &keys_by_uuid)?;

        let next_key: BindingId = self.read(NEXT_KEY)?;
        discovery.reserve_ids(next_key);
        debug!("Loaded discovery from key-value store ({} bindings)", discovery.len());
        Ok(discovery)
    }

    fn loaded(&self) -> Result<&InMemoryDiscovery> {
        self.state.get_or_try_init(|| self.load())
    }

    fn loaded_mut(&mut self) -> Result<&mut InMemoryDiscovery> {
        self.loaded()?;
        self.state
            .get_mut()
            .ok_or_else(|| DiscoveryError::Loading("key-value store".to_string()))
    }

    /// Write `set` and `removed` keys plus the lookup tables in one store change
    ///
    /// On failure the store keeps its previous contents and the cached engine
    /// is dropped, so the next access reloads that last good state.
    fn write_through(&mut self, mut set: BTreeMap<String, Value>, removed: Vec<String>) -> Result<()> {
        let result = self.loaded().and_then(|discovery| {
            set.insert(
                KEYS_BY_TYPE_NAME.to_string(),
                to_value(&layout::keys_by_type_name(discovery))?,
            );
            set.insert(KEYS_BY_UUID.to_string(), to_value(&layout::keys_by_uuid(discovery))?);
            set.insert(NEXT_KEY.to_string(), Value::from(discovery.next_id()));
            Ok(())
        });
        let result = result.and_then(|()| {
            let written = set.len() + removed.len();
            self.store.apply(set, &removed)?;
            info!("Wrote {} keys to the key-value store", written);
            Ok(())
        });
        if result.is_err() {
            self.state = OnceCell::new();
        }
        result
    }

    fn removed_keys(removed: &[(BindingId, Binding)]) -> Vec<String> {
        removed.iter().map(|(id, _)| layout::binding_key(*id)).collect()
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| DiscoveryError::Storage(e.to_string()))
}

impl<S: KeyValueStore> Discovery for KeyValueStoreDiscovery<S> {
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

impl<S: KeyValueStore> EditableDiscovery for KeyValueStoreDiscovery<S> {
    fn define_type(&mut self, binding_type: BindingType) -> Result<()> {
        let key = layout::type_key(binding_type.name());
        let value = to_value(&binding_type)?;
        self.loaded_mut()?.define_type(binding_type)?;
        self.write_through(BTreeMap::from([(key, value)]), Vec::new())
    }

    fn undefine_type(&mut self, type_name: &str) -> Result<()> {
        let discovery = self.loaded_mut()?;
        if !discovery.has_binding_type(type_name)? {
            return Ok(());
        }
        let removed = discovery.undefine_tracked(type_name);
        let mut keys = Self::removed_keys(&removed);
        keys.push(layout::type_key(type_name));
        self.write_through(BTreeMap::new(), keys)
    }

    fn remove_binding_types(&mut self) -> Result<()> {
        self.clear()
    }

    fn bind(&mut self, request: BindRequest) -> Result<bool> {
        let discovery = self.loaded_mut()?;
        let Some(id) = discovery.bind_tracked(request)? else {
            return Ok(false);
        };
        let record = discovery
            .index()
            .get(id)
            .map(BindingRecord::from_binding)
            .ok_or_else(|| DiscoveryError::StorageCorrupt(format!("binding {} vanished", id)))?;
        let value = to_value(&record)?;
        self.write_through(BTreeMap::from([(layout::binding_key(id), value)]), Vec::new())?;
        Ok(true)
    }

    fn unbind(&mut self, request: UnbindRequest) -> Result<usize> {
        let removed = self.loaded_mut()?.unbind_tracked(request)?;
        if removed.is_empty() {
            return Ok(0);
        }
        self.write_through(BTreeMap::new(), Self::removed_keys(&removed))?;
        Ok(removed.len())
    }

    fn remove_binding(&mut self, uuid: &Uuid) -> Result<()> {
        let (id, _) = self.loaded_mut()?.remove_binding_tracked(uuid)?;
        self.write_through(BTreeMap::new(), vec![layout::binding_key(id)])
    }

    /// Remove every type and binding; `nextKey` keeps counting
    fn clear(&mut self) -> Result<()> {
        self.loaded_mut()?.clear()?;
        let stale: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(TYPE_PREFIX) || key.starts_with(BINDING_PREFIX))
            .collect();
        self.write_through(BTreeMap::new(), stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};
    use resdex_core::{BindingParameter, InMemoryRepository};
    use serde_json::json;
    use tempfile::TempDir;

    fn repo() -> Arc<InMemoryRepository> {
        match InMemoryRepository::with_paths(["/file1", "/file2"]) {
            Ok(repo) => Arc::new(repo),
            Err(e) => panic!("repository should build: {e}"),
        }
    }

    fn named(name: &str) -> BindingType {
        match BindingType::named(name) {
            Ok(ty) => ty,
            Err(e) => panic!("type should build: {e}"),
        }
    }

    fn editable(store: MemoryStore) -> KeyValueStoreDiscovery<MemoryStore> {
        KeyValueStoreDiscovery::new(store, repo(), DiscoveryConfig::editable())
    }

    fn populated() -> KeyValueStoreDiscovery<MemoryStore> {
        let mut discovery = editable(MemoryStore::new());
        assert!(discovery.define_type(named("type1")).is_ok());
        assert!(discovery.define_type(named("type2")).is_ok());
        for (query, ty) in [("/file1", "type1"), ("/file2", "type1"), ("/file2", "type2")] {
            assert_eq!(discovery.bind(BindRequest::resource(query, ty)), Ok(true));
        }
        discovery
    }

    #[test]
    fn test_layout_written_through() {
        let discovery = populated();
        let store = discovery.store();
        assert_eq!(
            store.keys().unwrap_or_default(),
            vec![
                "b:0", "b:1", "b:2", "keysByTypeName", "keysByUuid", "nextKey", "t:type1",
                "t:type2"
            ]
        );
        assert!(store
            .get(KEYS_BY_TYPE_NAME)
            .is_ok_and(|v| v == Some(json!({"type1": [0, 1], "type2": [2]}))));
        assert!(store.get(NEXT_KEY).is_ok_and(|v| v == Some(json!(3))));
        assert!(store
            .get("b:2")
            .is_ok_and(|v| v.is_some_and(|record| record["key"] == json!("/file2"))));
    }

    #[test]
    fn test_round_trip() {
        let original = populated();
        let before: Vec<Binding> = original
            .get_bindings(None, None)
            .unwrap_or_default()
            .into_iter()
            .cloned()
            .collect();

        let reloaded = editable(original.into_store());
        let after = reloaded.get_bindings(None, None).unwrap_or_default();
        assert_eq!(after.len(), 3);
        for (restored, original) in after.iter().zip(&before) {
            assert_eq!(*restored, original);
            assert_eq!(restored.uuid(), original.uuid());
        }
        assert_eq!(reloaded.find_by_type("type1").map(|b| b.len()), Ok(2));
        assert_eq!(reloaded.get_bindings(Some("/file2"), None).map(|b| b.len()), Ok(2));
    }

    #[test]
    fn test_mutations_touch_only_their_keys() {
        let mut discovery = populated();
        assert_eq!(discovery.unbind(UnbindRequest::resource("/file2").of_type("type1")), Ok(1));
        assert!(discovery.store().exists("b:1").is_ok_and(|e| !e));
        assert!(discovery.store().exists("b:2").is_ok_and(|e| e));

        assert!(discovery.undefine_type("type2").is_ok());
        assert!(discovery.store().exists("t:type2").is_ok_and(|e| !e));
        assert!(discovery.store().exists("b:2").is_ok_and(|e| !e));
        assert!(discovery
            .store()
            .get(KEYS_BY_TYPE_NAME)
            .is_ok_and(|v| v == Some(json!({"type1": [0]}))));

        let Some(uuid) = discovery
            .find_by_type("type1")
            .ok()
            .and_then(|b| b.first().map(|b| b.uuid()))
        else {
            panic!("binding should remain");
        };
        assert!(discovery.remove_binding(&uuid).is_ok());
        assert!(discovery.store().exists("b:0").is_ok_and(|e| !e));
        assert!(discovery
            .store()
            .get(KEYS_BY_UUID)
            .is_ok_and(|v| v == Some(json!({}))));
    }

    #[test]
    fn test_clear_keeps_next_key_and_foreign_keys() {
        let mut store = MemoryStore::new();
        assert!(store.set("unrelated", json!(true)).is_ok());
        let mut discovery = editable(store);
        assert!(discovery.define_type(named("t")).is_ok());
        assert_eq!(discovery.bind(BindRequest::resource("/file1", "t")), Ok(true));
        assert!(discovery.clear().is_ok());

        let store = discovery.into_store();
        assert!(store.exists("unrelated").is_ok_and(|e| e));
        assert!(store.exists("t:t").is_ok_and(|e| !e));
        assert!(store.get(NEXT_KEY).is_ok_and(|v| v == Some(json!(1))));
    }

    #[test]
    fn test_indexed_key_without_record_is_corrupt() {
        let mut store = populated().into_store();
        assert!(store.remove("b:1").is_ok());
        let reloaded = editable(store);
        assert!(matches!(
            reloaded.get_bindings(None, None),
            Err(DiscoveryError::StorageCorrupt(_))
        ));
    }

    #[test]
    fn test_out_of_range_binding_key_is_corrupt() {
        let mut store = populated().into_store();
        let Ok(Some(record)) = store.get("b:0") else {
            panic!("binding record should be stored");
        };
        let Ok(Some(mut uuids)) = store.get(KEYS_BY_UUID) else {
            panic!("uuid table should be stored");
        };
        if let Some(uuids) = uuids.as_object_mut() {
            for key in uuids.values_mut() {
                if *key == json!(0) {
                    *key = json!(u64::MAX);
                }
            }
        }
        let moved = BTreeMap::from([
            (format!("b:{}", u64::MAX), record),
            (
                KEYS_BY_TYPE_NAME.to_string(),
                json!({"type1": [u64::MAX, 1], "type2": [2]}),
            ),
            (KEYS_BY_UUID.to_string(), uuids),
        ]);
        assert!(store.apply(moved, &["b:0".to_string()]).is_ok());

        let reloaded = editable(store);
        assert!(matches!(
            reloaded.get_bindings(None, None),
            Err(DiscoveryError::StorageCorrupt(_))
        ));
    }

    #[test]
    fn test_undecodable_value_fails_loading() {
        let mut store = MemoryStore::new();
        assert!(store.set("t:broken", json!({"name": 42})).is_ok());
        let reloaded = editable(store);
        assert!(matches!(
            reloaded.binding_types(),
            Err(DiscoveryError::Loading(_))
        ));
    }

    #[test]
    fn test_failed_write_leaves_last_good_state() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("kv.json");
        let Ok(store) = JsonFileStore::open(&path) else {
            panic!("store should open");
        };
        let mut discovery = KeyValueStoreDiscovery::new(store, repo(), DiscoveryConfig::editable());
        assert!(discovery.define_type(named("type1")).is_ok());
        assert_eq!(discovery.bind(BindRequest::resource("/file1", "type1")), Ok(true));
        assert_eq!(discovery.bind(BindRequest::resource("/file2", "type1")), Ok(true));

        let blocker = path.with_file_name("kv.json.tmp");
        assert!(std::fs::create_dir(&blocker).is_ok());
        assert!(matches!(
            discovery.unbind(UnbindRequest::resource("/file1")),
            Err(DiscoveryError::Storage(_))
        ));
        // The failed unbind is not visible; the instance reloads the stored state
        assert_eq!(discovery.get_bindings(None, None).map(|b| b.len()), Ok(2));

        assert!(std::fs::remove_dir(&blocker).is_ok());
        assert_eq!(discovery.unbind(UnbindRequest::resource("/file1")), Ok(1));
        assert_eq!(discovery.get_bindings(None, None).map(|b| b.len()), Ok(1));

        let Ok(store) = JsonFileStore::open(&path) else {
            panic!("store should reopen");
        };
        let reloaded = KeyValueStoreDiscovery::new(store, repo(), DiscoveryConfig::editable());
        assert_eq!(reloaded.find_by_path("/file2", None).map(|b| b.len()), Ok(1));
        assert_eq!(reloaded.find_by_path("/file1", None).map(|b| b.len()), Ok(0));
    }

    #[test]
    fn test_over_json_file_store() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("kv.json");
        let Ok(store) = JsonFileStore::open(&path) else {
            panic!("store should open");
        };
        let mut discovery = KeyValueStoreDiscovery::new(store, repo(), DiscoveryConfig::manageable());
        let ty = BindingParameter::optional_with_default("weight", 1_i64)
            .and_then(|weight| BindingType::new("weighted", [weight]));
        assert!(ty.is_ok_and(|ty| discovery.define_type(ty).is_ok()));
        let request = BindRequest::resource("/file*", "weighted").param("weight", 5_i64);
        assert_eq!(discovery.bind(request), Ok(true));
        drop(discovery);

        let Ok(store) = JsonFileStore::open(&path) else {
            panic!("store should reopen");
        };
        let reloaded = KeyValueStoreDiscovery::new(store, repo(), DiscoveryConfig::manageable());
        let found = reloaded.find_by_path("/file2", Some("weighted"));
        let Ok(found) = found else {
            panic!("lookup should succeed");
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].parameter("weight").map(ToString::to_string), Ok("5".to_string()));
    }
}
