//! Index snapshots shared by the persistent discoveries
//!
//! Both storage formats persist the same two lookup tables next to the type
//! and binding records: binding keys per type name and the key of every uuid.
//! After restoring records, the tables read from storage must agree with the
//! ones rebuilt from the restored index.

use resdex_core::{
    BindingId, BindingInitializer, BindingRecord, BindingType, Discovery, DiscoveryConfig,
    DiscoveryError, InMemoryDiscovery, ResourceRepository, Result,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub(crate) const NEXT_KEY: &str = "nextKey";
pub(crate) const KEYS_BY_TYPE_NAME: &str = "keysByTypeName";
pub(crate) const KEYS_BY_UUID: &str = "keysByUuid";
pub(crate) const TYPE_PREFIX: &str = "t:";
pub(crate) const BINDING_PREFIX: &str = "b:";

pub(crate) type KeysByTypeName = BTreeMap<String, Vec<BindingId>>;
pub(crate) type KeysByUuid = BTreeMap<Uuid, BindingId>;

/// How a persistent discovery builds its in-memory engine
#[derive(Clone)]
pub(crate) struct EngineParts {
    pub repository: Arc<dyn ResourceRepository>,
    pub config: DiscoveryConfig,
    pub initializers: Vec<Arc<dyn BindingInitializer>>,
}

impl EngineParts {
    pub fn build(&self) -> InMemoryDiscovery {
        self.initializers.iter().fold(
            InMemoryDiscovery::new(self.repository.clone(), self.config),
            |discovery, initializer| discovery.with_initializer(initializer.clone()),
        )
    }
}

pub(crate) fn keys_by_type_name(discovery: &InMemoryDiscovery) -> KeysByTypeName {
    let mut keys = KeysByTypeName::new();
    for (id, binding) in discovery.bindings_with_ids() {
        keys.entry(binding.type_name().to_string()).or_default().push(id);
    }
    keys
}

pub(crate) fn keys_by_uuid(discovery: &InMemoryDiscovery) -> KeysByUuid {
    discovery
        .bindings_with_ids()
        .map(|(id, binding)| (binding.uuid(), id))
        .collect()
}

pub(crate) fn type_key(name: &str) -> String {
    format!("{}{}", TYPE_PREFIX, name)
}

pub(crate) fn binding_key(id: BindingId) -> String {
    format!("{}{}", BINDING_PREFIX, id)
}

/// Restore one stored binding record under its key
pub(crate) fn restore_record(
    discovery: &mut InMemoryDiscovery,
    key: BindingId,
    record: BindingRecord,
) -> Result<()> {
    let binding_type: Arc<BindingType> = discovery
        .get_binding_type(&record.type_name)
        .map_err(|_| {
            DiscoveryError::StorageCorrupt(format!(
                "binding {} references undefined type '{}'",
                key, record.type_name
            ))
        })?
        .clone();
    let binding = record.into_binding(binding_type)?;
    discovery.restore_binding(key, binding)
}

/// Fail unless the stored lookup tables describe the restored index
pub(crate) fn verify_tables(
    discovery: &InMemoryDiscovery,
    stored_by_type: &KeysByTypeName,
    stored_by_uuid: &KeysByUuid,
) -> Result<()> {
    let mut stored_by_type: KeysByTypeName = stored_by_type
        .iter()
        .filter(|(_, keys)| !keys.is_empty())
        .map(|(name, keys)| (name.clone(), keys.clone()))
        .collect();
    for keys in stored_by_type.values_mut() {
        keys.sort_unstable();
    }

    let actual_by_type = keys_by_type_name(discovery);
    if let Some(name) = stored_by_type
        .keys()
        .chain(actual_by_type.keys())
        .find(|name| stored_by_type.get(*name) != actual_by_type.get(*name))
    {
        return Err(DiscoveryError::StorageCorrupt(format!(
            "the type index disagrees with the binding records of type '{}'",
            name
        )));
    }

    let actual_by_uuid = keys_by_uuid(discovery);
    if stored_by_uuid != &actual_by_uuid {
        return Err(DiscoveryError::StorageCorrupt(
            "the uuid index does not match the stored binding records".to_string(),
        ));
    }
    Ok(())
}
