//! Resdex persistence
//!
//! Discoveries that keep their types and bindings outside the process:
//! `JsonFileDiscovery` stores one JSON document, `KeyValueStoreDiscovery`
//! spreads them over the keys of a `KeyValueStore`. Both hydrate an
//! `InMemoryDiscovery` on first access and write through on every change.

pub mod errors;
pub mod json_discovery;
pub mod kv_discovery;
mod layout;
pub mod store;

pub use errors::StoreError;
pub use json_discovery::JsonFileDiscovery;
pub use kv_discovery::KeyValueStoreDiscovery;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
