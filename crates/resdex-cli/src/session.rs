//! Opening the configured discovery

use crate::common::{GlobalOpts, Settings};
use crate::errors::CliResult;
use resdex_config::Backend;
use resdex_core::{DiscoveryConfig, EditableDiscovery, FilesystemRepository};
use resdex_store::{JsonFileDiscovery, JsonFileStore, KeyValueStoreDiscovery};
use std::sync::Arc;

/// Open the discovery selected by the global options
///
/// The discovery is editable: bindings resolve lazily against the resource
/// root and path lookups evaluate every stored query.
pub fn open_discovery(opts: &GlobalOpts) -> CliResult<Box<dyn EditableDiscovery>> {
    let settings = opts.settings()?;
    open_with(&settings)
}

pub fn open_with(settings: &Settings) -> CliResult<Box<dyn EditableDiscovery>> {
    let repository = Arc::new(FilesystemRepository::new(&settings.repository_root)?);
    resdex_logger::debug(&format!(
        "Opening {} discovery at {} (resources under {})",
        settings.backend,
        settings.discovery_path.display(),
        settings.repository_root.display()
    ));

    let config = DiscoveryConfig::editable();
    Ok(match settings.backend {
        Backend::Json => Box::new(JsonFileDiscovery::new(
            &settings.discovery_path,
            repository,
            config,
        )),
        Backend::Kv => {
            let store = JsonFileStore::open(&settings.discovery_path)?;
            Box::new(KeyValueStoreDiscovery::new(store, repository, config))
        }
    })
}
