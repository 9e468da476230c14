//! Shared access to a discovery
//!
//! `SharedDiscovery` guards any editable discovery with one read/write lock so
//! several threads can query and edit it. Every operation holds the lock for
//! its whole duration, so readers never observe a half-applied mutation.
//! Reads hand out cloned bindings since references cannot outlive the guard.

use crate::binding::Binding;
use crate::discovery::{BindRequest, EditableDiscovery, UnbindRequest};
use crate::errors::Result;
use crate::types::BindingType;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

pub struct SharedDiscovery<D> {
    inner: Arc<RwLock<D>>,
}

impl<D> Clone for SharedDiscovery<D> {
    fn clone(&self) -> Self {
        SharedDiscovery {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: EditableDiscovery> SharedDiscovery<D> {
    pub fn new(discovery: D) -> Self {
        SharedDiscovery {
            inner: Arc::new(RwLock::new(discovery)),
        }
    }

    /// Get a read lock on the discovery
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, D> {
        self.inner.read()
    }

    /// Get a write lock on the discovery
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, D> {
        self.inner.write()
    }

    pub fn define_type(&self, binding_type: BindingType) -> Result<()> {
        self.inner.write().define_type(binding_type)
    }

    pub fn undefine_type(&self, type_name: &str) -> Result<()> {
        self.inner.write().undefine_type(type_name)
    }

    pub fn bind(&self, request: BindRequest) -> Result<bool> {
        self.inner.write().bind(request)
    }

    pub fn unbind(&self, request: UnbindRequest) -> Result<usize> {
        self.inner.write().unbind(request)
    }

    pub fn remove_binding(&self, uuid: &Uuid) -> Result<()> {
        self.inner.write().remove_binding(uuid)
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.write().clear()
    }

    pub fn find_by_type(&self, type_name: &str) -> Result<Vec<Binding>> {
        let discovery = self.inner.read();
        Ok(discovery
            .find_by_type(type_name)?
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn get_bindings(
        &self,
        resource_path: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<Binding>> {
        let discovery = self.inner.read();
        Ok(discovery
            .get_bindings(resource_path, type_name)?
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn get_binding(&self, uuid: &Uuid) -> Result<Binding> {
        self.inner.read().get_binding(uuid).cloned()
    }

    pub fn has_bindings(&self, resource_path: Option<&str>, type_name: Option<&str>) -> Result<bool> {
        self.inner.read().has_bindings(resource_path, type_name)
    }

    /// Take ownership of the discovery, waiting for nothing if other handles remain
    pub fn into_inner(self) -> std::result::Result<D, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| SharedDiscovery { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryDiscovery;
    use crate::repository::InMemoryRepository;
    use std::thread;

    #[test]
    fn test_concurrent_binds_and_reads() {
        let paths: Vec<String> = (0..8).map(|i| format!("/res/{i}")).collect();
        let repo = InMemoryRepository::with_paths(paths.iter().map(String::as_str));
        let Ok(repo) = repo else {
            panic!("repository should build");
        };
        let shared = SharedDiscovery::new(InMemoryDiscovery::editable(Arc::new(repo)));
        assert!(BindingType::named("t").is_ok_and(|ty| shared.define_type(ty).is_ok()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let query = format!("/res/{i}");
                    let bound = shared.bind(BindRequest::resource(query.as_str(), "t"));
                    let seen = shared.get_bindings(Some(&query), None);
                    (bound, seen.map(|b| b.len()))
                })
            })
            .collect();

        for handle in handles {
            let Ok((bound, seen)) = handle.join() else {
                panic!("worker should not panic");
            };
            assert_eq!(bound, Ok(true));
            assert_eq!(seen, Ok(1));
        }

        assert_eq!(shared.find_by_type("t").map(|b| b.len()), Ok(8));
        assert_eq!(shared.has_bindings(Some("/res"), None), Ok(true));
        assert_eq!(shared.unbind(UnbindRequest::resource("/res/0")), Ok(1));
        assert!(shared.into_inner().is_ok_and(|d| d.len() == 7));
    }
}
