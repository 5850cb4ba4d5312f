use crate::error::{ModstrapError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::Any;
use std::sync::Arc;

/// Type-erased shared service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Thread-safe, name-keyed service registry.
///
/// Registration is serialized per key by the map's shard locks, so two
/// concurrent `register` calls for the same name cannot both succeed.
/// Lookups take a shard read lock only and hand out cloned `Arc`s.
#[derive(Default)]
pub struct ServiceContainer {
    services: DashMap<String, ServiceEntry>,
}

#[derive(Clone)]
struct ServiceEntry {
    instance: ServiceInstance,
    owner: Option<String>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register `instance` under `name`.
    ///
    /// # Errors
    /// Returns [`ModstrapError::DuplicateService`] if `name` is taken; the
    /// existing instance is left in place.
    pub fn register<T: 'static + Send + Sync>(
        &self,
        name: impl Into<String>,
        instance: T,
    ) -> Result<()> {
        self.insert(name.into(), Arc::new(instance), None)
    }

    /// Register an already shared instance, keeping the caller's `Arc`.
    pub fn register_arc<T: 'static + Send + Sync>(
        &self,
        name: impl Into<String>,
        instance: Arc<T>,
    ) -> Result<()> {
        self.insert(name.into(), instance, None)
    }

    pub(crate) fn insert(
        &self,
        name: String,
        instance: ServiceInstance,
        owner: Option<String>,
    ) -> Result<()> {
        match self.services.entry(name) {
            Entry::Occupied(entry) => Err(ModstrapError::DuplicateService {
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                tracing::debug!(service = %entry.key(), owner = ?owner, "registered service");
                entry.insert(ServiceEntry { instance, owner });
                Ok(())
            }
        }
    }

    /// Typed lookup.
    ///
    /// A missing service is a routine condition: the providing module may be
    /// absent or degraded. Callers should degrade rather than fail.
    pub fn get<T: 'static + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.get_raw(name)?
            .downcast::<T>()
            .map_err(|_| ModstrapError::ServiceTypeMismatch {
                name: name.to_string(),
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    /// Untyped lookup.
    pub fn get_raw(&self, name: &str) -> Result<ServiceInstance> {
        self.services
            .get(name)
            .map(|entry| entry.instance.clone())
            .ok_or_else(|| ModstrapError::ServiceNotFound {
                name: name.to_string(),
            })
    }

    pub fn has(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Module that registered `name`, if it came from Phase 1.
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.services.get(name).and_then(|entry| entry.owner.clone())
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Drop every entry. Only called once teardown has finished.
    pub(crate) fn clear(&self) {
        self.services.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestService {
        value: i32,
    }

    #[test]
    fn test_register_and_get() {
        let container = ServiceContainer::new();
        container.register("svc", TestService { value: 42 }).unwrap();
        let service = container.get::<TestService>("svc").unwrap();
        assert_eq!(service.value, 42);
        assert!(container.has("svc"));
        assert!(!container.has("other"));
    }

    #[test]
    fn test_get_returns_same_instance() {
        let container = ServiceContainer::new();
        container.register("svc", TestService { value: 1 }).unwrap();
        let first = container.get::<TestService>("svc").unwrap();
        let second = container.get::<TestService>("svc").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let container = ServiceContainer::new();
        container.register("svc", TestService { value: 1 }).unwrap();
        let err = container
            .register("svc", TestService { value: 2 })
            .unwrap_err();
        assert!(matches!(err, ModstrapError::DuplicateService { name } if name == "svc"));
        assert_eq!(container.get::<TestService>("svc").unwrap().value, 1);
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_missing_and_mistyped_lookups() {
        let container = ServiceContainer::new();
        container.register("num", 7u32).unwrap();
        assert!(matches!(
            container.get::<u32>("absent"),
            Err(ModstrapError::ServiceNotFound { .. })
        ));
        assert!(matches!(
            container.get::<String>("num"),
            Err(ModstrapError::ServiceTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_concurrent_register_admits_one_winner() {
        let container = Arc::new(ServiceContainer::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let container = Arc::clone(&container);
                std::thread::spawn(move || container.register("shared", i).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
