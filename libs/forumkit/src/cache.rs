//! Per-context single-instance cache.
//!
//! Memoizes one instance per concrete type for the lifetime of a request
//! context. It sits beside the [`ServiceScope`](crate::scope::ServiceScope)
//! rather than going through it: cheap helpers such as [`QueryIds`](crate::request::QueryIds)
//! do not need binding resolution.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct SingleInstanceCache {
    instances: RefCell<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for SingleInstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleInstanceCache")
            .field("instances", &self.instances.borrow().len())
            .finish()
    }
}

impl SingleInstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instances
            .borrow()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Return the cached `T`, constructing it with `Default` on first use.
    pub fn get_instance<T: Default + Any + Send + Sync>(&self) -> Arc<T> {
        if let Some(existing) = self.lookup::<T>() {
            return existing;
        }
        let created = Arc::new(T::default());
        self.instances
            .borrow_mut()
            .insert(TypeId::of::<T>(), created.clone());
        created
    }

    /// Return the cached `T`, constructing it with `init` on first use.
    ///
    /// A failing `init` caches nothing; the next call tries again.
    pub fn try_get_or_init<T, E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(existing) = self.lookup::<T>() {
            return Ok(existing);
        }
        // No borrow is held here: `init` may use the cache for other types.
        let created = Arc::new(init()?);
        self.instances
            .borrow_mut()
            .insert(TypeId::of::<T>(), created.clone());
        Ok(created)
    }

    pub fn try_get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.lookup::<T>()
    }

    /// Replace whatever is cached for `T`. Last write wins.
    pub fn set_instance<T: Any + Send + Sync>(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.instances
            .borrow_mut()
            .insert(TypeId::of::<T>(), value.clone());
        value
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.instances.borrow().contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn clear(&self) {
        self.instances.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Helper {
        value: u32,
    }

    #[test]
    fn second_request_returns_same_instance() {
        let cache = SingleInstanceCache::new();
        let a = cache.get_instance::<Helper>();
        let b = cache.get_instance::<Helper>();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn set_instance_overrides_lazy_value() {
        let cache = SingleInstanceCache::new();
        let _lazy = cache.get_instance::<Helper>();
        let set = cache.set_instance(Helper { value: 7 });
        let got = cache.get_instance::<Helper>();
        assert!(Arc::ptr_eq(&set, &got));
        assert_eq!(got.value, 7);
    }

    #[test]
    fn failed_construction_is_not_cached() {
        let cache = SingleInstanceCache::new();
        let err = cache
            .try_get_or_init::<Helper, _, _>(|| Err("boom"))
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(!cache.contains::<Helper>());

        let ok = cache
            .try_get_or_init::<Helper, &str, _>(|| Ok(Helper { value: 3 }))
            .unwrap();
        assert_eq!(ok.value, 3);
    }

    #[test]
    fn init_may_use_the_cache_for_other_types() {
        let cache = SingleInstanceCache::new();
        let outer = cache
            .try_get_or_init::<String, (), _>(|| {
                let inner = cache.get_instance::<Helper>();
                Ok(format!("inner={}", inner.value))
            })
            .unwrap();
        assert_eq!(outer.as_str(), "inner=0");
        assert!(cache.contains::<Helper>());
    }
}
