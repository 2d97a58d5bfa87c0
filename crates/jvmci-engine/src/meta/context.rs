//! The metadata context: wrapper caches, string interner and handle cleaner
//!
//! Every wrapper lookup goes through a [`WeakCache`] keyed by native handle.
//! A hit whose wrapper is still alive returns that same `Arc`, so two lookups
//! of a handle agree on identity as long as somebody holds the first result.
//! Misses construct a wrapper outside the lock; when two threads race, the
//! first live entry wins and the loser's wrapper is dropped, which only
//! schedules its pin for release.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::cleaner::{Cleanable, HandleCleaner};
use super::constant::{HeapObject, HostObject, ObjectConstant, ObjectData};
use super::field::HotSpotResolvedJavaField;
use super::handle::{ConstantPoolPointer, FieldPointer, HandleKind, KlassPointer, MethodPointer};
use super::kind::JavaKind;
use super::method::HotSpotResolvedJavaMethod;
use super::types::{HotSpotResolvedObjectType, JavaType, UnresolvedJavaType};
use crate::bridge::CompilerToVm;
use crate::config::HotSpotVmConfig;
use crate::constant_pool::HotSpotConstantPool;
use crate::error::JvmciResult;
use crate::memory::UnsafeAccess;

/// Handle to wrapper map holding only weak references
pub struct WeakCache<K, V> {
    entries: RwLock<FxHashMap<K, Weak<V>>>,
}

impl<K: Copy + Eq + Hash, V> WeakCache<K, V> {
    /// Create an empty cache
    pub fn new() -> Self {
        WeakCache { entries: RwLock::new(FxHashMap::default()) }
    }

    /// Live wrapper for `key`, if any
    pub fn get(&self, key: K) -> Option<Arc<V>> {
        self.entries.read().get(&key).and_then(Weak::upgrade)
    }

    /// Live wrapper for `key`, constructing one with `make` on a miss
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        self.insert_if_absent(key, Arc::new(make()))
    }

    /// Like [`WeakCache::get_or_insert_with`] for constructors that can fail
    pub fn get_or_try_insert_with<F>(&self, key: K, make: F) -> JvmciResult<Arc<V>>
    where
        F: FnOnce() -> JvmciResult<V>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        Ok(self.insert_if_absent(key, Arc::new(make()?)))
    }

    fn insert_if_absent(&self, key: K, created: Arc<V>) -> Arc<V> {
        let mut entries = self.entries.write();
        if let Some(winner) = entries.get(&key).and_then(Weak::upgrade) {
            return winner;
        }
        entries.insert(key, Arc::downgrade(&created));
        created
    }

    /// Drop entries whose wrapper has died; returns how many were removed
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        before - entries.len()
    }

    /// Number of entries, dead ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Copy + Eq + Hash, V> Default for WeakCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-runtime owner of wrapper caches and native handle lifetimes
pub struct MetadataContext {
    c2v: Arc<CompilerToVm>,
    config: Arc<HotSpotVmConfig>,
    cleaner: HandleCleaner,
    types: WeakCache<KlassPointer, HotSpotResolvedObjectType>,
    methods: WeakCache<MethodPointer, HotSpotResolvedJavaMethod>,
    fields: WeakCache<FieldPointer, HotSpotResolvedJavaField>,
    pools: WeakCache<ConstantPoolPointer, HotSpotConstantPool>,
    strings: DashMap<String, Weak<ObjectData>>,
}

impl MetadataContext {
    /// Create a context that sweeps dead handles every `sweep_interval` registrations
    pub fn new(c2v: Arc<CompilerToVm>, config: Arc<HotSpotVmConfig>, sweep_interval: u64) -> Self {
        let cleaner = HandleCleaner::new(c2v.clone(), sweep_interval);
        MetadataContext {
            c2v,
            config,
            cleaner,
            types: WeakCache::new(),
            methods: WeakCache::new(),
            fields: WeakCache::new(),
            pools: WeakCache::new(),
            strings: DashMap::new(),
        }
    }

    /// The bridge
    pub fn compiler_to_vm(&self) -> &Arc<CompilerToVm> {
        &self.c2v
    }

    /// Host layout facts
    pub fn config(&self) -> &HotSpotVmConfig {
        &self.config
    }

    /// Typed access to host metadata memory
    pub fn unsafe_access(&self) -> UnsafeAccess<'_> {
        UnsafeAccess::new(self.c2v.memory())
    }

    /// The handle cleaner
    pub fn cleaner(&self) -> &HandleCleaner {
        &self.cleaner
    }

    /// Wrapper for a class
    pub fn resolved_type(&self, klass: KlassPointer) -> Arc<HotSpotResolvedObjectType> {
        self.types.get_or_insert_with(klass, || {
            debug!(?klass, "type cache miss");
            HotSpotResolvedObjectType::new(self, klass)
        })
    }

    /// Wrapper for a method; fails if the host reports a malformed descriptor
    pub fn resolved_method(&self, method: MethodPointer) -> JvmciResult<Arc<HotSpotResolvedJavaMethod>> {
        self.methods.get_or_try_insert_with(method, || {
            debug!(?method, "method cache miss");
            HotSpotResolvedJavaMethod::new(self, method)
        })
    }

    /// Wrapper for a field
    pub fn resolved_field(&self, field: FieldPointer) -> Arc<HotSpotResolvedJavaField> {
        self.fields.get_or_insert_with(field, || HotSpotResolvedJavaField::new(self, field))
    }

    /// Wrapper for a constant pool
    pub fn constant_pool(&self, cp: ConstantPoolPointer) -> Arc<HotSpotConstantPool> {
        self.pools.get_or_insert_with(cp, || {
            debug!(?cp, "constant pool cache miss");
            HotSpotConstantPool::new(self, cp)
        })
    }

    /// Find a type by internal name or primitive descriptor
    ///
    /// Without `resolve`, a class the host has not loaded comes back unresolved.
    pub fn lookup_type(&self, name: &str, accessing: Option<KlassPointer>, resolve: bool) -> JvmciResult<JavaType> {
        if name.len() == 1 {
            if let Some(kind) = name.chars().next().and_then(JavaKind::from_type_char) {
                return Ok(JavaType::Primitive(kind));
            }
        }
        match self.c2v.lookup_type(name, accessing, resolve)? {
            Some(klass) => Ok(JavaType::Resolved(self.resolved_type(klass))),
            None => Ok(JavaType::Unresolved(UnresolvedJavaType::new(name))),
        }
    }

    /// Pin a metadata pointer until the returned token is dropped and swept
    pub(crate) fn pin_metadata(&self, metadata: u64) -> Cleanable {
        let slot = self.c2v.allocate_metadata_handle(metadata);
        self.cleaner.register(HandleKind::Metadata, slot)
    }

    /// Take ownership of a host object's global handle
    ///
    /// Strings are interned: a string with the same contents as a live
    /// interned constant returns that constant and releases the new handle.
    pub fn object_constant(&self, object: HostObject) -> ObjectConstant {
        let pin = self.cleaner.register(HandleKind::Global, object.handle.raw());
        if let HeapObject::String(s) = &object.value {
            let key = s.clone();
            return self.intern_with(&key, move || ObjectConstant::pinned(object.handle, object.value, pin));
        }
        ObjectConstant::pinned(object.handle, object.value, pin)
    }

    /// Interned managed-side string constant
    pub fn intern_string(&self, s: &str) -> ObjectConstant {
        self.intern_with(s, || ObjectConstant::unpinned(HeapObject::String(s.to_string())))
    }

    fn intern_with<F: FnOnce() -> ObjectConstant>(&self, s: &str, make: F) -> ObjectConstant {
        if let Some(live) = self.strings.get(s).and_then(|w| w.upgrade()) {
            return ObjectConstant::from_data(live);
        }
        match self.strings.entry(s.to_string()) {
            Entry::Occupied(mut e) => {
                if let Some(live) = e.get().upgrade() {
                    return ObjectConstant::from_data(live);
                }
                let constant = make();
                e.insert(Arc::downgrade(constant.data()));
                constant
            }
            Entry::Vacant(e) => {
                let constant = make();
                e.insert(Arc::downgrade(constant.data()));
                constant
            }
        }
    }

    /// Release handles of dead wrappers and forget dead cache entries
    pub fn sweep(&self) -> usize {
        let released = self.cleaner.clean();
        let purged = self.types.purge() + self.methods.purge() + self.fields.purge() + self.pools.purge();
        self.strings.retain(|_, w| w.strong_count() > 0);
        trace!(released, purged, "metadata sweep");
        released
    }

    /// Number of cached wrappers, dead ones included
    pub fn cached_wrapper_count(&self) -> usize {
        self.types.len() + self.methods.len() + self.fields.len() + self.pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_weak_cache_identity_while_alive() {
        let cache: WeakCache<u64, String> = WeakCache::new();
        let a = cache.get_or_insert_with(1, || "one".to_string());
        let b = cache.get_or_insert_with(1, || "uno".to_string());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, "one");
    }

    #[test]
    fn test_weak_cache_rebuilds_after_death() {
        let cache: WeakCache<u64, String> = WeakCache::new();
        let built = AtomicUsize::new(0);
        let make = || {
            built.fetch_add(1, Ordering::Relaxed);
            Ok("v".to_string())
        };
        drop(cache.get_or_try_insert_with(7, make).unwrap());
        assert!(cache.get(7).is_none());
        let _again = cache.get_or_try_insert_with(7, make).unwrap();
        assert_eq!(built.load(Ordering::Relaxed), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_weak_cache_purge() {
        let cache: WeakCache<u64, u32> = WeakCache::new();
        let keep = cache.get_or_insert_with(1, || 1);
        drop(cache.get_or_insert_with(2, || 2));
        assert_eq!(cache.purge(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(*keep, 1);
    }

    #[test]
    fn test_weak_cache_failed_construction_not_cached() {
        let cache: WeakCache<u64, u32> = WeakCache::new();
        let err = cache.get_or_try_insert_with(1, || Err(crate::error::JvmciError::Host("bad".into())));
        assert!(err.is_err());
        assert!(cache.is_empty());
    }
}
