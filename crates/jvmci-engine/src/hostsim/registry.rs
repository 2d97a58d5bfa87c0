//! Handle registries of the simulated host
//!
//! Global references and metadata pins are looked up by raw handle from any
//! thread. Releasing an unknown handle is counted rather than ignored so
//! that tests can assert every handle was released exactly once.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Registry mapping raw handles to the values they keep alive
pub struct HandleRegistry<V> {
    entries: DashMap<u64, V>,
    next: AtomicU64,
    released: AtomicU64,
    bad_releases: AtomicU64,
}

impl<V: Clone> HandleRegistry<V> {
    /// Create an empty registry whose handles start at `first`
    pub fn new(first: u64) -> Self {
        HandleRegistry {
            entries: DashMap::new(),
            next: AtomicU64::new(first),
            released: AtomicU64::new(0),
            bad_releases: AtomicU64::new(0),
        }
    }

    /// Register `value` under a fresh handle
    pub fn create(&self, value: V) -> u64 {
        let handle = self.next.fetch_add(8, Ordering::Relaxed);
        self.entries.insert(handle, value);
        handle
    }

    /// Register `value` under a caller-chosen handle
    pub fn insert(&self, handle: u64, value: V) {
        self.entries.insert(handle, value);
    }

    /// Value behind a live handle
    pub fn get(&self, handle: u64) -> Option<V> {
        self.entries.get(&handle).map(|entry| entry.clone())
    }

    /// Drop a handle; returns false and counts a bad release if it was not live
    pub fn release(&self, handle: u64) -> bool {
        if self.entries.remove(&handle).is_some() {
            self.released.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.bad_releases.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Number of live handles
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Handles released so far
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Releases of handles that were not live
    pub fn bad_releases(&self) -> u64 {
        self.bad_releases.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let registry = HandleRegistry::new(0x100);
        let a = registry.create("a");
        let b = registry.create("b");
        assert_ne!(a, b);
        assert_eq!(registry.get(a), Some("a"));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_double_release_is_counted() {
        let registry = HandleRegistry::new(0x100);
        let a = registry.create(1u32);
        assert!(registry.release(a));
        assert!(!registry.release(a));
        assert_eq!(registry.released(), 1);
        assert_eq!(registry.bad_releases(), 1);
        assert!(registry.get(a).is_none());
    }
}
