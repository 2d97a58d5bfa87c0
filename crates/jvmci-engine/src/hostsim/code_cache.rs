//! Code cache of the simulated host
//!
//! Stores installed blobs by address, with a total capacity and support for
//! invalidation. Addresses are handed out bump-style and never reused.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::meta::MethodPointer;

/// Base address of the simulated code heap
const CODE_HEAP_BASE: u64 = 0x6000_0000_0000;

/// A blob in the code cache
pub struct CodeBlob {
    /// Name given at install
    pub name: String,
    /// Root method, `None` for stubs
    pub method: Option<MethodPointer>,
    /// Instruction and data bytes
    pub bytes: Vec<u8>,
    /// Whether the blob was made non-entrant
    pub invalidated: AtomicBool,
}

/// Thread-safe cache of installed code
pub struct CodeCache {
    blobs: RwLock<FxHashMap<u64, CodeBlob>>,
    total_code_size: AtomicUsize,
    max_size: usize,
    next_address: AtomicU64,
}

impl CodeCache {
    /// Create a code cache holding at most `max_size` bytes
    pub fn new(max_size: usize) -> Self {
        CodeCache {
            blobs: RwLock::new(FxHashMap::default()),
            total_code_size: AtomicUsize::new(0),
            max_size,
            next_address: AtomicU64::new(CODE_HEAP_BASE),
        }
    }

    /// Insert a blob aligned to `alignment`
    ///
    /// Returns the blob address, or `None` if the cache is full.
    pub fn insert(&self, name: &str, method: Option<MethodPointer>, bytes: Vec<u8>, alignment: u64) -> Option<u64> {
        let mut blobs = self.blobs.write();
        let size = bytes.len();
        let current = self.total_code_size.load(Ordering::Relaxed);
        if current + size > self.max_size {
            return None;
        }

        let alignment = alignment.max(1);
        let next = self.next_address.load(Ordering::Relaxed);
        let address = (next + alignment - 1) / alignment * alignment;
        self.next_address.store(address + (size as u64).max(1), Ordering::Relaxed);

        self.total_code_size.fetch_add(size, Ordering::Relaxed);
        blobs.insert(
            address,
            CodeBlob { name: name.to_string(), method, bytes, invalidated: AtomicBool::new(false) },
        );
        Some(address)
    }

    /// Make a blob non-entrant; returns false if no blob lives at `address`
    pub fn invalidate(&self, address: u64) -> bool {
        let blobs = self.blobs.read();
        match blobs.get(&address) {
            Some(blob) => {
                blob.invalidated.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Whether a valid blob lives at `address`
    pub fn contains(&self, address: u64) -> bool {
        self.blobs.read().get(&address).map(|b| !b.invalidated.load(Ordering::Acquire)).unwrap_or(false)
    }

    /// Run `f` over the blob at `address`
    pub fn with_blob<R>(&self, address: u64, f: impl FnOnce(&CodeBlob) -> R) -> Option<R> {
        self.blobs.read().get(&address).map(f)
    }

    /// Total bytes of installed code
    pub fn total_size(&self) -> usize {
        self.total_code_size.load(Ordering::Relaxed)
    }

    /// Number of blobs, invalidated ones included
    pub fn entry_count(&self) -> usize {
        self.blobs.read().len()
    }
}
