//! Deferred release of native handles
//!
//! Wrappers that pin a native resource hold a [`Cleanable`]. Dropping the
//! last owner of the wrapper drops the `Cleanable`, which pushes its tracking
//! id onto the reference queue. Nothing is released at drop time: the host
//! is only called from [`HandleCleaner::clean`], which drains the queue,
//! unlinks each id from the tracking table and releases the handle. Unlinking
//! is the only path to release, so a handle is released at most once no
//! matter how many threads sweep concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use super::handle::HandleKind;

/// Releases a native handle; implemented by the bridge
pub trait HandleReleaser: Send + Sync {
    /// Release `raw`; called exactly once per registered handle
    fn release(&self, kind: HandleKind, raw: u64);
}

/// A tracked native handle awaiting release
#[derive(Debug, Clone, Copy)]
struct TrackedHandle {
    kind: HandleKind,
    raw: u64,
}

/// Token owned by a wrapper; enqueues its handle for release when dropped
pub struct Cleanable {
    id: u64,
    queue: Arc<SegQueue<u64>>,
}

impl Cleanable {
    /// Tracking id of this registration
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Cleanable {
    fn drop(&mut self) {
        self.queue.push(self.id);
    }
}

impl std::fmt::Debug for Cleanable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanable").field("id", &self.id).finish()
    }
}

/// Tracking table plus reference queue for native handles
pub struct HandleCleaner {
    releaser: Arc<dyn HandleReleaser>,
    queue: Arc<SegQueue<u64>>,
    tracked: Mutex<FxHashMap<u64, TrackedHandle>>,
    next_id: AtomicU64,
    registrations: AtomicU64,
    released: AtomicU64,
    sweep_interval: u64,
}

impl HandleCleaner {
    /// Create a cleaner that sweeps after every `sweep_interval` registrations
    pub fn new(releaser: Arc<dyn HandleReleaser>, sweep_interval: u64) -> Self {
        HandleCleaner {
            releaser,
            queue: Arc::new(SegQueue::new()),
            tracked: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            registrations: AtomicU64::new(0),
            released: AtomicU64::new(0),
            sweep_interval: sweep_interval.max(1),
        }
    }

    /// Track `raw` and return the token whose drop schedules its release
    ///
    /// Registration opportunistically sweeps handles whose owners already died.
    pub fn register(&self, kind: HandleKind, raw: u64) -> Cleanable {
        let count = self.registrations.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.sweep_interval == 0 {
            self.clean();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tracked.lock().insert(id, TrackedHandle { kind, raw });
        Cleanable { id, queue: self.queue.clone() }
    }

    /// Drain the reference queue and release every unlinked handle
    ///
    /// Returns the number of handles released by this call.
    pub fn clean(&self) -> usize {
        let mut ready = Vec::new();
        {
            let mut tracked = self.tracked.lock();
            while let Some(id) = self.queue.pop() {
                if let Some(handle) = tracked.remove(&id) {
                    ready.push(handle);
                }
            }
        }

        for handle in &ready {
            trace!(kind = ?handle.kind, raw = handle.raw, "releasing native handle");
            self.releaser.release(handle.kind, handle.raw);
        }
        self.released.fetch_add(ready.len() as u64, Ordering::Relaxed);
        ready.len()
    }

    /// Number of handles still tracked (live or awaiting a sweep)
    pub fn tracked_count(&self) -> usize {
        self.tracked.lock().len()
    }

    /// Number of dead owners waiting for the next sweep
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Total handles released so far
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Default)]
    struct CountingReleaser {
        released: Mutex<FxHashMap<u64, u32>>,
    }

    impl HandleReleaser for CountingReleaser {
        fn release(&self, _kind: HandleKind, raw: u64) {
            *self.released.lock().entry(raw).or_insert(0) += 1;
        }
    }

    #[test]
    fn test_release_happens_on_sweep_only() {
        let releaser = Arc::new(CountingReleaser::default());
        let cleaner = HandleCleaner::new(releaser.clone(), u64::MAX);

        let token = cleaner.register(HandleKind::Global, 7);
        assert_eq!(cleaner.tracked_count(), 1);
        drop(token);
        assert_eq!(cleaner.pending_count(), 1);
        assert!(releaser.released.lock().is_empty());

        assert_eq!(cleaner.clean(), 1);
        assert_eq!(releaser.released.lock().get(&7), Some(&1));
        assert_eq!(cleaner.tracked_count(), 0);

        // Nothing left to do
        assert_eq!(cleaner.clean(), 0);
        assert_eq!(releaser.released.lock().get(&7), Some(&1));
    }

    #[test]
    fn test_live_tokens_are_not_released() {
        let releaser = Arc::new(CountingReleaser::default());
        let cleaner = HandleCleaner::new(releaser.clone(), u64::MAX);
        let _live = cleaner.register(HandleKind::Metadata, 1);
        let dead = cleaner.register(HandleKind::Metadata, 2);
        drop(dead);
        cleaner.clean();
        let released = releaser.released.lock();
        assert!(!released.contains_key(&1));
        assert_eq!(released.get(&2), Some(&1));
    }

    #[test]
    fn test_registration_triggers_sweep() {
        let releaser = Arc::new(CountingReleaser::default());
        let cleaner = HandleCleaner::new(releaser.clone(), 2);
        drop(cleaner.register(HandleKind::Global, 10));
        assert_eq!(cleaner.released_count(), 0);
        // Second registration sweeps before tracking the new handle
        let _keep = cleaner.register(HandleKind::Global, 11);
        assert_eq!(cleaner.released_count(), 1);
        assert_eq!(cleaner.tracked_count(), 1);
    }

    #[test]
    fn test_concurrent_sweeps_release_exactly_once() {
        let releaser = Arc::new(CountingReleaser::default());
        let cleaner = Arc::new(HandleCleaner::new(releaser.clone(), u64::MAX));

        let tokens: Vec<_> = (0..1000).map(|i| cleaner.register(HandleKind::Global, i)).collect();
        drop(tokens);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cleaner = cleaner.clone();
                thread::spawn(move || cleaner.clean())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total, 1000);
        let released = releaser.released.lock();
        assert_eq!(released.len(), 1000);
        assert!(released.values().all(|&n| n == 1));
    }
}
