//! Request-generation bookkeeping.
//!
//! Every accepted chat request takes a fresh generation id; only the holder
//! of the latest id may keep driving the shared chat tab. The tracker is
//! plain atomics — mutation is single-writer per field and readers are
//! allowed to observe stale values, since a superseded orchestration is only
//! required to notice on its next cooperative check.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Monotonic ownership token for one chat-completion request.
pub type GenerationId = u64;

/// Monotonic id of one browser-session lifetime.
pub type SessionEpoch = u64;

#[derive(Debug, Default)]
pub struct GenerationTracker {
    generation: AtomicU64,
    epoch: AtomicU64,
    driver_available: AtomicBool,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a new request: any orchestration holding an older id is
    /// superseded from this point on.
    pub fn begin_generation(&self) -> GenerationId {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `id` is still the latest accepted generation.
    pub fn is_current(&self, id: GenerationId) -> bool {
        self.generation.load(Ordering::SeqCst) == id
    }

    /// Whether the browser session has been usable since the last
    /// [`reinitialize`](Self::reinitialize).
    pub fn driver_available(&self) -> bool {
        self.driver_available.load(Ordering::SeqCst)
    }

    /// Record a fresh browser session: bump the epoch, reset the generation
    /// counter, mark the driver usable.
    pub fn reinitialize(&self) -> SessionEpoch {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.generation.store(0, Ordering::SeqCst);
        self.driver_available.store(true, Ordering::SeqCst);
        epoch
    }

    /// Mark the driver unusable without disturbing the generation counter;
    /// in-flight orchestrations notice on their next check.
    pub fn invalidate_driver(&self) {
        self.driver_available.store(false, Ordering::SeqCst);
    }

    pub fn session_epoch(&self) -> SessionEpoch {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn current_generation(&self) -> GenerationId {
        self.generation.load(Ordering::SeqCst)
    }
}
