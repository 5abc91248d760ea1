//! Availability state machine and per-process write counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::InitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityState {
    Uninitialized,
    Probing,
    SemanticReady,
    Degraded(InitError),
}

impl AvailabilityState {
    pub fn is_semantic(&self) -> bool {
        matches!(self, AvailabilityState::SemanticReady)
    }

    /// The store passed its checks; only the embedding probe may have failed.
    pub fn store_usable(&self) -> bool {
        matches!(
            self,
            AvailabilityState::SemanticReady
                | AvailabilityState::Degraded(InitError::EmbeddingProbeFailed)
        )
    }

    pub fn vectors_enabled(&self) -> bool {
        self.is_semantic()
    }

    fn can_become(&self, next: &AvailabilityState) -> bool {
        use AvailabilityState::*;
        matches!(
            (self, next),
            (Uninitialized, Probing)
                | (Probing, SemanticReady)
                | (Probing, Degraded(_))
                | (Degraded(_), SemanticReady)
                | (Degraded(_), Degraded(_))
        )
    }
}

/// Single-writer availability flag owned by the context manager.
pub struct Availability {
    state: RwLock<AvailabilityState>,
    init_lock: Mutex<()>,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            state: RwLock::new(AvailabilityState::Uninitialized),
            init_lock: Mutex::new(()),
        }
    }
}

impl Availability {
    pub fn current(&self) -> AvailabilityState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Serializes initialization sequences.
    pub(crate) async fn lock_init(&self) -> MutexGuard<'_, ()> {
        self.init_lock.lock().await
    }

    /// Applies a lifecycle transition. Returns false if it is not allowed.
    pub(crate) fn transition(&self, next: AvailabilityState) -> bool {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.can_become(&next) {
            warn!("Availability: Ignoring transition {:?} -> {:?}", *state, next);
            return false;
        }
        debug!("Availability: {:?} -> {:?}", *state, next);
        *state = next;
        true
    }
}

/// Writes attempted by this process since startup.
#[derive(Debug, Default)]
pub struct SessionCounters {
    stored: AtomicU64,
    stored_with_vector: AtomicU64,
    duplicates: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub stored: u64,
    pub stored_with_vector: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl SessionCounters {
    pub(crate) fn record_stored(&self, with_vector: bool) {
        self.stored.fetch_add(1, Ordering::Relaxed);
        if with_vector {
            self.stored_with_vector.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stored: self.stored.load(Ordering::Relaxed),
            stored_with_vector: self.stored_with_vector.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
