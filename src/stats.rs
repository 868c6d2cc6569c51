//! Dispatch counters.
//!
//! Discards are counted here so an operator can see messages that reached
//! the client while no handler was registered or capacity was exhausted.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the registry and the runtime.
#[derive(Debug, Default)]
pub struct DispatchStats {
    registrations: AtomicU64,
    replacements: AtomicU64,
    rejected_registrations: AtomicU64,
    dispatched: AtomicU64,
    discarded: AtomicU64,
    handler_failures: AtomicU64,
}

impl DispatchStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_registration(&self, replaced: bool) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.replacements.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected_registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            rejected_registrations: self.rejected_registrations.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful registrations.
    pub registrations: u64,
    /// Registrations that superseded an active handler.
    pub replacements: u64,
    /// Registrations refused (empty handler or lost race).
    pub rejected_registrations: u64,
    /// Messages handed to a handler.
    pub dispatched: u64,
    /// Messages dropped without reaching a handler.
    pub discarded: u64,
    /// Handler invocations that returned an error.
    pub handler_failures: u64,
}
