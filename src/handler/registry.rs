//! The single-slot handler registry.
//!
//! [`HandlerSlot`] holds at most one active [`HandlerRef`]. Registration
//! swaps the slot under a write lock; dispatch clones the active ref under a
//! read lock and invokes it after the lock is released. A superseded handler
//! therefore stays alive exactly as long as the dispatches that already
//! picked it up, and is dropped once, by whichever holder goes last.
//!
//! # Example
//!
//! ```
//! use shotsync::handler::{HandlerRef, HandlerSlot, Message, Reply};
//!
//! let slot = HandlerSlot::new();
//! let mut last = None;
//! for _ in 0..20 {
//!     let handler = HandlerRef::from_fn(|_msg: Message| async { Ok(Reply::empty()) });
//!     last = Some(handler.id());
//!     slot.set(handler).unwrap();
//! }
//! assert_eq!(slot.active_id(), last);
//! ```

use parking_lot::RwLock;

use super::message::{Message, MessageKind, Reply};
use super::object::{HandlerId, HandlerRef};
use crate::error::{Result, ShotSyncError};
use crate::stats::{DispatchStats, StatsSnapshot};

/// What happened to a dispatched message.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The active handler produced a reply.
    Handled {
        /// Handler that ran.
        handler: HandlerId,
        /// Its reply.
        reply: Reply,
    },
    /// The active handler returned an error.
    Failed {
        /// Handler that ran.
        handler: HandlerId,
        /// The error it returned.
        error: ShotSyncError,
    },
    /// No handler was registered; the message was dropped.
    Discarded,
}

impl DispatchOutcome {
    /// Id of the handler that ran, if any.
    pub fn handler(&self) -> Option<HandlerId> {
        match self {
            DispatchOutcome::Handled { handler, .. } | DispatchOutcome::Failed { handler, .. } => {
                Some(*handler)
            }
            DispatchOutcome::Discarded => None,
        }
    }
}

/// Holder of the current message handler.
pub struct HandlerSlot {
    current: RwLock<Option<HandlerRef>>,
    stats: DispatchStats,
}

impl HandlerSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            stats: DispatchStats::new(),
        }
    }

    /// Install `handler`, superseding the active one.
    ///
    /// Returns the id of the handler that was replaced. An empty handler is
    /// rejected with [`ShotSyncError::InvalidHandler`] and the slot is left
    /// untouched.
    pub fn set(&self, handler: HandlerRef) -> Result<Option<HandlerId>> {
        if let Err(e) = handler.validate() {
            self.stats.record_rejected();
            tracing::warn!(handler = %handler.id(), "rejected message handler registration: {}", e);
            return Err(e);
        }

        let new_id = handler.id();
        let label = handler.label().map(str::to_owned);
        let previous = self.current.write().replace(handler);
        Ok(self.finish_swap(new_id, label, previous))
    }

    /// Install `handler` only if the active handler is `expected`.
    ///
    /// `expected == None` means the slot must be empty. On mismatch nothing
    /// changes and [`ShotSyncError::RegistrationRace`] reports what was found.
    pub fn replace(
        &self,
        expected: Option<HandlerId>,
        handler: HandlerRef,
    ) -> Result<Option<HandlerId>> {
        if let Err(e) = handler.validate() {
            self.stats.record_rejected();
            return Err(e);
        }

        let new_id = handler.id();
        let label = handler.label().map(str::to_owned);
        let previous = {
            let mut current = self.current.write();
            let actual = current.as_ref().map(HandlerRef::id);
            if actual != expected {
                drop(current);
                self.stats.record_rejected();
                tracing::debug!(?expected, ?actual, "message handler replace lost race");
                return Err(ShotSyncError::RegistrationRace { expected, actual });
            }
            current.replace(handler)
        };
        Ok(self.finish_swap(new_id, label, previous))
    }

    // Runs after the write lock is released: dropping `previous` may run
    // arbitrary destructor code, which must be free to touch the slot.
    fn finish_swap(
        &self,
        new_id: HandlerId,
        label: Option<String>,
        previous: Option<HandlerRef>,
    ) -> Option<HandlerId> {
        let previous_id = previous.as_ref().map(HandlerRef::id);
        self.stats.record_registration(previous.is_some());
        tracing::debug!(
            handler = %new_id,
            label = label.as_deref().unwrap_or(""),
            previous = ?previous_id,
            "message handler registered"
        );
        drop(previous);
        previous_id
    }

    /// Remove the active handler, returning its id.
    pub fn clear(&self) -> Option<HandlerId> {
        let previous = self.current.write().take();
        let previous_id = previous.as_ref().map(HandlerRef::id);
        if let Some(id) = previous_id {
            tracing::debug!(handler = %id, "message handler cleared");
        }
        drop(previous);
        previous_id
    }

    /// Id of the active handler.
    pub fn active_id(&self) -> Option<HandlerId> {
        self.current.read().as_ref().map(HandlerRef::id)
    }

    /// Clone of the active handler.
    pub fn active(&self) -> Option<HandlerRef> {
        self.current.read().clone()
    }

    /// Whether a handler is registered.
    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }

    /// Dispatch one message to the active handler.
    ///
    /// The handler is chosen when the call starts. A registration that lands
    /// while the handler runs does not interrupt it, and the old handler is
    /// released only after this call finishes with it.
    pub async fn dispatch(&self, message: Message) -> DispatchOutcome {
        let handler = match self.active() {
            Some(h) => h,
            None => {
                self.record_discard(&message, "no message handler registered");
                return DispatchOutcome::Discarded;
            }
        };

        self.stats.record_dispatch();
        let id = handler.id();
        let code = message.code;
        let outcome = match handler.invoke(message).await {
            Ok(reply) => DispatchOutcome::Handled { handler: id, reply },
            Err(error) => {
                self.stats.record_failure();
                tracing::error!(handler = %id, code, "message handler failed: {}", error);
                DispatchOutcome::Failed { handler: id, error }
            }
        };
        drop(handler);
        outcome
    }

    /// Count and log a message that never reached a handler.
    pub(crate) fn record_discard(&self, message: &Message, reason: &str) {
        self.stats.record_discard();
        let kind = match message.kind {
            MessageKind::Request => "request",
            MessageKind::Notification => "notification",
            MessageKind::Reply { .. } => "reply",
        };
        tracing::warn!(
            code = message.code,
            request_id = message.request_id,
            kind,
            "{}, discarding message",
            reason
        );
    }

    /// Counters for this slot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for HandlerSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::status;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{oneshot, Notify};

    struct ReleaseProbe(Arc<AtomicUsize>);

    impl Drop for ReleaseProbe {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_handler(calls: Arc<AtomicUsize>, released: Arc<AtomicUsize>) -> HandlerRef {
        let probe = ReleaseProbe(released);
        HandlerRef::from_fn(move |_msg: Message| {
            let _ = &probe;
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Reply::empty()) }
        })
    }

    fn noop_handler() -> HandlerRef {
        HandlerRef::from_fn(|_msg: Message| async { Ok(Reply::empty()) })
    }

    fn note() -> Message {
        Message::notification(1, Bytes::new())
    }

    #[test]
    fn test_twenty_registrations_leave_last_active() {
        let slot = HandlerSlot::new();
        let mut ids = Vec::new();

        for _ in 1..=20 {
            let handler = noop_handler();
            ids.push(handler.id());
            slot.set(handler).unwrap();
        }

        assert_eq!(slot.active_id(), ids.last().copied());
        let stats = slot.stats();
        assert_eq!(stats.registrations, 20);
        assert_eq!(stats.replacements, 19);
    }

    #[test]
    fn test_set_returns_previous_id() {
        let slot = HandlerSlot::new();
        let h1 = noop_handler();
        let h2 = noop_handler();
        let id1 = h1.id();
        let id2 = h2.id();

        assert_eq!(slot.set(h1).unwrap(), None);
        assert_eq!(slot.set(h2).unwrap(), Some(id1));
        assert_eq!(slot.active_id(), Some(id2));
    }

    #[test]
    fn test_empty_handler_rejected_and_previous_kept() {
        let slot = HandlerSlot::new();
        let h1 = noop_handler();
        let id1 = h1.id();
        slot.set(h1).unwrap();

        let err = slot.set(HandlerRef::empty()).unwrap_err();
        assert!(matches!(err, ShotSyncError::InvalidHandler(_)));
        assert_eq!(slot.active_id(), Some(id1));
        assert_eq!(slot.stats().rejected_registrations, 1);
    }

    #[test]
    fn test_superseded_handlers_released_exactly_once() {
        let slot = HandlerSlot::new();
        let released = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            slot.set(counting_handler(calls.clone(), released.clone()))
                .unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 19);

        slot.clear();
        assert_eq!(released.load(Ordering::SeqCst), 20);
        assert!(!slot.is_set());
    }

    #[tokio::test]
    async fn test_old_handler_not_invoked_after_replacement() {
        let slot = HandlerSlot::new();
        let released = Arc::new(AtomicUsize::new(0));
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        slot.set(counting_handler(first_calls.clone(), released.clone()))
            .unwrap();
        slot.set(counting_handler(second_calls.clone(), released.clone()))
            .unwrap();

        for _ in 0..5 {
            let outcome = slot.dispatch(note()).await;
            assert!(matches!(outcome, DispatchOutcome::Handled { .. }));
        }

        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_release_waits_for_in_flight_dispatch() {
        let slot = Arc::new(HandlerSlot::new());
        let released = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Notify::new());
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let gate_rx = Arc::new(parking_lot::Mutex::new(Some(gate_rx)));

        let probe = ReleaseProbe(released.clone());
        let started_clone = started.clone();
        let slow = HandlerRef::from_fn(move |_msg: Message| {
            let _ = &probe;
            let started = started_clone.clone();
            let gate = gate_rx.lock().take();
            async move {
                started.notify_one();
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(Reply::ok(Bytes::from_static(b"slow")))
            }
        });
        let slow_id = slow.id();
        slot.set(slow).unwrap();

        let task = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.dispatch(note()).await })
        };
        started.notified().await;

        slot.set(noop_handler()).unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 0, "released mid-flight");

        gate_tx.send(()).unwrap();
        let outcome = task.await.unwrap();
        assert_eq!(outcome.handler(), Some(slow_id));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_registrations_leave_one_winner() {
        let slot = Arc::new(HandlerSlot::new());
        let released = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let slot = slot.clone();
                let released = released.clone();
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..50 {
                        let h = counting_handler(Arc::new(AtomicUsize::new(0)), released.clone());
                        ids.push(h.id());
                        slot.set(h).unwrap();
                    }
                    ids
                })
            })
            .collect();

        let all: HashSet<HandlerId> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();

        let active = slot.active_id().unwrap();
        assert!(all.contains(&active));
        assert_eq!(all.len(), 400);
        assert_eq!(slot.stats().registrations, 400);
        assert_eq!(released.load(Ordering::SeqCst), 399);
    }

    #[tokio::test]
    async fn test_dispatch_without_handler_is_counted() {
        let slot = HandlerSlot::new();

        let outcome = slot.dispatch(Message::request(2, 7, Bytes::new())).await;
        assert!(matches!(outcome, DispatchOutcome::Discarded));
        assert_eq!(outcome.handler(), None);

        let stats = slot.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.dispatched, 0);
    }

    #[tokio::test]
    async fn test_dispatch_after_clear_is_discarded() {
        let slot = HandlerSlot::new();
        slot.set(noop_handler()).unwrap();
        slot.clear();

        assert!(matches!(
            slot.dispatch(note()).await,
            DispatchOutcome::Discarded
        ));
    }

    #[tokio::test]
    async fn test_handler_failure_is_reported() {
        let slot = HandlerSlot::new();
        slot.set(HandlerRef::from_raw(Some(|_m: &Message, _r: &mut Reply| -5))).unwrap();

        let outcome = slot.dispatch(note()).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed {
                error: ShotSyncError::Handler(_),
                ..
            }
        ));
        assert_eq!(slot.stats().handler_failures, 1);
    }

    #[tokio::test]
    async fn test_reply_status_is_passed_through() {
        let slot = HandlerSlot::new();
        slot.set(HandlerRef::from_fn(|_msg: Message| async {
            Ok(Reply::with_status(status::UNHANDLED, Bytes::new()))
        }))
        .unwrap();

        match slot.dispatch(note()).await {
            DispatchOutcome::Handled { reply, .. } => assert_eq!(reply.status, status::UNHANDLED),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_replace_compare_and_set() {
        let slot = HandlerSlot::new();
        let h1 = noop_handler();
        let id1 = h1.id();

        assert_eq!(slot.replace(None, h1).unwrap(), None);

        let h2 = noop_handler();
        let id2 = h2.id();
        assert_eq!(slot.replace(Some(id1), h2).unwrap(), Some(id1));

        let stale = slot.replace(Some(id1), noop_handler()).unwrap_err();
        match stale {
            ShotSyncError::RegistrationRace { expected, actual } => {
                assert_eq!(expected, Some(id1));
                assert_eq!(actual, Some(id2));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(slot.active_id(), Some(id2));

        assert!(matches!(
            slot.replace(None, noop_handler()),
            Err(ShotSyncError::RegistrationRace { .. })
        ));
    }

    #[test]
    fn test_replace_rejects_empty_handler() {
        let slot = HandlerSlot::new();
        assert!(matches!(
            slot.replace(None, HandlerRef::empty()),
            Err(ShotSyncError::InvalidHandler(_))
        ));
        assert!(!slot.is_set());
    }
}
