//! Process-wide client context.
//!
//! Embedders that only ever run one client per process can register their
//! handler here without threading a [`HandlerSlot`] around. A client joins
//! this context with `ClientBuilder::handler_slot(client_context())`.

use std::sync::{Arc, OnceLock};

use crate::error::Result;
use crate::handler::{DispatchOutcome, HandlerId, HandlerRef, HandlerSlot, Message};

static CLIENT_CONTEXT: OnceLock<Arc<HandlerSlot>> = OnceLock::new();

/// The shared slot, created on first use.
pub fn client_context() -> Arc<HandlerSlot> {
    CLIENT_CONTEXT
        .get_or_init(|| Arc::new(HandlerSlot::new()))
        .clone()
}

/// Register the process-wide message handler.
///
/// Supersedes any earlier registration; the old handler is released once
/// dispatches already using it have returned. An empty handler fails with
/// [`crate::ShotSyncError::InvalidHandler`] and changes nothing.
pub fn client_set_message_handler(handler: HandlerRef) -> Result<()> {
    client_context().set(handler).map(|_| ())
}

/// Id of the active process-wide handler.
pub fn client_message_handler() -> Option<HandlerId> {
    client_context().active_id()
}

/// Remove the process-wide handler.
pub fn client_clear_message_handler() -> Option<HandlerId> {
    client_context().clear()
}

/// Dispatch a message to the process-wide handler.
pub async fn client_dispatch(message: Message) -> DispatchOutcome {
    client_context().dispatch(message).await
}
