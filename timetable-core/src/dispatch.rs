//! Handler dispatch - one handler per message type.
//!
//! `register(handler)` auto-wires routing from the handler's declared type.
//! Registration is last-wins and happens only during startup; dispatch reads
//! the registry concurrently afterwards.

use crate::system::SystemHandle;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use timetable_protocol::MessageType;
use tracing::{error, warn};

/// The one trait every message handler implements.
///
/// `handle` receives the complete reassembled payload and the facade handle
/// used to send correlated replies. A returned `Err` is logged by the
/// dispatcher; it never tears the server down.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The message type this handler is bound to.
    fn handled_type(&self) -> MessageType;

    async fn handle(
        &self,
        message_id: &str,
        payload: &str,
        system: Arc<SystemHandle>,
    ) -> Result<(), String>;
}

pub struct HandlerRegistry {
    handlers: DashMap<MessageType, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: DashMap::new() }
    }

    /// Register a handler for its declared type, replacing any previous
    /// binding (last wins).
    pub fn register(&self, handler: Arc<dyn MessageHandler>) {
        let message_type = handler.handled_type();
        if self.handlers.insert(message_type, handler).is_some() {
            warn!("replacing existing handler for {message_type:?}");
        }
    }

    /// Route a complete message. Returns `false` when no handler is bound or
    /// the handler failed; both cases are logged.
    pub async fn dispatch(
        &self,
        message_id: &str,
        payload: &str,
        message_type: MessageType,
        system: &Arc<SystemHandle>,
    ) -> bool {
        let Some(handler) = self.handlers.get(&message_type).map(|h| Arc::clone(h.value())) else {
            warn!("no handler registered for {message_type:?} (message {message_id})");
            return false;
        };

        match handler.handle(message_id, payload, Arc::clone(system)).await {
            Ok(()) => true,
            Err(e) => {
                error!("handler for {message_type:?} failed on message {message_id}: {e}");
                false
            }
        }
    }

    pub fn registered_types(&self) -> Vec<MessageType> {
        self.handlers.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
