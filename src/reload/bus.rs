//! Event bus for inbound client messages.
//!
//! Subscribers register for one message type and receive every matching
//! event on an unbounded channel, tagged with the sending client. Closed
//! subscribers are dropped on the next publish.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use super::ClientId;

/// Event type fired when a socket is accepted.
pub const CONNECT: &str = "connect";

/// Event type fired when a socket closes.
pub const DISCONNECT: &str = "disconnect";

/// One inbound message (or lifecycle event) from a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    pub client: ClientId,
    pub kind: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<FxHashMap<String, Vec<mpsc::UnboundedSender<ClientEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every future event of type `kind`.
    pub fn subscribe(&self, kind: &str) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(kind.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver an event to the subscribers of its type. Returns the number reached.
    pub fn publish(&self, event: ClientEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(list) = subscribers.get_mut(&event.kind) else {
            return 0;
        };
        list.retain(|tx| tx.send(event.clone()).is_ok());
        list.len()
    }
}
