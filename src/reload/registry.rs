//! Live client registry and remote evaluation.
//!
//! Owns the set of open sockets (each reduced to an outbound queue) and the
//! table of evaluation requests waiting for a reply. Every pending id
//! resolves exactly once: with the client's result, or with `None` when the
//! client goes away first.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::Sender;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use super::bus::{self, ClientEvent, EventBus};
use super::message::{EvaluateRequest, HotMessage, Inbound};

/// Identifier of one accepted socket, unique per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct PendingEvaluation {
    client: ClientId,
    resolve: oneshot::Sender<Option<Value>>,
}

pub struct ClientRegistry {
    clients: Mutex<FxHashMap<ClientId, Sender<String>>>,
    pending: Mutex<FxHashMap<String, PendingEvaluation>>,
    next_client: AtomicU64,
    next_request: AtomicU64,
    bus: Arc<EventBus>,
}

impl ClientRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            clients: Mutex::new(FxHashMap::default()),
            pending: Mutex::new(FxHashMap::default()),
            next_client: AtomicU64::new(1),
            next_request: AtomicU64::new(1),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Add a client whose outbound messages go to `outbound`.
    ///
    /// Fires a `connect` event once the client is reachable.
    pub fn register(&self, outbound: Sender<String>) -> ClientId {
        let id = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        let total = {
            let mut clients = self.clients.lock();
            clients.insert(id, outbound);
            clients.len()
        };
        crate::debug!("ws"; "client {} connected (total: {})", id, total);

        self.bus.publish(ClientEvent {
            client: id,
            kind: bus::CONNECT.into(),
            payload: json!({ "type": bus::CONNECT }),
        });
        id
    }

    /// Remove a client and resolve each of its outstanding evaluations to `None`.
    pub fn disconnect(&self, id: ClientId) {
        let orphaned: Vec<_> = {
            let mut clients = self.clients.lock();
            if clients.remove(&id).is_none() {
                return;
            }
            let mut pending = self.pending.lock();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.client == id)
                .map(|(req, _)| req.clone())
                .collect();
            ids.into_iter().filter_map(|req| pending.remove(&req)).collect()
        };

        crate::debug!("ws"; "client {} disconnected ({} evaluations dropped)", id, orphaned.len());
        for entry in orphaned {
            let _ = entry.resolve.send(None);
        }

        self.bus.publish(ClientEvent {
            client: id,
            kind: bus::DISCONNECT.into(),
            payload: json!({ "type": bus::DISCONNECT }),
        });
    }

    /// Run `src` in one client and wait for its result.
    ///
    /// Resolves to `None` when the client is unknown or disconnects first.
    pub async fn evaluate(&self, client: ClientId, src: &str, args: Value) -> Option<Value> {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        let request = EvaluateRequest {
            id: id.clone(),
            src: src.to_string(),
            args,
        };

        // Registered under the clients lock so a concurrent disconnect
        // either sees this entry or rejects it up front.
        {
            let clients = self.clients.lock();
            let outbound = clients.get(&client)?;
            self.pending.lock().insert(
                id.clone(),
                PendingEvaluation {
                    client,
                    resolve: tx,
                },
            );
            if outbound.send(request.to_json()).is_err() {
                self.pending.lock().remove(&id);
                return None;
            }
        }

        rx.await.ok().flatten()
    }

    /// Route one text frame received from `client`.
    pub fn handle_inbound(&self, client: ClientId, text: &str) {
        match Inbound::parse(text) {
            Some(Inbound::Result { id, result }) => {
                let entry = self.pending.lock().remove(&id);
                match entry {
                    Some(entry) => {
                        let _ = entry.resolve.send(Some(result));
                    }
                    None => crate::debug!("ws"; "stale result {} from {}", id, client),
                }
            }
            Some(Inbound::Event { kind, payload }) => {
                self.bus.publish(ClientEvent {
                    client,
                    kind,
                    payload,
                });
            }
            None => crate::debug!("ws"; "ignoring malformed message from {}", client),
        }
    }

    /// Send a message to every open client.
    pub fn broadcast(&self, message: &HotMessage) -> usize {
        self.broadcast_raw(&message.to_json())
    }

    /// Send a plugin-defined JSON payload to every open client.
    pub fn broadcast_raw(&self, text: &str) -> usize {
        let clients = self.clients.lock();
        clients
            .values()
            .filter(|tx| tx.send(text.to_string()).is_ok())
            .count()
    }

    /// Ids of the open clients, oldest first.
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.clients.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluations still waiting for a reply.
    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}
