// =============================================================================
// Fan-out hub — subscriber registry and typed envelope delivery
// =============================================================================
//
// Engines publish (topic, symbol, payload); the hub fans out to every client
// whose subscription covers the pair. Delivery is best-effort: each client
// owns a bounded queue that drops its oldest entry on overflow, so one slow
// dashboard can never stall the pipeline. A heartbeat round every 5 seconds
// re-sends the last snapshot per subscribed symbol, which makes late joiners
// immediately usable.
// =============================================================================

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::debug;

use crate::session::ist_now;
use crate::types::Symbol;

/// Per-client queue depth before drop-oldest.
const CLIENT_QUEUE: usize = 256;

/// Subscribable topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Tick,
    Snapshot,
    Outlook,
    Decision,
    OiMomentum,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Tick,
        Topic::Snapshot,
        Topic::Outlook,
        Topic::Decision,
        Topic::OiMomentum,
    ];
}

/// Wire envelope types. Topics map 1:1 except the OI update, which carries a
/// distinct wire name, plus the heartbeat which is not subscribable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Tick,
    Snapshot,
    Outlook,
    Decision,
    OiMomentumUpdate,
    Heartbeat,
}

impl From<Topic> for EnvelopeKind {
    fn from(topic: Topic) -> Self {
        match topic {
            Topic::Tick => Self::Tick,
            Topic::Snapshot => Self::Snapshot,
            Topic::Outlook => Self::Outlook,
            Topic::Decision => Self::Decision,
            Topic::OiMomentum => Self::OiMomentumUpdate,
        }
    }
}

/// One outbound message.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    pub data: Value,
    pub ts: i64,
}

/// What one client wants to hear about.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub symbols: HashSet<Symbol>,
    pub topics: HashSet<Topic>,
}

impl Subscription {
    /// The default on connect: everything.
    pub fn all() -> Self {
        Self {
            symbols: Symbol::ALL.into_iter().collect(),
            topics: Topic::ALL.into_iter().collect(),
        }
    }

    pub fn matches(&self, topic: Topic, symbol: Symbol) -> bool {
        self.topics.contains(&topic) && self.symbols.contains(&symbol)
    }

    pub fn subscribe(&mut self, topics: &[Topic], symbols: &[Symbol]) {
        self.topics.extend(topics.iter().copied());
        self.symbols.extend(symbols.iter().copied());
    }

    pub fn unsubscribe(&mut self, topics: &[Topic], symbols: &[Symbol]) {
        for t in topics {
            self.topics.remove(t);
        }
        for s in symbols {
            self.symbols.remove(s);
        }
    }
}

/// Hub-side handle for one connected client.
pub struct ClientHandle {
    pub id: u64,
    queue: Mutex<VecDeque<Envelope>>,
    notify: Notify,
    subscription: RwLock<Subscription>,
    dropped: AtomicU64,
}

impl ClientHandle {
    fn push(&self, envelope: Envelope) {
        let mut queue = self.queue.lock();
        queue.push_back(envelope);
        if queue.len() > CLIENT_QUEUE {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        drop(queue);
        self.notify.notify_one();
    }

    /// Await and drain the pending envelopes, oldest first.
    pub async fn next_batch(&self) -> Vec<Envelope> {
        loop {
            {
                let mut queue = self.queue.lock();
                if !queue.is_empty() {
                    return queue.drain(..).collect();
                }
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking drain, used by tests to inspect delivery.
    #[cfg(test)]
    pub fn try_drain(&self) -> Vec<Envelope> {
        self.queue.lock().drain(..).collect()
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription.read().clone()
    }

    pub fn update_subscription(&self, f: impl FnOnce(&mut Subscription)) {
        f(&mut self.subscription.write());
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The registry.
pub struct FanoutHub {
    clients: RwLock<HashMap<u64, Arc<ClientHandle>>>,
    next_id: AtomicU64,
    last_snapshot: RwLock<HashMap<Symbol, Value>>,
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            last_snapshot: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self) -> Arc<ClientHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(ClientHandle {
            id,
            queue: Mutex::new(VecDeque::with_capacity(64)),
            notify: Notify::new(),
            subscription: RwLock::new(Subscription::all()),
            dropped: AtomicU64::new(0),
        });
        self.clients.write().insert(id, client.clone());
        debug!(client = id, "hub client registered");
        client
    }

    pub fn unregister(&self, id: u64) {
        self.clients.write().remove(&id);
        debug!(client = id, "hub client unregistered");
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Publish one payload to every matching subscriber.
    pub fn publish(&self, topic: Topic, symbol: Symbol, data: Value) {
        let ts = ist_now().timestamp_millis();
        if topic == Topic::Snapshot {
            self.last_snapshot.write().insert(symbol, data.clone());
        }
        let envelope = Envelope {
            kind: topic.into(),
            symbol: Some(symbol),
            data,
            ts,
        };
        for client in self.clients.read().values() {
            if client.subscription.read().matches(topic, symbol) {
                client.push(envelope.clone());
            }
        }
    }

    /// The last snapshot published for a symbol, if any.
    pub fn last_snapshot(&self, symbol: Symbol) -> Option<Value> {
        self.last_snapshot.read().get(&symbol).cloned()
    }

    /// Drop all retained snapshots (force-reconnect path).
    pub fn clear_snapshots(&self) {
        self.last_snapshot.write().clear();
    }

    /// One heartbeat round: every client gets the last snapshot per
    /// subscribed symbol. Run by a 5-second ticker.
    ///
    /// `is_live` is stamped over the retained snapshot so a stale feed is
    /// flagged instead of silently re-serving old numbers as fresh.
    pub fn heartbeat_round(&self, is_live: bool) {
        let ts = ist_now().timestamp_millis();
        let snapshots = self.last_snapshot.read().clone();
        for client in self.clients.read().values() {
            let sub = client.subscription.read().clone();
            for symbol in &sub.symbols {
                let mut data = snapshots.get(symbol).cloned().unwrap_or(Value::Null);
                if let Some(obj) = data.as_object_mut() {
                    obj.insert("is_live".to_string(), Value::Bool(is_live));
                }
                client.push(Envelope {
                    kind: EnvelopeKind::Heartbeat,
                    symbol: Some(*symbol),
                    data,
                    ts,
                });
            }
        }
    }
}
