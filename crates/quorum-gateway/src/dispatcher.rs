use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use quorum_types::events::ChannelEvent;

/// An event on the bus, tagged with its session topic.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub session_id: Uuid,
    /// Connection that caused the event; it is not echoed back to it.
    pub origin: Option<Uuid>,
    pub event: ChannelEvent,
}

/// Fans session events out to every connection subscribed to the topic.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All connections receive every envelope and filter by topic.
    broadcast_tx: broadcast::Sender<Arc<Envelope>>,

    /// session_id -> connection ids currently viewing it
    viewers: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                viewers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish a session-scoped event to every subscriber of its topic.
    pub fn publish(&self, event: ChannelEvent) {
        self.send(None, event);
    }

    /// Publish on behalf of a connection; that connection is skipped.
    pub fn publish_from(&self, origin: Uuid, event: ChannelEvent) {
        self.send(Some(origin), event);
    }

    fn send(&self, origin: Option<Uuid>, event: ChannelEvent) {
        let Some(session_id) = event.session_id() else {
            warn!("Dropping unscoped event on the session bus: {:?}", event);
            return;
        };
        // No receivers is not an error: nobody is watching.
        let _ = self.inner.broadcast_tx.send(Arc::new(Envelope {
            session_id,
            origin,
            event,
        }));
    }

    /// Add a viewer to a session topic and announce the new count.
    pub async fn join(&self, session_id: Uuid, conn_id: Uuid) -> u32 {
        let viewers = {
            let mut map = self.inner.viewers.write().await;
            let set = map.entry(session_id).or_default();
            set.insert(conn_id);
            set.len() as u32
        };
        debug!("Connection {} joined session {} ({} viewers)", conn_id, session_id, viewers);
        self.publish(ChannelEvent::Presence { session_id, viewers });
        viewers
    }

    /// Remove a viewer. Unknown topics (e.g. deleted sessions) are ignored.
    pub async fn leave(&self, session_id: Uuid, conn_id: Uuid) {
        let viewers = {
            let mut map = self.inner.viewers.write().await;
            let Some(set) = map.get_mut(&session_id) else {
                return;
            };
            if !set.remove(&conn_id) {
                return;
            }
            let count = set.len() as u32;
            if count == 0 {
                map.remove(&session_id);
            }
            count
        };
        debug!("Connection {} left session {} ({} viewers)", conn_id, session_id, viewers);
        self.publish(ChannelEvent::Presence { session_id, viewers });
    }

    /// Drop a topic after its session was deleted and tell its viewers.
    pub async fn close_topic(&self, session_id: Uuid) {
        self.inner.viewers.write().await.remove(&session_id);
        self.publish(ChannelEvent::SessionDeleted { session_id });
    }

    pub async fn viewers(&self, session_id: Uuid) -> u32 {
        self.inner
            .viewers
            .read()
            .await
            .get(&session_id)
            .map_or(0, |set| set.len() as u32)
    }
}
