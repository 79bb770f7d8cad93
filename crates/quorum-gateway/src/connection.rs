use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use quorum_db::Database;
use quorum_types::events::{ChannelCommand, ChannelEvent};
use quorum_types::models::Identity;
use quorum_voting::VotingError;

use crate::auth::decode_identity;
use crate::dispatcher::{Dispatcher, Envelope};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// Handle a websocket whose token was already verified at the HTTP upgrade.
pub async fn handle_connection_authenticated(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    identity: Identity,
) {
    let (mut sender, receiver) = socket.split();

    info!(
        "{} ({}) connected to gateway (pre-authenticated)",
        identity.display_name, identity.participant_id
    );

    if !send_event(&mut sender, &ready(&identity)).await {
        return;
    }
    run_connection_loop(sender, receiver, dispatcher, db, identity).await;
}

/// Handle a websocket that must authenticate with an IDENTIFY command first.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some(identity) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", identity.display_name, identity.participant_id);

    if !send_event(&mut sender, &ready(&identity)).await {
        return;
    }
    run_connection_loop(sender, receiver, dispatcher, db, identity).await;
}

fn ready(identity: &Identity) -> ChannelEvent {
    ChannelEvent::Ready {
        participant_id: identity.participant_id,
        display_name: identity.display_name.clone(),
    }
}

/// Serialize and send one event. Returns false once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ChannelEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    identity: Identity,
) {
    let conn_id = Uuid::new_v4();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ChannelEvent>();
    let mut broadcast_rx = dispatcher.subscribe();

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward topic events + direct replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let Some(envelope) = topic_event(result) else { break };

                    if envelope.origin == Some(conn_id) {
                        continue;
                    }
                    {
                        let mut subs = send_subscriptions
                            .write()
                            .unwrap_or_else(PoisonError::into_inner);
                        if !subs.contains(&envelope.session_id) {
                            continue;
                        }
                        if matches!(envelope.event, ChannelEvent::SessionDeleted { .. }) {
                            subs.remove(&envelope.session_id);
                        }
                    }

                    if !send_event(&mut sender, &envelope.event).await {
                        break;
                    }
                }
                result = direct_rx.recv() => {
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client; one at a time so a sender's messages keep their order
    let peer = Peer {
        conn_id,
        identity: identity.clone(),
        dispatcher: dispatcher.clone(),
        db,
        subscriptions: subscriptions.clone(),
        direct_tx,
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChannelCommand>(&text) {
                    Ok(cmd) => peer.handle_command(cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            peer.identity.display_name,
                            peer.identity.participant_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        peer.reply(ChannelEvent::Error {
                            code: "BAD_COMMAND".into(),
                            message: e.to_string(),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let joined: Vec<Uuid> = subscriptions
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .copied()
        .collect();
    for session_id in joined {
        dispatcher.leave(session_id, conn_id).await;
    }
    info!(
        "{} ({}) disconnected from gateway",
        identity.display_name, identity.participant_id
    );
}

/// Unwrap a bus receive. A lagged connection has silently lost events, so it
/// is dropped; the client reconnects and refetches state over REST.
fn topic_event(
    result: Result<Arc<Envelope>, broadcast::error::RecvError>,
) -> Option<Arc<Envelope>> {
    match result {
        Ok(envelope) => Some(envelope),
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("Broadcast receiver lagged by {} messages, dropping connection", n);
            None
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Identity> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(ChannelCommand::Identify { token }) =
                    serde_json::from_str::<ChannelCommand>(&text)
                {
                    return decode_identity(&token, jwt_secret).ok();
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

/// Per-connection command handling state.
struct Peer {
    conn_id: Uuid,
    identity: Identity,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    subscriptions: Subscriptions,
    direct_tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl Peer {
    fn reply(&self, event: ChannelEvent) {
        let _ = self.direct_tx.send(event);
    }

    fn reject(&self, err: &VotingError) {
        if let VotingError::Storage(e) = err {
            error!("Gateway storage error for {}: {:#}", self.identity.participant_id, e);
        }
        self.reply(ChannelEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }

    fn is_subscribed(&self, session_id: Uuid) -> bool {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&session_id)
    }

    /// Run a blocking database call off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, VotingError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, VotingError> + Send + 'static,
    {
        let db = self.db.clone();
        match tokio::task::spawn_blocking(move || f(&db)).await {
            Ok(result) => result,
            Err(e) => Err(VotingError::Storage(e.into())),
        }
    }

    async fn handle_command(&self, cmd: ChannelCommand) {
        match cmd {
            ChannelCommand::Identify { .. } => {
                debug!("{} sent IDENTIFY on an authenticated connection", self.identity.participant_id);
            }

            ChannelCommand::Subscribe { session_id } => {
                let tenant_id = self.identity.tenant_id.clone();
                let found = self
                    .blocking(move |db| db.get_session(&tenant_id, session_id))
                    .await;
                if let Err(e) = found {
                    self.reject(&e);
                    return;
                }

                let newly_added = self
                    .subscriptions
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(session_id);
                self.reply(ChannelEvent::Subscribed { session_id });
                if newly_added {
                    info!(
                        "{} ({}) watching session {}",
                        self.identity.display_name, self.identity.participant_id, session_id
                    );
                    self.dispatcher.join(session_id, self.conn_id).await;
                }
            }

            ChannelCommand::Unsubscribe { session_id } => {
                let removed = self
                    .subscriptions
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&session_id);
                if removed {
                    self.dispatcher.leave(session_id, self.conn_id).await;
                }
                self.reply(ChannelEvent::Unsubscribed { session_id });
            }

            ChannelCommand::SendChat { session_id, content } => {
                if !self.is_subscribed(session_id) {
                    self.reply(ChannelEvent::Error {
                        code: "NOT_SUBSCRIBED".into(),
                        message: format!("subscribe to session {} before chatting", session_id),
                    });
                    return;
                }

                let identity = self.identity.clone();
                let appended = self
                    .blocking(move |db| db.append_chat(&identity, session_id, &content, Utc::now()))
                    .await;
                match appended {
                    Ok(message) => {
                        self.reply(ChannelEvent::Chat { message: message.clone() });
                        self.dispatcher
                            .publish_from(self.conn_id, ChannelEvent::Chat { message });
                    }
                    Err(e) => self.reject(&e),
                }
            }
        }
    }
}
