//! Scoped realtime connection for one session view.
//!
//! A `SessionChannel` owns a background task that keeps a websocket open,
//! subscribed to a single session, and reconnects with exponential backoff
//! until the channel is left or dropped. Outgoing chat is only accepted
//! while connected.

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quorum_types::events::{ChannelCommand, ChannelEvent};

use crate::backoff::Backoff;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Socket open and subscribed to the session.
    Connected,
    /// Between attempts; a reconnect is scheduled.
    Disconnected,
    /// Left, dropped or the session was deleted. Terminal.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Event(ChannelEvent),
    /// Re-subscribed after a drop. Events may have been missed, so chat
    /// history and the tally should be refetched over REST.
    Resync,
}

pub struct SessionChannel {
    session_id: Uuid,
    state: watch::Receiver<ConnectionState>,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    updates: mpsc::UnboundedReceiver<ChannelUpdate>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SessionChannel {
    /// Start watching a session. Must be called inside a tokio runtime.
    pub fn join(gateway_url: impl Into<String>, token: impl AsRef<str>, session_id: Uuid) -> Self {
        let url = format!("{}?token={}", gateway_url.into(), token.as_ref());
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            Connection { url, session_id, state_tx, commands_rx, updates_tx },
            shutdown_rx,
        ));

        Self {
            session_id,
            state,
            commands,
            updates,
            shutdown: Some(shutdown),
            task,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Send a chat message to the session. Fails immediately when the
    /// channel is not connected.
    pub fn send_chat(&self, content: impl Into<String>) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::ChannelDisconnected);
        }
        self.commands
            .send(ChannelCommand::SendChat {
                session_id: self.session_id,
                content: content.into(),
            })
            .map_err(|_| ClientError::ChannelDisconnected)
    }

    /// Next event or resync marker. `None` once the channel is closed.
    pub async fn next_update(&mut self) -> Option<ChannelUpdate> {
        self.updates.recv().await
    }

    /// Close the socket and wait for the background task to finish.
    pub async fn leave(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Connection {
    url: String,
    session_id: Uuid,
    state_tx: watch::Sender<ConnectionState>,
    commands_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    updates_tx: mpsc::UnboundedSender<ChannelUpdate>,
}

/// Subscribe rejections that no retry can fix. Anything else, e.g. a
/// `STORAGE` fault, reconnects with backoff.
const TERMINAL_SUBSCRIBE_ERRORS: &[&str] = &["SESSION_NOT_FOUND", "FORBIDDEN"];

enum Exit {
    /// Stop for good.
    Stop,
    /// Socket lost; try again after the backoff delay.
    Reconnect,
}

async fn run(mut conn: Connection, mut shutdown: oneshot::Receiver<()>) {
    let mut backoff = Backoff::default();
    let mut subscribed_before = false;

    loop {
        conn.state_tx.send_replace(ConnectionState::Connecting);

        let exit = tokio::select! {
            _ = &mut shutdown => Exit::Stop,
            exit = conn.session(&mut backoff, &mut subscribed_before) => exit,
        };

        // Commands issued while the socket was going down are dropped, not replayed.
        while conn.commands_rx.try_recv().is_ok() {}

        if let Exit::Stop = exit {
            break;
        }

        conn.state_tx.send_replace(ConnectionState::Disconnected);
        let delay = backoff.next_delay();
        debug!("Reconnecting to session {} in {:?}", conn.session_id, delay);
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    conn.state_tx.send_replace(ConnectionState::Closed);
    info!("Left session {}", conn.session_id);
}

impl Connection {
    async fn session(&mut self, backoff: &mut Backoff, subscribed_before: &mut bool) -> Exit {
        let (ws, _) = match connect_async(self.url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Gateway connect failed: {}", e);
                return Exit::Reconnect;
            }
        };
        backoff.reset();

        let (mut sink, mut stream) = ws.split();
        let subscribe = ChannelCommand::Subscribe { session_id: self.session_id };
        if send_command(&mut sink, &subscribe).await.is_err() {
            return Exit::Reconnect;
        }

        let mut subscribed = false;
        loop {
            tokio::select! {
                cmd = self.commands_rx.recv() => {
                    let Some(cmd) = cmd else { return Exit::Stop };
                    if let Err(e) = send_command(&mut sink, &cmd).await {
                        warn!("Gateway send failed: {}", e);
                        return Exit::Reconnect;
                    }
                }
                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => return Exit::Reconnect,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Gateway read failed: {}", e);
                            return Exit::Reconnect;
                        }
                    };
                    let event = match serde_json::from_str::<ChannelEvent>(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Ignoring malformed gateway event: {}", e);
                            continue;
                        }
                    };
                    if let Some(exit) = self.on_event(event, &mut subscribed, subscribed_before) {
                        return exit;
                    }
                }
            }
        }
    }

    fn on_event(
        &mut self,
        event: ChannelEvent,
        subscribed: &mut bool,
        subscribed_before: &mut bool,
    ) -> Option<Exit> {
        match &event {
            ChannelEvent::Ready { .. } => return None,
            ChannelEvent::Subscribed { session_id } if *session_id == self.session_id => {
                *subscribed = true;
                self.state_tx.send_replace(ConnectionState::Connected);
                if *subscribed_before {
                    info!("Re-subscribed to session {}", self.session_id);
                    let _ = self.updates_tx.send(ChannelUpdate::Resync);
                }
                *subscribed_before = true;
                return None;
            }
            ChannelEvent::Error { code, message } if !*subscribed => {
                if TERMINAL_SUBSCRIBE_ERRORS.contains(&code.as_str()) {
                    warn!("Gateway refused session {}: {} {}", self.session_id, code, message);
                    let _ = self.updates_tx.send(ChannelUpdate::Event(event));
                    return Some(Exit::Stop);
                }
                warn!("Subscribe to session {} failed: {} {}", self.session_id, code, message);
                return Some(Exit::Reconnect);
            }
            ChannelEvent::Error { .. } => {}
            other if other.session_id() != Some(self.session_id) => return None,
            _ => {}
        }

        let deleted = matches!(event, ChannelEvent::SessionDeleted { .. });
        let _ = self.updates_tx.send(ChannelUpdate::Event(event));
        deleted.then_some(Exit::Stop)
    }
}

async fn send_command<S>(sink: &mut S, cmd: &ChannelCommand) -> Result<(), ClientError>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(cmd)?;
    sink.send(Message::text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    async fn wait_for(channel: &SessionChannel, wanted: ConnectionState) {
        let mut rx = channel.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached")
            .unwrap();
    }

    /// Accept one socket, confirm the subscription, push one event, hang up.
    async fn serve_once(listener: &TcpListener, session_id: Uuid, viewers: u32) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let first = ws.next().await.unwrap().unwrap();
        let cmd: ChannelCommand = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(cmd, ChannelCommand::Subscribe { session_id });

        for event in [
            ChannelEvent::Subscribed { session_id },
            ChannelEvent::Presence { session_id: Uuid::new_v4(), viewers: 99 },
            ChannelEvent::Presence { session_id, viewers },
        ] {
            let text = serde_json::to_string(&event).unwrap();
            ws.send(Message::text(text)).await.unwrap();
        }
        ws.close(None).await.ok();
    }

    #[tokio::test]
    async fn reconnects_and_asks_for_resync() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/gateway", listener.local_addr().unwrap());
        let session_id = Uuid::new_v4();

        let mut channel = SessionChannel::join(url, "token", session_id);
        serve_once(&listener, session_id, 1).await;
        assert_eq!(
            channel.next_update().await,
            Some(ChannelUpdate::Event(ChannelEvent::Presence { session_id, viewers: 1 }))
        );

        serve_once(&listener, session_id, 2).await;
        assert_eq!(channel.next_update().await, Some(ChannelUpdate::Resync));
        assert_eq!(
            channel.next_update().await,
            Some(ChannelUpdate::Event(ChannelEvent::Presence { session_id, viewers: 2 }))
        );

        channel.leave().await;
    }

    /// Accept one socket and answer its SUBSCRIBE with an error.
    async fn refuse_once(listener: &TcpListener, code: &str) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.next().await.unwrap().unwrap();
        let error = ChannelEvent::Error { code: code.into(), message: "refused".into() };
        ws.send(Message::text(serde_json::to_string(&error).unwrap())).await.unwrap();
        ws.close(None).await.ok();
    }

    #[tokio::test]
    async fn storage_error_on_subscribe_is_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/gateway", listener.local_addr().unwrap());
        let session_id = Uuid::new_v4();

        let mut channel = SessionChannel::join(url, "token", session_id);
        refuse_once(&listener, "STORAGE").await;
        wait_for(&channel, ConnectionState::Disconnected).await;

        serve_once(&listener, session_id, 1).await;
        assert_eq!(
            channel.next_update().await,
            Some(ChannelUpdate::Event(ChannelEvent::Presence { session_id, viewers: 1 }))
        );

        channel.leave().await;
    }

    #[tokio::test]
    async fn unknown_session_stops_the_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/gateway", listener.local_addr().unwrap());

        let mut channel = SessionChannel::join(url, "token", Uuid::new_v4());
        refuse_once(&listener, "SESSION_NOT_FOUND").await;

        assert!(matches!(
            channel.next_update().await,
            Some(ChannelUpdate::Event(ChannelEvent::Error { code, .. })) if code == "SESSION_NOT_FOUND"
        ));
        wait_for(&channel, ConnectionState::Closed).await;
        assert_eq!(channel.next_update().await, None);
    }

    #[tokio::test]
    async fn chat_fails_fast_while_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/gateway", listener.local_addr().unwrap());
        drop(listener);

        let channel = SessionChannel::join(url, "token", Uuid::new_v4());
        wait_for(&channel, ConnectionState::Disconnected).await;
        assert!(matches!(channel.send_chat("oi"), Err(ClientError::ChannelDisconnected)));

        let state = channel.watch_state();
        channel.leave().await;
        assert_eq!(*state.borrow(), ConnectionState::Closed);
    }
}
