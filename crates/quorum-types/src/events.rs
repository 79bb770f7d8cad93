use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Fraction;
use crate::models::{ChatMessage, SessionStatus};

/// Events sent over the realtime gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelEvent {
    /// Server confirms successful authentication
    Ready { participant_id: Uuid, display_name: String },

    /// The connection now receives events for this session
    Subscribed { session_id: Uuid },

    Unsubscribed { session_id: Uuid },

    /// A chat message was appended to the session log
    Chat { message: ChatMessage },

    /// The session changed state (closing is the only pushed transition)
    StatusUpdate {
        session_id: Uuid,
        status: SessionStatus,
        closed_at: Option<DateTime<Utc>>,
    },

    /// Ballots were recorded; clients should refetch the tally
    TallyChanged {
        session_id: Uuid,
        present_units: u32,
        weighted_fraction: Fraction,
    },

    /// Number of connections currently viewing the session
    Presence { session_id: Uuid, viewers: u32 },

    SessionDeleted { session_id: Uuid },

    /// A command from this connection was rejected
    Error { code: String, message: String },
}

impl ChannelEvent {
    /// Returns the session topic this event belongs to.
    /// Events that return `None` are only ever sent directly to one connection.
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::Chat { message } => Some(message.session_id),
            Self::StatusUpdate { session_id, .. } => Some(*session_id),
            Self::TallyChanged { session_id, .. } => Some(*session_id),
            Self::Presence { session_id, .. } => Some(*session_id),
            Self::SessionDeleted { session_id } => Some(*session_id),
            Self::Subscribed { session_id } => Some(*session_id),
            Self::Unsubscribed { session_id } => Some(*session_id),
            Self::Ready { .. } | Self::Error { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over the websocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelCommand {
    /// Authenticate the connection when the upgrade request carried no token
    Identify { token: String },

    /// Start receiving events for a session
    Subscribe { session_id: Uuid },

    Unsubscribe { session_id: Uuid },

    /// Append a chat message to a subscribed session
    SendChat { session_id: Uuid, content: String },
}
