use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use quorum_types::models::{ChatMessage, Identity};
use quorum_voting::VotingError;
use quorum_voting::chat::normalize_chat_content;
use quorum_voting::state;

use super::sessions::load_session;
use crate::models::{CHAT_COLUMNS, chat_from_row, to_db_time};
use crate::{Database, SqlResultExt};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 200;

impl Database {
    /// Persist a chat message. The room accepts messages until the session
    /// is closed; order is the insertion order of this call.
    pub fn append_chat(
        &self,
        identity: &Identity,
        session_id: Uuid,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, VotingError> {
        let content = normalize_chat_content(content)?;

        self.with_tx(|tx| {
            let session = load_session(tx, &identity.tenant_id, session_id)?;
            state::ensure_chat_open(&session)?;

            let message = ChatMessage {
                id: Uuid::new_v4(),
                session_id,
                sender_participant_id: identity.participant_id,
                sender_display_name: identity.display_name.clone(),
                content,
                sent_at: now,
            };
            tx.execute(
                "INSERT INTO chat_messages (id, session_id, sender_participant_id, sender_display_name, content, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id.to_string(),
                    message.session_id.to_string(),
                    message.sender_participant_id.to_string(),
                    message.sender_display_name,
                    message.content,
                    to_db_time(message.sent_at),
                ],
            )
            .storage()?;

            debug!("Chat message {} in session {}", message.id, session_id);
            Ok(message)
        })
    }

    /// Most recent `limit` messages (optionally older than `before`),
    /// returned oldest first.
    pub fn chat_history(
        &self,
        tenant_id: &str,
        session_id: Uuid,
        limit: u32,
        before: Option<Uuid>,
    ) -> Result<Vec<ChatMessage>, VotingError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        self.with_conn(|conn| {
            load_session(conn, tenant_id, session_id)?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM chat_messages
                     WHERE session_id = ?1
                       AND (?2 IS NULL OR seq < (SELECT seq FROM chat_messages WHERE id = ?2))
                     ORDER BY seq DESC
                     LIMIT ?3",
                    CHAT_COLUMNS
                ))
                .storage()?;
            let mut rows = stmt
                .query_map(
                    rusqlite::params![
                        session_id.to_string(),
                        before.map(|id| id.to_string()),
                        limit,
                    ],
                    chat_from_row,
                )
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;
            rows.reverse();
            Ok(rows)
        })
    }
}
