use rusqlite::Connection;
use uuid::Uuid;

use quorum_types::models::Minutes;
use quorum_voting::VotingError;

use super::sessions::load_session;
use crate::models::{minutes_from_row, to_db_time};
use crate::{Database, SqlResultExt};

impl Database {
    /// Stored minutes of a closed session.
    pub fn get_minutes(&self, tenant_id: &str, session_id: Uuid) -> Result<Minutes, VotingError> {
        self.with_conn(|conn| {
            load_session(conn, tenant_id, session_id)?;
            query_minutes(conn, session_id)?.ok_or(VotingError::MinutesNotAvailable)
        })
    }
}

pub(crate) fn query_minutes(
    conn: &Connection,
    session_id: Uuid,
) -> Result<Option<Minutes>, VotingError> {
    conn.query_row(
        "SELECT session_id, text, sha256, generated_at FROM minutes WHERE session_id = ?1",
        [session_id.to_string()],
        minutes_from_row,
    )
    .optional_row()
}

/// Minutes are written once, in the closing transaction.
pub(crate) fn insert_minutes(conn: &Connection, minutes: &Minutes) -> Result<(), VotingError> {
    conn.execute(
        "INSERT INTO minutes (session_id, text, sha256, generated_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            minutes.session_id.to_string(),
            minutes.text,
            minutes.sha256,
            to_db_time(minutes.generated_at),
        ],
    )
    .storage()?;
    Ok(())
}
