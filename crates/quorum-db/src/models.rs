//! Row mapping between SQLite columns and the `quorum-types` models.
//!
//! Ids are stored as TEXT, timestamps as RFC 3339 with microseconds and a
//! `Z` suffix so lexical order matches time order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use quorum_types::Fraction;
use quorum_types::models::{Ballot, ChatMessage, Minutes, Session, VoteOption, VotingUnit};

pub(crate) const SESSION_COLUMNS: &str = "id, tenant_id, title, description, scheduled_start, \
     scheduled_end, status, privacy, options_json, live_stream_ref, attachment_ref, \
     created_by, created_at, closed_at";

pub(crate) const BALLOT_COLUMNS: &str =
    "session_id, unit_id, option_id, cast_by, cast_at, receipt_id";

pub(crate) const UNIT_COLUMNS: &str = "unit_id, tenant_id, owner_participant_id, fraction_ppm";

pub(crate) const CHAT_COLUMNS: &str =
    "id, session_id, sender_participant_id, sender_display_name, content, sent_at";

pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_time_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

pub(crate) fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    let status: String = row.get(6)?;
    let privacy: String = row.get(7)?;
    let options_json: String = row.get(8)?;
    let options: Vec<VoteOption> =
        serde_json::from_str(&options_json).map_err(|e| conversion_error(8, e))?;

    Ok(Session {
        id: uuid_col(row, 0)?,
        tenant_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        scheduled_start: time_col(row, 4)?,
        scheduled_end: time_col(row, 5)?,
        status: status.parse().map_err(|e: String| conversion_error(6, e))?,
        privacy: privacy.parse().map_err(|e: String| conversion_error(7, e))?,
        options,
        live_stream_ref: row.get(9)?,
        attachment_ref: row.get(10)?,
        created_by: uuid_col(row, 11)?,
        created_at: time_col(row, 12)?,
        closed_at: opt_time_col(row, 13)?,
    })
}

pub(crate) fn ballot_from_row(row: &Row) -> rusqlite::Result<Ballot> {
    Ok(Ballot {
        session_id: uuid_col(row, 0)?,
        unit_id: row.get(1)?,
        option_id: row.get(2)?,
        cast_by: uuid_col(row, 3)?,
        cast_at: time_col(row, 4)?,
        receipt_id: row.get(5)?,
    })
}

pub(crate) fn unit_from_row(row: &Row) -> rusqlite::Result<VotingUnit> {
    let ppm: i64 = row.get(3)?;
    Ok(VotingUnit {
        unit_id: row.get(0)?,
        tenant_id: row.get(1)?,
        owner_participant_id: uuid_col(row, 2)?,
        fraction: Fraction::from_ppm(ppm.max(0) as u64),
    })
}

pub(crate) fn chat_from_row(row: &Row) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: uuid_col(row, 0)?,
        session_id: uuid_col(row, 1)?,
        sender_participant_id: uuid_col(row, 2)?,
        sender_display_name: row.get(3)?,
        content: row.get(4)?,
        sent_at: time_col(row, 5)?,
    })
}

pub(crate) fn minutes_from_row(row: &Row) -> rusqlite::Result<Minutes> {
    Ok(Minutes {
        session_id: uuid_col(row, 0)?,
        text: row.get(1)?,
        sha256: row.get(2)?,
        generated_at: time_col(row, 3)?,
    })
}
