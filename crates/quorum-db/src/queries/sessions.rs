use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use quorum_types::api::{CreateSessionRequest, UpdateSessionRequest};
use quorum_types::models::{
    Ballot, Minutes, Session, SessionStatus, VotingUnit, WeightingMode,
};
use quorum_voting::VotingError;
use quorum_voting::minutes::{generate_minutes, minutes_digest};
use quorum_voting::options::normalize_options;
use quorum_voting::state::{self, CloseAction};
use quorum_voting::tally::compute_tally;

use super::ballots::{count_ballots, query_ballots};
use super::minutes::{insert_minutes, query_minutes};
use super::units::query_tenant_units;
use crate::models::{SESSION_COLUMNS, session_from_row, to_db_time};
use crate::{Database, SqlResultExt};

/// Everything the tally needs, read from one snapshot.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    pub ballots: Vec<Ballot>,
    pub units: Vec<VotingUnit>,
}

#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub session: Session,
    pub minutes: Minutes,
    /// False when the session was already closed (idempotent retry).
    pub closed_now: bool,
}

impl Database {
    pub fn create_session(
        &self,
        tenant_id: &str,
        created_by: Uuid,
        req: &CreateSessionRequest,
        now: DateTime<Utc>,
    ) -> Result<Session, VotingError> {
        let title = state::validate_title(&req.title)?;
        state::validate_schedule(req.scheduled_start, req.scheduled_end)?;
        let options = normalize_options(&req.options)?;

        let session = Session {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            title,
            description: req.description.trim().to_string(),
            scheduled_start: req.scheduled_start,
            scheduled_end: req.scheduled_end,
            status: SessionStatus::Scheduled,
            privacy: req.privacy,
            options,
            live_stream_ref: req.live_stream_ref.clone(),
            attachment_ref: req.attachment_ref.clone(),
            created_by,
            created_at: now,
            closed_at: None,
        };

        let options_json = serde_json::to_string(&session.options)
            .map_err(|e| VotingError::Storage(e.into()))?;

        self.with_tx(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO sessions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    SESSION_COLUMNS
                ),
                rusqlite::params![
                    session.id.to_string(),
                    session.tenant_id,
                    session.title,
                    session.description,
                    to_db_time(session.scheduled_start),
                    to_db_time(session.scheduled_end),
                    session.status.as_str(),
                    session.privacy.as_str(),
                    options_json,
                    session.live_stream_ref,
                    session.attachment_ref,
                    session.created_by.to_string(),
                    to_db_time(session.created_at),
                    Option::<String>::None,
                ],
            )
            .storage()?;
            Ok(())
        })?;

        info!("Session {} '{}' created for tenant {}", session.id, session.title, tenant_id);
        Ok(session)
    }

    pub fn get_session(&self, tenant_id: &str, session_id: Uuid) -> Result<Session, VotingError> {
        self.with_conn(|conn| load_session(conn, tenant_id, session_id))
    }

    pub fn list_sessions(&self, tenant_id: &str) -> Result<Vec<Session>, VotingError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM sessions WHERE tenant_id = ?1 ORDER BY scheduled_start DESC",
                    SESSION_COLUMNS
                ))
                .storage()?;
            let rows = stmt
                .query_map([tenant_id], session_from_row)
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;
            Ok(rows)
        })
    }

    /// Edit metadata while the session is SCHEDULED and has no ballots.
    pub fn update_session(
        &self,
        tenant_id: &str,
        session_id: Uuid,
        req: &UpdateSessionRequest,
        now: DateTime<Utc>,
    ) -> Result<Session, VotingError> {
        self.with_tx(|tx| {
            let mut session = load_session(tx, tenant_id, session_id)?;
            persist_lazy_open(tx, &mut session, now)?;
            let ballots = count_ballots(tx, session_id)?;
            state::ensure_editable(&session, now, ballots)?;

            if let Some(title) = &req.title {
                session.title = state::validate_title(title)?;
            }
            if let Some(description) = &req.description {
                session.description = description.trim().to_string();
            }
            if let Some(start) = req.scheduled_start {
                session.scheduled_start = start;
            }
            if let Some(end) = req.scheduled_end {
                session.scheduled_end = end;
            }
            state::validate_schedule(session.scheduled_start, session.scheduled_end)?;
            if let Some(privacy) = req.privacy {
                session.privacy = privacy;
            }
            if let Some(options) = &req.options {
                session.options = normalize_options(options)?;
            }
            if let Some(live) = &req.live_stream_ref {
                session.live_stream_ref = Some(live.clone());
            }
            if let Some(attachment) = &req.attachment_ref {
                session.attachment_ref = Some(attachment.clone());
            }

            let options_json = serde_json::to_string(&session.options)
                .map_err(|e| VotingError::Storage(e.into()))?;
            tx.execute(
                "UPDATE sessions SET title = ?1, description = ?2, scheduled_start = ?3,
                     scheduled_end = ?4, privacy = ?5, options_json = ?6,
                     live_stream_ref = ?7, attachment_ref = ?8
                 WHERE id = ?9",
                rusqlite::params![
                    session.title,
                    session.description,
                    to_db_time(session.scheduled_start),
                    to_db_time(session.scheduled_end),
                    session.privacy.as_str(),
                    options_json,
                    session.live_stream_ref,
                    session.attachment_ref,
                    session_id.to_string(),
                ],
            )
            .storage()?;
            Ok(session)
        })
    }

    /// Hard delete in any state. Ballots, chat and minutes cascade.
    pub fn delete_session(&self, tenant_id: &str, session_id: Uuid) -> Result<(), VotingError> {
        let deleted = self.with_tx(|tx| {
            tx.execute(
                "DELETE FROM sessions WHERE id = ?1 AND tenant_id = ?2",
                rusqlite::params![session_id.to_string(), tenant_id],
            )
            .storage()
        })?;
        if deleted == 0 {
            return Err(VotingError::SessionNotFound(session_id));
        }
        info!("Session {} deleted", session_id);
        Ok(())
    }

    /// OPEN -> CLOSED, generating and storing the minutes in the same
    /// transaction. A retry on a CLOSED session returns the stored minutes.
    pub fn close_session(
        &self,
        tenant_id: &str,
        session_id: Uuid,
        now: DateTime<Utc>,
        weighting: WeightingMode,
        legal_basis: &str,
    ) -> Result<CloseOutcome, VotingError> {
        self.with_tx(|tx| {
            let mut session = load_session(tx, tenant_id, session_id)?;
            persist_lazy_open(tx, &mut session, now)?;

            match state::close_action(&session, now)? {
                CloseAction::ReturnExisting => {
                    let minutes = query_minutes(tx, session_id)?.ok_or_else(|| {
                        VotingError::Storage(anyhow::anyhow!(
                            "closed session {} has no minutes",
                            session_id
                        ))
                    })?;
                    Ok(CloseOutcome { session, minutes, closed_now: false })
                }
                CloseAction::Close => {
                    let updated = tx
                        .execute(
                            "UPDATE sessions SET status = 'CLOSED', closed_at = ?1
                             WHERE id = ?2 AND status = 'OPEN'",
                            rusqlite::params![to_db_time(now), session_id.to_string()],
                        )
                        .storage()?;
                    if updated == 0 {
                        return Err(VotingError::Storage(anyhow::anyhow!(
                            "session {} changed state during close",
                            session_id
                        )));
                    }
                    session.status = SessionStatus::Closed;
                    session.closed_at = Some(now);

                    let ballots = query_ballots(tx, session_id)?;
                    let units = query_tenant_units(tx, tenant_id)?;
                    let tally = compute_tally(&session.options, &ballots, &units, weighting);
                    let text = generate_minutes(&session, &ballots, &tally, legal_basis);
                    let minutes = Minutes {
                        session_id,
                        sha256: minutes_digest(&text),
                        text,
                        generated_at: now,
                    };
                    insert_minutes(tx, &minutes)?;

                    info!(
                        "Session {} closed: {} of {} units present, outcome {}",
                        session_id, tally.present_units, tally.total_units, tally.outcome
                    );
                    Ok(CloseOutcome { session, minutes, closed_now: true })
                }
            }
        })
    }

    pub fn session_snapshot(
        &self,
        tenant_id: &str,
        session_id: Uuid,
    ) -> Result<SessionSnapshot, VotingError> {
        self.with_read_tx(|tx| {
            let session = load_session(tx, tenant_id, session_id)?;
            let ballots = query_ballots(tx, session_id)?;
            let units = query_tenant_units(tx, tenant_id)?;
            Ok(SessionSnapshot { session, ballots, units })
        })
    }
}

pub(crate) fn load_session(
    conn: &Connection,
    tenant_id: &str,
    session_id: Uuid,
) -> Result<Session, VotingError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM sessions WHERE id = ?1 AND tenant_id = ?2",
            SESSION_COLUMNS
        ),
        rusqlite::params![session_id.to_string(), tenant_id],
        session_from_row,
    )
    .optional_row()?
    .ok_or(VotingError::SessionNotFound(session_id))
}

/// Persist the clock-driven SCHEDULED -> OPEN edge before a write.
pub(crate) fn persist_lazy_open(
    conn: &Connection,
    session: &mut Session,
    now: DateTime<Utc>,
) -> Result<(), VotingError> {
    if state::needs_lazy_open(session, now) {
        conn.execute(
            "UPDATE sessions SET status = 'OPEN' WHERE id = ?1 AND status = 'SCHEDULED'",
            [session.id.to_string()],
        )
        .storage()?;
        session.status = SessionStatus::Open;
        info!("Session {} opened", session.id);
    }
    Ok(())
}
