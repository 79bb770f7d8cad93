//! Session lifecycle: SCHEDULED -> OPEN -> CLOSED.
//!
//! OPEN is reached by the clock (`now >= scheduled_start`) and is observed
//! lazily; CLOSED is reached only through an explicit close and is terminal.
//! Reaching `scheduled_end` never closes a session.

use chrono::{DateTime, Utc};

use quorum_types::models::{Role, Session, SessionStatus};

use crate::VotingError;

/// Privileges checked explicitly instead of comparing roles inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Create, edit, close and delete sessions; register units.
    ManageSessions,
    /// Cast ballots while the session is still SCHEDULED (preview/testing).
    VoteBeforeStart,
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    match (role, capability) {
        (Role::Manager, Capability::ManageSessions) => true,
        (Role::Manager, Capability::VoteBeforeStart) => true,
        (Role::Resident, _) => false,
    }
}

pub fn require_capability(role: Role, capability: Capability) -> Result<(), VotingError> {
    if has_capability(role, capability) {
        Ok(())
    } else {
        Err(VotingError::Forbidden)
    }
}

/// Status as observed at `now`.
pub fn effective_status(session: &Session, now: DateTime<Utc>) -> SessionStatus {
    match session.status {
        SessionStatus::Closed => SessionStatus::Closed,
        SessionStatus::Open => SessionStatus::Open,
        SessionStatus::Scheduled if now >= session.scheduled_start => SessionStatus::Open,
        SessionStatus::Scheduled => SessionStatus::Scheduled,
    }
}

/// True when the stored status lags the clock and should be persisted as OPEN.
pub fn needs_lazy_open(session: &Session, now: DateTime<Utc>) -> bool {
    session.status == SessionStatus::Scheduled
        && effective_status(session, now) == SessionStatus::Open
}

pub fn is_voting_eligible(session: &Session, now: DateTime<Utc>, role: Role) -> bool {
    match effective_status(session, now) {
        SessionStatus::Open => true,
        SessionStatus::Scheduled => has_capability(role, Capability::VoteBeforeStart),
        SessionStatus::Closed => false,
    }
}

pub fn ensure_voting_eligible(
    session: &Session,
    now: DateTime<Utc>,
    role: Role,
) -> Result<(), VotingError> {
    if is_voting_eligible(session, now, role) {
        Ok(())
    } else {
        Err(VotingError::NotEligible)
    }
}

/// Title, schedule and options may change only before opening and before
/// any ballot exists (manager preview ballots lock the session too).
pub fn ensure_editable(
    session: &Session,
    now: DateTime<Utc>,
    ballot_count: u32,
) -> Result<(), VotingError> {
    if effective_status(session, now) != SessionStatus::Scheduled || ballot_count > 0 {
        return Err(VotingError::SessionLocked);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Transition OPEN -> CLOSED and generate minutes.
    Close,
    /// Already CLOSED; return the stored minutes.
    ReturnExisting,
}

pub fn close_action(session: &Session, now: DateTime<Utc>) -> Result<CloseAction, VotingError> {
    match effective_status(session, now) {
        SessionStatus::Open => Ok(CloseAction::Close),
        SessionStatus::Closed => Ok(CloseAction::ReturnExisting),
        SessionStatus::Scheduled => Err(VotingError::SessionNotOpen),
    }
}

/// The room accepts chat until it is closed.
pub fn ensure_chat_open(session: &Session) -> Result<(), VotingError> {
    if session.status == SessionStatus::Closed {
        return Err(VotingError::SessionClosed);
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<String, VotingError> {
    let title = title.trim();
    if title.is_empty() || title.len() > 200 {
        return Err(VotingError::InvalidSession("title must be 1-200 bytes".into()));
    }
    Ok(title.to_string())
}

pub fn validate_schedule(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), VotingError> {
    if end < start {
        return Err(VotingError::InvalidSession(
            "scheduled_end precedes scheduled_start".into(),
        ));
    }
    Ok(())
}
