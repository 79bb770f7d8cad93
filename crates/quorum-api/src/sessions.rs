use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use quorum_types::api::{
    CloseSessionResponse, CreateSessionRequest, SessionView, UpdateSessionRequest,
};
use quorum_types::events::ChannelEvent;
use quorum_types::models::{Identity, Minutes, Session, Tally};
use quorum_voting::state::{self, Capability};
use quorum_voting::tally::compute_tally;

use crate::error::ApiError;
use crate::state::AppState;

pub(crate) fn session_view(session: Session, now: DateTime<Utc>, identity: &Identity) -> SessionView {
    SessionView {
        effective_status: state::effective_status(&session, now),
        voting_eligible: state::is_voting_eligible(&session, now, identity.role),
        session,
    }
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<SessionView>>, ApiError> {
    let tenant_id = identity.tenant_id.clone();
    let sessions = state.blocking(move |db| db.list_sessions(&tenant_id)).await?;
    let now = Utc::now();
    Ok(Json(sessions.into_iter().map(|s| session_view(s, now, &identity)).collect()))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state::require_capability(identity.role, Capability::ManageSessions)?;

    let tenant_id = identity.tenant_id.clone();
    let created_by = identity.participant_id;
    let now = Utc::now();
    let session = state
        .blocking(move |db| db.create_session(&tenant_id, created_by, &req, now))
        .await?;

    Ok((StatusCode::CREATED, Json(session_view(session, now, &identity))))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<SessionView>, ApiError> {
    let tenant_id = identity.tenant_id.clone();
    let session = state.blocking(move |db| db.get_session(&tenant_id, session_id)).await?;
    Ok(Json(session_view(session, Utc::now(), &identity)))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state::require_capability(identity.role, Capability::ManageSessions)?;

    let tenant_id = identity.tenant_id.clone();
    let now = Utc::now();
    let session = state
        .blocking(move |db| db.update_session(&tenant_id, session_id, &req, now))
        .await?;
    Ok(Json(session_view(session, now, &identity)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    state::require_capability(identity.role, Capability::ManageSessions)?;

    let tenant_id = identity.tenant_id.clone();
    state.blocking(move |db| db.delete_session(&tenant_id, session_id)).await?;
    state.dispatcher.close_topic(session_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Live tally, recomputed from a consistent snapshot on every call.
pub async fn get_tally(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Tally>, ApiError> {
    let tenant_id = identity.tenant_id.clone();
    let snapshot = state
        .blocking(move |db| db.session_snapshot(&tenant_id, session_id))
        .await?;
    Ok(Json(compute_tally(
        &snapshot.session.options,
        &snapshot.ballots,
        &snapshot.units,
        state.weighting,
    )))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<CloseSessionResponse>, ApiError> {
    state::require_capability(identity.role, Capability::ManageSessions)?;

    let tenant_id = identity.tenant_id.clone();
    let weighting = state.weighting;
    let legal_basis = state.legal_basis.clone();
    let outcome = state
        .blocking(move |db| {
            db.close_session(&tenant_id, session_id, Utc::now(), weighting, &legal_basis)
        })
        .await?;

    if outcome.closed_now {
        info!("{} closed session {}", identity.participant_id, session_id);
        state.dispatcher.publish(ChannelEvent::StatusUpdate {
            session_id,
            status: outcome.session.status,
            closed_at: outcome.session.closed_at,
        });
    }

    Ok(Json(CloseSessionResponse {
        session_id,
        status: outcome.session.status,
        closed_now: outcome.closed_now,
        minutes: outcome.minutes,
    }))
}

pub async fn get_minutes(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Minutes>, ApiError> {
    let tenant_id = identity.tenant_id.clone();
    let minutes = state.blocking(move |db| db.get_minutes(&tenant_id, session_id)).await?;
    Ok(Json(minutes))
}
