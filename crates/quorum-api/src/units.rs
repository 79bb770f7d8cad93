use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use quorum_types::api::RegisterUnitsRequest;
use quorum_types::models::{Identity, VotingUnit};
use quorum_voting::state::{self, Capability};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_units(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<VotingUnit>>, ApiError> {
    state::require_capability(identity.role, Capability::ManageSessions)?;
    let tenant_id = identity.tenant_id.clone();
    let units = state.blocking(move |db| db.tenant_units(&tenant_id)).await?;
    Ok(Json(units))
}

pub async fn register_units(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<RegisterUnitsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state::require_capability(identity.role, Capability::ManageSessions)?;
    let tenant_id = identity.tenant_id.clone();
    let count = req.units.len();
    let units = state
        .blocking(move |db| db.register_units(&tenant_id, &req.units))
        .await?;
    info!("{} registered {} unit(s) in {}", identity.participant_id, count, identity.tenant_id);
    Ok((StatusCode::CREATED, Json(units)))
}

/// Units the caller may vote with, ordered by unit id.
pub async fn my_units(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<VotingUnit>>, ApiError> {
    let tenant_id = identity.tenant_id.clone();
    let participant_id = identity.participant_id;
    let units = state
        .blocking(move |db| db.resolve_units(&tenant_id, participant_id))
        .await?;
    Ok(Json(units))
}
