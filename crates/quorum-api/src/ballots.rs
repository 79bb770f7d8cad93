use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use quorum_types::api::{CastBallotRequest, CastBallotResponse, ReceiptView};
use quorum_types::events::ChannelEvent;
use quorum_types::models::{Identity, Privacy};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn cast_ballots(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CastBallotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caster = identity.clone();
    let option_id = req.option_id.clone();
    let outcome = state
        .blocking(move |db| {
            db.cast_ballots(&caster, session_id, &req.option_id, &req.unit_ids, Utc::now())
        })
        .await?;

    // Invalidation only: subscribers refetch the tally over REST.
    state.dispatcher.publish(ChannelEvent::TallyChanged {
        session_id,
        present_units: outcome.present_units,
        weighted_fraction: outcome.weighted_fraction,
    });

    Ok((
        StatusCode::CREATED,
        Json(CastBallotResponse {
            session_id,
            option_id,
            receipts: outcome.receipts,
            already_voted: outcome.already_voted,
        }),
    ))
}

/// Confirms that a receipt was recorded. The option is disclosed only for
/// OPEN-privacy sessions.
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(receipt_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ReceiptView>, ApiError> {
    let tenant_id = identity.tenant_id.clone();
    let (ballot, privacy) = state
        .blocking(move |db| db.find_receipt(&tenant_id, &receipt_id))
        .await?;

    Ok(Json(ReceiptView {
        receipt_id: ballot.receipt_id,
        session_id: ballot.session_id,
        unit_id: ballot.unit_id,
        cast_at: ballot.cast_at,
        option_id: match privacy {
            Privacy::Open => Some(ballot.option_id),
            Privacy::Secret => None,
        },
    }))
}
