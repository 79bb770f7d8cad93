use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use quorum_gateway::auth::decode_identity;
use quorum_gateway::connection;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{ballots, chat, sessions, units};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/units", get(units::list_units).post(units::register_units))
        .route("/me/units", get(units::my_units))
        .route("/sessions", get(sessions::list_sessions).post(sessions::create_session))
        .route(
            "/sessions/{session_id}",
            get(sessions::get_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/sessions/{session_id}/ballots", post(ballots::cast_ballots))
        .route("/sessions/{session_id}/tally", get(sessions::get_tally))
        .route("/sessions/{session_id}/close", post(sessions::close_session))
        .route("/sessions/{session_id}/minutes", get(sessions::get_minutes))
        .route(
            "/sessions/{session_id}/chat",
            get(chat::chat_history).post(chat::send_chat),
        )
        .route("/receipts/{receipt_id}", get(ballots::get_receipt))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// With `?token=` the JWT is checked before upgrading; without it the
/// client must send IDENTIFY as its first command.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();

    match query.token {
        Some(token) => match decode_identity(&token, &state.jwt_secret) {
            Ok(identity) => ws.on_upgrade(move |socket| {
                connection::handle_connection_authenticated(socket, dispatcher, db, identity)
            }),
            Err(e) => {
                warn!("Gateway upgrade rejected: {}", e);
                StatusCode::UNAUTHORIZED.into_response()
            }
        },
        None => {
            let jwt_secret = state.jwt_secret.clone();
            ws.on_upgrade(move |socket| {
                connection::handle_connection(socket, dispatcher, db, jwt_secret)
            })
        }
    }
}
