use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use quorum_types::api::ErrorBody;
use quorum_voting::VotingError;

/// Domain error carried out of a handler and rendered as `{error, message}`.
#[derive(Debug)]
pub struct ApiError(pub VotingError);

impl From<VotingError> for ApiError {
    fn from(err: VotingError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            VotingError::NotEligible | VotingError::Forbidden | VotingError::NoUnits => {
                StatusCode::FORBIDDEN
            }
            VotingError::AlreadyVoted
            | VotingError::SessionNotOpen
            | VotingError::SessionLocked
            | VotingError::SessionClosed
            | VotingError::UnitExists(_) => StatusCode::CONFLICT,
            VotingError::InvalidOption(_)
            | VotingError::InvalidUnit(_)
            | VotingError::NoUnitsSelected
            | VotingError::InvalidSession(_)
            | VotingError::InvalidMessage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            VotingError::SessionNotFound(_)
            | VotingError::ReceiptNotFound
            | VotingError::MinutesNotAvailable => StatusCode::NOT_FOUND,
            VotingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            VotingError::Storage(e) => {
                error!("Storage failure: {:#}", e);
                // Internals stay in the log.
                "internal storage error".to_string()
            }
            err if status == StatusCode::UNPROCESSABLE_ENTITY => {
                warn!("Rejected request: {}", err);
                err.to_string()
            }
            err => err.to_string(),
        };

        let body = ErrorBody {
            error: self.0.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
