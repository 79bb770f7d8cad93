use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Fraction;
use crate::models::{Identity, Minutes, Privacy, Role, Session, SessionStatus};

// -- JWT Claims --

/// Claims issued by the identity collaborator. Shared by the REST middleware
/// and the websocket gateway; the signature is verified, the content trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub tenant_id: String,
    pub exp: usize,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            participant_id: self.sub,
            display_name: self.name.clone(),
            role: self.role,
            tenant_id: self.tenant_id.clone(),
        }
    }
}

// -- Units --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitRegistration {
    pub unit_id: String,
    pub owner_participant_id: Uuid,
    /// Parts per million of the condominium.
    pub fraction: Fraction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUnitsRequest {
    pub units: Vec<UnitRegistration>,
}

// -- Sessions --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionInput {
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub privacy: Privacy,
    pub options: Vec<OptionInput>,
    #[serde(default)]
    pub live_stream_ref: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

/// Partial edit; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub privacy: Option<Privacy>,
    #[serde(default)]
    pub options: Option<Vec<OptionInput>>,
    #[serde(default)]
    pub live_stream_ref: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub effective_status: SessionStatus,
    pub voting_eligible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    /// False when the session was already closed and the stored minutes are returned.
    pub closed_now: bool,
    pub minutes: Minutes,
}

// -- Ballots --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastBallotRequest {
    pub option_id: String,
    pub unit_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastReceipt {
    pub unit_id: String,
    pub receipt_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastBallotResponse {
    pub session_id: Uuid,
    pub option_id: String,
    pub receipts: Vec<CastReceipt>,
    /// Requested units that already had a ballot and were skipped.
    pub already_voted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptView {
    pub receipt_id: String,
    pub session_id: Uuid,
    pub unit_id: String,
    pub cast_at: DateTime<Utc>,
    /// Only disclosed for OPEN-privacy sessions.
    pub option_id: Option<String>,
}

// -- Chat --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendChatRequest {
    pub content: String,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
