use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Fraction;

/// Role supplied by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Resident,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled,
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(Self::Scheduled),
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OPEN sessions publish who voted for what; SECRET sessions never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privacy {
    Open,
    Secret,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Secret => "SECRET",
        }
    }
}

impl FromStr for Privacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "SECRET" => Ok(Self::Secret),
            other => Err(format!("unknown privacy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingUnit {
    pub unit_id: String,
    pub tenant_id: String,
    pub owner_participant_id: Uuid,
    pub fraction: Fraction,
}

/// An assembly. `status` is the stored status; the SCHEDULED -> OPEN edge is
/// derived from the clock when the session is observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: String,
    pub title: String,
    pub description: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: SessionStatus,
    pub privacy: Privacy,
    pub options: Vec<VoteOption>,
    pub live_stream_ref: Option<String>,
    pub attachment_ref: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub session_id: Uuid,
    pub unit_id: String,
    pub option_id: String,
    pub cast_by: Uuid,
    pub cast_at: DateTime<Utc>,
    pub receipt_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_participant_id: Uuid,
    pub sender_display_name: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minutes {
    pub session_id: Uuid,
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub sha256: String,
    pub generated_at: DateTime<Utc>,
}

/// How a ballot contributes to its option's fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMode {
    /// Each ballot carries the fraction of the unit it was cast for.
    #[default]
    PerUnit,
    /// Each ballot carries the caster's aggregate fraction over every unit
    /// they own, regardless of which unit it was cast for.
    VoterAggregate,
}

impl FromStr for WeightingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_unit" => Ok(Self::PerUnit),
            "voter_aggregate" => Ok(Self::VoterAggregate),
            other => Err(format!("unknown weighting mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Outcome {
    #[serde(rename = "DECIDED")]
    Decided { option_id: String, label: String },
    #[serde(rename = "UNDECIDED/TIED")]
    Tied,
    #[serde(rename = "NO_QUORUM")]
    NoQuorum,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decided { label, .. } => write!(f, "DECIDED: {}", label),
            Self::Tied => f.write_str("UNDECIDED/TIED"),
            Self::NoQuorum => f.write_str("NO_QUORUM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub option_id: String,
    pub label: String,
    pub votes: u32,
    pub fraction: Fraction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub present_units: u32,
    pub total_units: u32,
    pub weighted_fraction: Fraction,
    pub options: Vec<OptionTally>,
    pub outcome: Outcome,
    pub weighting: WeightingMode,
}

/// Identity attached to every authenticated request or socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub participant_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub tenant_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_wire_names() {
        let tied = serde_json::to_value(Outcome::Tied).unwrap();
        assert_eq!(tied["kind"], "UNDECIDED/TIED");

        let none = serde_json::to_value(Outcome::NoQuorum).unwrap();
        assert_eq!(none["kind"], "NO_QUORUM");

        let decided = serde_json::to_value(Outcome::Decided {
            option_id: "opt-1".into(),
            label: "Sim".into(),
        })
        .unwrap();
        assert_eq!(decided["kind"], "DECIDED");
        assert_eq!(decided["option_id"], "opt-1");
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [SessionStatus::Scheduled, SessionStatus::Open, SessionStatus::Closed] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("open".parse::<SessionStatus>().is_err());
    }
}
