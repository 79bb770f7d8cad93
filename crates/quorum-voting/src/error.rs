use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum VotingError {
    #[error("voting is not open for this session")]
    NotEligible,

    #[error("every requested unit has already voted")]
    AlreadyVoted,

    #[error("option '{0}' does not belong to this session")]
    InvalidOption(String),

    #[error("unit '{0}' is not owned by the caller")]
    InvalidUnit(String),

    #[error("caller owns no voting units")]
    NoUnits,

    #[error("no units selected")]
    NoUnitsSelected,

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("session is not open")]
    SessionNotOpen,

    #[error("session can no longer be edited")]
    SessionLocked,

    #[error("session is closed")]
    SessionClosed,

    #[error("minutes are not available until the session is closed")]
    MinutesNotAvailable,

    #[error("receipt not found")]
    ReceiptNotFound,

    #[error("unit '{0}' is already registered")]
    UnitExists(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("operation requires the manager role")]
    Forbidden,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl VotingError {
    /// Stable machine-readable code for API bodies and channel errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotEligible => "NOT_ELIGIBLE",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::InvalidOption(_) => "INVALID_OPTION",
            Self::InvalidUnit(_) => "INVALID_UNIT",
            Self::NoUnits => "NO_UNITS",
            Self::NoUnitsSelected => "NO_UNITS_SELECTED",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionNotOpen => "SESSION_NOT_OPEN",
            Self::SessionLocked => "SESSION_LOCKED",
            Self::SessionClosed => "SESSION_CLOSED",
            Self::MinutesNotAvailable => "MINUTES_NOT_AVAILABLE",
            Self::ReceiptNotFound => "RECEIPT_NOT_FOUND",
            Self::UnitExists(_) => "UNIT_EXISTS",
            Self::InvalidSession(_) => "INVALID_SESSION",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
            Self::Forbidden => "FORBIDDEN",
            Self::Storage(_) => "STORAGE",
        }
    }
}
