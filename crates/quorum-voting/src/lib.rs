//! Voting-room domain rules: the session state machine, option and unit
//! validation, the quorum/tally engine and the minutes generator.
//!
//! Everything here is pure. Persistence and transport live in `quorum-db`
//! and `quorum-gateway`.

pub mod chat;
pub mod error;
pub mod minutes;
pub mod options;
pub mod receipt;
pub mod state;
pub mod tally;
pub mod units;

pub use error::VotingError;
