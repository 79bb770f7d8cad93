pub mod ballots;
pub mod chat;
pub mod minutes;
pub mod sessions;
pub mod units;
