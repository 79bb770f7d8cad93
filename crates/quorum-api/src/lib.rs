//! REST surface of the voting room plus the websocket upgrade.

pub mod ballots;
pub mod chat;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod units;

pub use routes::router;
pub use state::{AppState, AppStateInner};
