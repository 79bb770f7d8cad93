//! Realtime side of the voting room: session topics over a websocket.

pub mod auth;
pub mod connection;
pub mod dispatcher;

pub use dispatcher::{Dispatcher, Envelope};
