//! Client side of the voting room: REST calls, the reconnecting session
//! channel and the multi-unit cast flow.

pub mod api;
pub mod backoff;
pub mod cast_flow;
pub mod channel;
pub mod error;

pub use api::ApiClient;
pub use cast_flow::{CastFlow, CastPlan};
pub use channel::{ChannelUpdate, ConnectionState, SessionChannel};
pub use error::ClientError;
