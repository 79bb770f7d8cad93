pub mod api;
pub mod events;
pub mod fraction;
pub mod models;

pub use fraction::Fraction;
