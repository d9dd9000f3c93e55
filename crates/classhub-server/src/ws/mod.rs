pub mod connections;
pub mod handler;

pub use connections::{RealtimeHub, Subscription};
