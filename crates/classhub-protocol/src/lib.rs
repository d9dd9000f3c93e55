//! Wire types shared between the Classhub server and its realtime clients.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
