pub mod community;
pub mod live_class;
pub mod message;
pub mod notification;
pub mod user;

pub use community::*;
pub use live_class::*;
pub use message::*;
pub use notification::*;
pub use user::*;
