//! All MCP data types used by a session.

pub mod capabilities;
pub mod error;
pub mod message;
pub mod methods;
pub mod notification;
pub mod request;
pub mod response;

pub use capabilities::*;
pub use error::*;
pub use message::*;
pub use notification::*;
pub use request::*;
pub use response::*;
