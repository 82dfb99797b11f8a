//! MCP protocol plumbing: wire codec, envelope validation, and version negotiation.

pub mod codec;
pub mod negotiation;
pub mod validator;

pub use codec::{decode, encode, MalformedFrame};
pub use negotiation::Negotiator;
