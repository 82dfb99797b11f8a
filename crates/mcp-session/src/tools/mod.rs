//! Demo tool set served over `tools/list` and `tools/call`.

pub mod echo;
pub mod registry;
pub mod timestamp;

pub use registry::ToolRegistry;
