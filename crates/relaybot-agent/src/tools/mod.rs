//! Tools the dialogue model can call.

pub mod base;
pub mod retrieval;

pub use base::{optional_string, params_from_value, require_string, Tool};
pub use retrieval::{RetrievalTool, NO_INFORMATION, NO_READABLE_SOURCES, RETRIEVAL_TOOL_NAME};
