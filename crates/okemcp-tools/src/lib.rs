//! Tool surface for oke-mcp
//!
//! This crate decodes tool arguments, dispatches them to the session layer
//! and wraps every outcome in a `ToolEnvelope`.

mod args;
mod catalog;
mod router;

pub use catalog::{ToolInfo, ToolName, catalog};
pub use router::ToolRouter;

// Re-export types used in our public API
pub use okemcp_types::{ErrorBody, ErrorCode, Shape, ToolEnvelope};
