//! Pod logs for oke-mcp
//!
//! This crate fetches container logs through the cluster API and derives a
//! per-level summary from them.

mod fetch;
mod parser;
mod summary;

pub use fetch::{DEFAULT_TAIL_LINES, LogRequest, MAX_LOG_BYTES, MAX_TAIL_LINES, PodLogs, fetch_pod_logs};
pub use parser::{LogParser, ParsedLine};
pub use summary::{problem_lines, summarize};

// Re-export types used in our public API
pub use okemcp_types::{LevelCounts, LogLevel, LogSummary};
