use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the session and resource layers.
///
/// Every variant maps onto one [`ErrorCode`] of the tool-facing taxonomy.
/// Messages never carry token or key material.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error(
        "missing required identifier `{name}`: pass it explicitly, set {env}, or call config_set_defaults"
    )]
    MissingIdentifier {
        name: &'static str,
        env: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("network timeout: {0}")]
    NetworkTimeout(String),
}

impl CoreError {
    /// Taxonomy code reported to tool callers
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingIdentifier { .. } | Self::Config(_) => ErrorCode::ConfigError,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::NotFound(_) => ErrorCode::NotFoundError,
            Self::Upstream { .. } => ErrorCode::UpstreamError,
            Self::NetworkTimeout(_) => ErrorCode::NetworkTimeout,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// HTTP status carried by upstream failures
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for oke-mcp operations
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Error codes exposed in tool envelopes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    ConfigError,
    AuthError,
    ValidationError,
    NotFoundError,
    UpstreamError,
    NetworkTimeout,
}

/// The `error` member of a tool envelope
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
