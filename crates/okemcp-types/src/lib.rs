//! Shared types for oke-mcp
//!
//! This crate contains the data structures exchanged between the session
//! layer, the resource layer and the tool router.

mod error;

pub use error::{CoreError, ErrorBody, ErrorCode, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Defaults
// ============================================================================

/// Fallback identifiers used when a tool call omits them
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    pub compartment_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl Defaults {
    pub fn new(compartment_id: Option<&str>, cluster_id: Option<&str>) -> Self {
        Self {
            compartment_id: normalize(compartment_id),
            cluster_id: normalize(cluster_id),
        }
    }

    /// Overlay the non-blank fields of `patch`, leaving the others untouched
    pub fn merged(&self, patch: &Defaults) -> Defaults {
        Defaults {
            compartment_id: normalize(patch.compartment_id.as_deref())
                .or_else(|| self.compartment_id.clone()),
            cluster_id: normalize(patch.cluster_id.as_deref()).or_else(|| self.cluster_id.clone()),
        }
    }
}

/// Trim a value and treat blank strings as absent
pub fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Credentials
// ============================================================================

/// Authentication strategy used to sign control-plane requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    SecurityToken,
    ApiKey,
}

impl AuthMode {
    /// Value passed to the OCI CLI `--auth` flag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityToken => "security_token",
            Self::ApiKey => "api_key",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "security_token" => Ok(Self::SecurityToken),
            "api_key" => Ok(Self::ApiKey),
            other => Err(CoreError::Validation(format!(
                "unsupported auth mode '{}' (expected security_token or api_key)",
                other
            ))),
        }
    }
}

// ============================================================================
// Resource Pages
// ============================================================================

/// One segment of a list result
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Value>,
    /// Source-native continuation cursor; `None` once the source is exhausted
    pub next: Option<String>,
}

impl Page {
    pub fn new(items: Vec<Value>, next: Option<String>) -> Self {
        Self {
            items,
            next: next.filter(|t| !t.is_empty()),
        }
    }
}

// ============================================================================
// Tool Envelopes
// ============================================================================

/// Which envelope shape a tool answers with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    List,
    Single,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListEnvelope {
    pub items: Option<Vec<Value>>,
    pub next: Option<String>,
    pub error: Option<ErrorBody>,
    pub meta: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleEnvelope {
    pub item: Option<Value>,
    pub error: Option<ErrorBody>,
    pub meta: Option<Value>,
}

/// Uniform response returned by every tool
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolEnvelope {
    List(ListEnvelope),
    Single(SingleEnvelope),
}

impl ToolEnvelope {
    pub fn page(page: Page, meta: Option<Value>) -> Self {
        Self::List(ListEnvelope {
            items: Some(page.items),
            next: page.next,
            error: None,
            meta,
        })
    }

    pub fn item(item: Value, meta: Option<Value>) -> Self {
        Self::Single(SingleEnvelope {
            item: Some(item),
            error: None,
            meta,
        })
    }

    /// Failure envelope; every field but `error` is null
    pub fn failure(shape: Shape, err: &CoreError) -> Self {
        let error = Some(ErrorBody::from(err));
        match shape {
            Shape::List => Self::List(ListEnvelope {
                items: None,
                next: None,
                error,
                meta: None,
            }),
            Shape::Single => Self::Single(SingleEnvelope {
                item: None,
                error,
                meta: None,
            }),
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            Self::List(env) => env.error.as_ref(),
            Self::Single(env) => env.error.as_ref(),
        }
    }

    pub fn meta(&self) -> Option<&Value> {
        match self {
            Self::List(env) => env.meta.as_ref(),
            Self::Single(env) => env.meta.as_ref(),
        }
    }
}

// ============================================================================
// Control Plane Types
// ============================================================================

/// Trimmed view of an OKE cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct ClusterSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub lifecycle_state: Option<String>,
    #[serde(default)]
    pub endpoints: Option<Value>,
}

/// Trimmed view of an OKE node pool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct NodePoolSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub lifecycle_state: Option<String>,
    #[serde(default)]
    pub node_shape: Option<String>,
}

/// A page of control-plane results; `next` is the `opc-next-page` header
#[derive(Clone, Debug, PartialEq)]
pub struct ControlPlanePage<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl LogLevel {
    /// Parse log level from common formats
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" | "trc" | "trce" => Self::Trace,
            "debug" | "dbg" | "debg" => Self::Debug,
            "info" | "inf" | "information" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" | "erro" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" | "ftl" => Self::Fatal,
            _ => Self::Unknown,
        }
    }
}

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCounts {
    pub trace: usize,
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub fatal: usize,
    pub unknown: usize,
}

impl LevelCounts {
    pub fn record(&mut self, level: LogLevel) {
        match level {
            LogLevel::Trace => self.trace += 1,
            LogLevel::Debug => self.debug += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Error => self.error += 1,
            LogLevel::Fatal => self.fatal += 1,
            LogLevel::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.trace + self.debug + self.info + self.warn + self.error + self.fatal + self.unknown
    }
}

/// Summary of a fetched log, reported in envelope `meta`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub lines: usize,
    pub levels: LevelCounts,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}
