//! Tool arguments
//!
//! Keys are accepted in snake_case and camelCase. Numeric limits are taken
//! as signed integers and clamped later, so a zero or negative value never
//! fails decoding.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use okemcp_k8s::{ListRequest, MAX_LIST_LIMIT};
use okemcp_types::{AuthMode, CoreError, Result, normalize};

/// Decode tool arguments; a missing argument object is treated as `{}`
pub fn decode<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| CoreError::Validation(format!("invalid arguments: {}", e)))
}

/// `auth` argument; blank means "use the configured mode"
pub fn auth_mode(auth: Option<&str>) -> Result<Option<AuthMode>> {
    normalize(auth).map(|mode| mode.parse()).transpose()
}

fn page_size(limit: Option<i64>) -> Option<u32> {
    limit.map(|l| l.clamp(1, i64::from(MAX_LIST_LIMIT)) as u32)
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthArgs {
    pub auth: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetDefaultsArgs {
    #[serde(alias = "compartmentId")]
    pub compartment_id: Option<String>,
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListArgs {
    pub kind: String,
    pub namespace: Option<String>,
    pub limit: Option<i64>,
    #[serde(alias = "continueToken", alias = "continue")]
    pub continue_token: Option<String>,
    #[serde(alias = "labelSelector")]
    pub label_selector: Option<String>,
    #[serde(alias = "fieldSelector")]
    pub field_selector: Option<String>,
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
    pub auth: Option<String>,
    pub hints: Option<bool>,
    /// Whole objects instead of trimmed summaries
    #[serde(default)]
    pub full: bool,
}

impl ListArgs {
    pub fn request(&self) -> ListRequest {
        ListRequest {
            namespace: normalize(self.namespace.as_deref()),
            limit: page_size(self.limit),
            continue_token: normalize(self.continue_token.as_deref()),
            label_selector: normalize(self.label_selector.as_deref()),
            field_selector: normalize(self.field_selector.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GetArgs {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
    pub auth: Option<String>,
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogsArgs {
    pub pod: String,
    pub namespace: Option<String>,
    pub container: Option<String>,
    #[serde(alias = "tailLines")]
    pub tail_lines: Option<i64>,
    #[serde(alias = "sinceSeconds")]
    pub since_seconds: Option<i64>,
    #[serde(default)]
    pub previous: bool,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
    pub auth: Option<String>,
}

impl LogsArgs {
    pub fn request(&self) -> okemcp_logs::LogRequest {
        okemcp_logs::LogRequest {
            namespace: normalize(self.namespace.as_deref()),
            pod: self.pod.clone(),
            container: normalize(self.container.as_deref()),
            tail_lines: self.tail_lines,
            since_seconds: self.since_seconds,
            previous: self.previous,
            timestamps: self.timestamps,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsArgs {
    pub namespace: Option<String>,
    pub limit: Option<i64>,
    #[serde(alias = "continueToken", alias = "continue")]
    pub continue_token: Option<String>,
    #[serde(alias = "fieldSelector")]
    pub field_selector: Option<String>,
    /// Kind of the involved object
    #[serde(alias = "involvedKind", alias = "involved_kind")]
    pub kind: Option<String>,
    /// Name of the involved object
    #[serde(alias = "involvedName", alias = "involved_name")]
    pub name: Option<String>,
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
    pub auth: Option<String>,
}

impl EventsArgs {
    pub fn request(&self) -> ListRequest {
        ListRequest {
            namespace: normalize(self.namespace.as_deref()),
            limit: page_size(self.limit),
            continue_token: normalize(self.continue_token.as_deref()),
            label_selector: None,
            field_selector: normalize(self.field_selector.as_deref()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsArgs {
    pub namespace: Option<String>,
    pub limit: Option<i64>,
    #[serde(alias = "continueToken", alias = "continue")]
    pub continue_token: Option<String>,
    #[serde(alias = "labelSelector")]
    pub label_selector: Option<String>,
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
    pub auth: Option<String>,
}

impl MetricsArgs {
    pub fn request(&self) -> ListRequest {
        ListRequest {
            namespace: normalize(self.namespace.as_deref()),
            limit: page_size(self.limit),
            continue_token: normalize(self.continue_token.as_deref()),
            label_selector: normalize(self.label_selector.as_deref()),
            field_selector: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClustersArgs {
    #[serde(alias = "compartmentId")]
    pub compartment_id: Option<String>,
    #[serde(alias = "pageToken", alias = "next")]
    pub page: Option<String>,
    pub limit: Option<i64>,
    pub auth: Option<String>,
}

impl ClustersArgs {
    pub fn limit(&self) -> Option<u32> {
        page_size(self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClusterArgs {
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
    pub auth: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodePoolsArgs {
    #[serde(alias = "compartmentId")]
    pub compartment_id: Option<String>,
    #[serde(alias = "clusterId")]
    pub cluster_id: Option<String>,
    #[serde(alias = "pageToken", alias = "next")]
    pub page: Option<String>,
    pub limit: Option<i64>,
    pub auth: Option<String>,
}

impl NodePoolsArgs {
    pub fn limit(&self) -> Option<u32> {
        page_size(self.limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct NodePoolArgs {
    #[serde(alias = "nodePoolId", alias = "id")]
    pub node_pool_id: String,
    pub auth: Option<String>,
}
