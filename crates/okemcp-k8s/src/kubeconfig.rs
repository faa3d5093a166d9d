//! Kubeconfig acquisition, decoding and patching
//!
//! The control plane answers with either a structured document or text
//! (YAML, sometimes JSON-quoted or with literal escapes). Decoding accepts
//! every form and yields the same document; patching pins the exec plugin
//! to the resolved auth mode and profile.

use kube::config::Kubeconfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use okemcp_types::{AuthMode, CoreError, Result};

use crate::credentials::CredentialContext;
use crate::oci::container_engine::{ControlPlane, KubeconfigRequest};

/// Maximum characters of a rejected payload echoed in error messages
const EXCERPT_CHARS: usize = 160;

const SECRET_PATTERNS: &[&str] = &[
    r#"(?i)((?:token|client-key-data|client-certificate-data|certificate-authority-data|password|pass_phrase)["']?\s*[:=]\s*)("[^"]*"|'[^']*'|[^\s,}]+)"#,
    r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)?",
    r"[A-Za-z0-9+/=]{64,}",
];

static SECRET_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SECRET_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Offending values quoted inside serde "invalid type/value" messages
static SERDE_VALUE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(invalid (?:type|value): [a-z ]*?|unknown variant) ?(?:"(?:[^"\\]|\\.)*"|`[^`]*`)"#).ok()
});

/// Describe a shape mismatch by its kind and expectation, never by value
fn shape_error(err: &serde_json::Error) -> String {
    let message = err.to_string();
    let message = match SERDE_VALUE_RE.as_ref() {
        Some(re) => re.replace_all(&message, "${1}").into_owned(),
        None => format!("{:?} error", err.classify()),
    };
    redacted_excerpt(&message)
}

/// Redact token-like material, then truncate
pub fn redacted_excerpt(raw: &str) -> String {
    let mut text = raw.to_string();
    for (i, re) in SECRET_RES.iter().enumerate() {
        let replacement = if i == 0 { "${1}<redacted>" } else { "<redacted>" };
        text = re.replace_all(&text, replacement).into_owned();
    }
    let mut excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        excerpt.push_str("...");
    }
    excerpt
}

// ============================================================================
// Payload
// ============================================================================

/// Raw kubeconfig as returned by the control plane
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KubeconfigPayload {
    Structured(Map<String, Value>),
    Encoded(String),
}

impl KubeconfigPayload {
    /// Classify a response body; JSON objects stay structured
    pub fn from_response_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Self::Structured(map),
            _ => Self::Encoded(text),
        }
    }

    fn excerpt(&self) -> String {
        match self {
            Self::Structured(map) => {
                redacted_excerpt(&serde_json::to_string(map).unwrap_or_default())
            }
            Self::Encoded(text) => redacted_excerpt(text),
        }
    }

    /// Normalize to a mapping, trying each known text encoding in turn
    fn to_mapping(&self) -> Option<Map<String, Value>> {
        let text = match self {
            Self::Structured(map) => return Some(map.clone()),
            Self::Encoded(text) => text.trim(),
        };

        let mut candidates = vec![text.to_string()];
        if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(text) {
            candidates.push(inner);
        }
        if let Some(inner) = strip_quotes(text) {
            candidates.push(inner.to_string());
        }
        if text.contains("\\n") {
            candidates.push(unescape(strip_quotes(text).unwrap_or(text)));
        }

        let mut mappings: Vec<Map<String, Value>> = candidates
            .iter()
            .filter_map(|candidate| match serde_yaml::from_str::<Value>(candidate) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            })
            .collect();
        // Prefer a reading that looks like a kubeconfig over an incidental mapping
        match mappings.iter().position(|m| m.contains_key("clusters")) {
            Some(i) => Some(mappings.swap_remove(i)),
            None => mappings.into_iter().next(),
        }
    }
}

fn strip_quotes(text: &str) -> Option<&str> {
    ['"', '\'']
        .iter()
        .find_map(|q| text.strip_prefix(*q).and_then(|t| t.strip_suffix(*q)))
}

fn unescape(text: &str) -> String {
    text.replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}

// ============================================================================
// Document
// ============================================================================

/// A validated kubeconfig
#[derive(Clone, Debug)]
pub struct KubeconfigDocument {
    config: Kubeconfig,
}

impl PartialEq for KubeconfigDocument {
    fn eq(&self, other: &Self) -> bool {
        self.to_value() == other.to_value()
    }
}

impl KubeconfigDocument {
    pub fn decode(payload: &KubeconfigPayload) -> Result<Self> {
        let map = payload.to_mapping().ok_or_else(|| {
            CoreError::Validation(format!(
                "kubeconfig payload is not a mapping: {}",
                payload.excerpt()
            ))
        })?;

        let missing: Vec<&str> = ["clusters", "users", "contexts"]
            .into_iter()
            .filter(|key| {
                !map.get(*key)
                    .and_then(Value::as_array)
                    .is_some_and(|entries| !entries.is_empty())
            })
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::Validation(format!(
                "kubeconfig payload has no {}: {}",
                missing.join(", "),
                payload.excerpt()
            )));
        }

        let mut config: Kubeconfig = serde_json::from_value(Value::Object(map)).map_err(|e| {
            CoreError::Validation(format!("kubeconfig payload is malformed: {}", shape_error(&e)))
        })?;

        if config.current_context.as_deref().is_none_or(str::is_empty) {
            config.current_context = config.contexts.first().map(|c| c.name.clone());
        }
        Ok(Self { config })
    }

    pub fn kubeconfig(&self) -> &Kubeconfig {
        &self.config
    }

    pub fn into_kubeconfig(self) -> Kubeconfig {
        self.config
    }

    pub fn current_context(&self) -> Option<&str> {
        self.config.current_context.as_deref()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    /// Arguments of every exec credential plugin
    pub fn exec_args(&self) -> Vec<Vec<String>> {
        self.config
            .auth_infos
            .iter()
            .filter_map(|named| named.auth_info.as_ref()?.exec.as_ref())
            .map(|exec| exec.args.clone().unwrap_or_default())
            .collect()
    }

    pub fn patched_for(&self, ctx: &CredentialContext) -> Self {
        self.patched(ctx.mode, &ctx.profile)
    }

    /// Copy whose OCI exec plugins carry exactly one `--auth` and one
    /// `--profile`. Idempotent.
    pub fn patched(&self, mode: AuthMode, profile: &str) -> Self {
        let mut config = self.config.clone();
        for named in &mut config.auth_infos {
            let Some(exec) = named.auth_info.as_mut().and_then(|a| a.exec.as_mut()) else {
                continue;
            };
            if !exec.command.as_deref().is_some_and(is_oci_cli) {
                continue;
            }
            let args = exec.args.get_or_insert_with(Vec::new);
            assert_flag(args, "--auth", mode.as_str());
            assert_flag(args, "--profile", profile);
        }
        Self { config }
    }
}

fn is_oci_cli(command: &str) -> bool {
    let name = command.rsplit(['/', '\\']).next().unwrap_or(command);
    name == "oci" || name == "oci.exe"
}

/// Remove every `flag value` / `flag=value` occurrence, then append one
fn assert_flag(args: &mut Vec<String>, flag: &str, value: &str) {
    let prefix = format!("{}=", flag);
    let mut kept = Vec::with_capacity(args.len() + 2);
    let mut iter = std::mem::take(args).into_iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            iter.next();
            continue;
        }
        if arg.starts_with(&prefix) {
            continue;
        }
        kept.push(arg);
    }
    kept.push(flag.to_string());
    kept.push(value.to_string());
    *args = kept;
}

// ============================================================================
// Provider
// ============================================================================

/// Fetches, decodes and patches kubeconfigs for a cluster
#[derive(Clone)]
pub struct KubeconfigProvider {
    control_plane: Arc<dyn ControlPlane>,
    request: KubeconfigRequest,
}

impl KubeconfigProvider {
    pub fn new(control_plane: Arc<dyn ControlPlane>, request: KubeconfigRequest) -> Self {
        Self {
            control_plane,
            request,
        }
    }

    pub async fn build(&self, cluster_id: &str, ctx: &CredentialContext) -> Result<KubeconfigDocument> {
        let start = Instant::now();
        let payload = self
            .control_plane
            .create_kubeconfig(cluster_id, &self.request, ctx)
            .await?;
        let document = KubeconfigDocument::decode(&payload)?.patched_for(ctx);
        tracing::debug!(
            cluster = %cluster_id,
            endpoint = %self.request.endpoint,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generated kubeconfig"
        );
        Ok(document)
    }
}
