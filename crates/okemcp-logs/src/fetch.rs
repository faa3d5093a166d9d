use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, LogParams};
use kube::Client;

use okemcp_k8s::{DEFAULT_NAMESPACE, from_kube};
use okemcp_types::{CoreError, LogSummary, Result, normalize};

use crate::summary::summarize;

pub const DEFAULT_TAIL_LINES: i64 = 200;
pub const MAX_TAIL_LINES: i64 = 10_000;
/// Upper bound on the log body requested from the kubelet
pub const MAX_LOG_BYTES: i64 = 4 * 1024 * 1024;

#[derive(Clone, Debug, Default)]
pub struct LogRequest {
    pub namespace: Option<String>,
    pub pod: String,
    pub container: Option<String>,
    pub tail_lines: Option<i64>,
    pub since_seconds: Option<i64>,
    pub previous: bool,
    pub timestamps: bool,
}

impl LogRequest {
    pub fn namespace(&self) -> String {
        normalize(self.namespace.as_deref()).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Requested tail clamped to `[1, MAX_TAIL_LINES]`
    pub fn effective_tail_lines(&self) -> i64 {
        self.tail_lines.unwrap_or(DEFAULT_TAIL_LINES).clamp(1, MAX_TAIL_LINES)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pod.trim().is_empty() {
            return Err(CoreError::Validation("pod is required".into()));
        }
        if let Some(since) = self.since_seconds {
            if since < 1 {
                return Err(CoreError::Validation(format!(
                    "since_seconds must be positive, got {}",
                    since
                )));
            }
        }
        Ok(())
    }

    pub fn log_params(&self) -> LogParams {
        LogParams {
            container: normalize(self.container.as_deref()),
            previous: self.previous,
            since_seconds: self.since_seconds,
            tail_lines: Some(self.effective_tail_lines()),
            timestamps: self.timestamps,
            limit_bytes: Some(MAX_LOG_BYTES),
            ..Default::default()
        }
    }
}

/// Log body of one container plus its summary
#[derive(Clone, Debug)]
pub struct PodLogs {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    pub text: String,
    pub summary: LogSummary,
    /// The byte cap was reached; older lines may be missing
    pub truncated: bool,
}

/// Fetch container logs. Kubelet connectivity failures surface as
/// `NetworkTimeout`, a missing pod as `NotFound`.
pub async fn fetch_pod_logs(client: Client, request: &LogRequest) -> Result<PodLogs> {
    request.validate()?;
    let namespace = request.namespace();
    let pod = request.pod.trim().to_string();
    let params = request.log_params();

    let pods: Api<Pod> = Api::namespaced(client, &namespace);
    let (text, bytes_read) = match pods.logs(&pod, &params).await {
        Ok(text) => {
            let len = text.len();
            (text, len)
        }
        // Container output is arbitrary bytes and the byte cap can split a
        // multibyte character; keep everything that arrived
        Err(kube::Error::FromUtf8(raw)) => {
            let len = raw.as_bytes().len();
            tracing::debug!(namespace = %namespace, pod = %pod, "Log body is not valid UTF-8, decoding lossily");
            (String::from_utf8_lossy(raw.as_bytes()).into_owned(), len)
        }
        Err(e) => return Err(from_kube(e, &format!("logs for pod {}/{}", namespace, pod))),
    };

    let summary = summarize(&text);
    tracing::debug!(
        namespace = %namespace,
        pod = %pod,
        lines = summary.lines,
        bytes = bytes_read,
        "Fetched pod logs"
    );
    Ok(PodLogs {
        truncated: bytes_read as i64 >= MAX_LOG_BYTES,
        namespace,
        pod,
        container: params.container,
        text,
        summary,
    })
}
