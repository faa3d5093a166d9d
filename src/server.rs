//! Line-delimited JSON transport
//!
//! Each input line is one tool call, `{"id", "name", "arguments"}`; each
//! output line is `{"id", "result"}` with the tool envelope as result. Calls
//! run concurrently, so responses may arrive out of order and are matched by
//! `id`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use okemcp_tools::{ToolEnvelope, ToolRouter};
use okemcp_types::{CoreError, Shape};

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: Value,
    #[serde(alias = "tool")]
    name: String,
    #[serde(default, alias = "args")]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    id: Value,
    result: ToolEnvelope,
}

/// Serve tool calls until `input` is exhausted, then wait for in-flight
/// calls to finish
pub async fn serve<R, W>(router: ToolRouter, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Single writer keeps response lines whole
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut tasks = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let router = router.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            let response = handle_line(&router, &line).await;
            match serde_json::to_string(&response) {
                Ok(encoded) => {
                    let _ = tx.send(encoded);
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode response"),
            }
        });
    }
    tracing::debug!("Input closed, draining in-flight calls");

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Tool task aborted");
        }
    }
    drop(tx);
    writer
        .await
        .context("response writer stopped")?
        .context("failed to write response")
}

async fn handle_line(router: &ToolRouter, line: &str) -> ToolResponse {
    match serde_json::from_str::<ToolCall>(line) {
        Ok(call) => {
            tracing::debug!(id = %call.id, tool = %call.name, "Tool call");
            ToolResponse {
                result: router.call(&call.name, call.arguments).await,
                id: call.id,
            }
        }
        Err(e) => {
            // Echo the id back when the line is JSON but not a valid call
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            ToolResponse {
                id,
                result: ToolEnvelope::failure(
                    Shape::Single,
                    &CoreError::Validation(format!("malformed request: {}", e)),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use okemcp_k8s::{DefaultsStore, Environment, ResolverConfig, Session, SessionConfig};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn router(dir: &TempDir) -> ToolRouter {
        let config = SessionConfig {
            resolver: ResolverConfig {
                config_file: Some(dir.path().join("missing-oci-config")),
                profile: None,
                region: None,
            },
            ..Default::default()
        };
        let env = Environment::default();
        let session =
            Session::connect(&config, DefaultsStore::in_memory(env.clone()), env).unwrap();
        ToolRouter::new(Arc::new(session))
    }

    async fn run(router: ToolRouter, input: &str) -> Vec<Value> {
        let (server_side, mut client_side) = tokio::io::duplex(64 * 1024);
        serve(router, input.as_bytes(), server_side).await.unwrap();

        let mut out = String::new();
        client_side.read_to_string(&mut out).await.unwrap();
        out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    fn by_id(responses: &[Value], id: i64) -> &Value {
        responses.iter().find(|r| r["id"] == id).unwrap()
    }

    #[tokio::test]
    async fn test_each_line_gets_a_response() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir);
        let input = concat!(
            r#"{"id": 1, "name": "config_set_defaults", "arguments": {"clusterId": "c1"}}"#,
            "\n\n",
            r#"{"id": 2, "tool": "kubectl_apply"}"#,
            "\n",
            r#"{"id": 3, "arguments": {}}"#,
            "\n",
            "not json\n",
        );
        let responses = run(router.clone(), input).await;
        assert_eq!(responses.len(), 4);

        assert_eq!(by_id(&responses, 1)["result"]["item"]["cluster_id"], "c1");
        assert_eq!(by_id(&responses, 2)["result"]["error"]["code"], "ValidationError");
        assert_eq!(by_id(&responses, 3)["result"]["error"]["code"], "ValidationError");
        assert!(responses.iter().any(|r| r["id"].is_null()));
        assert_eq!(
            router.session().defaults().get().cluster_id.as_deref(),
            Some("c1")
        );
    }

    #[tokio::test]
    async fn test_credential_failure_surfaces_in_envelope() {
        let dir = TempDir::new().unwrap();
        let responses = run(
            router(&dir),
            r#"{"id": "a", "name": "k8s_list", "arguments": {"kind": "pods", "cluster_id": "c1"}}"#,
        )
        .await;
        let result = &responses[0]["result"];
        assert!(result["items"].is_null());
        assert!(result["error"]["code"].is_string());
    }
}
