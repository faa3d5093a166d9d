//! Dispatches tool calls to the session
//!
//! Every call returns a `ToolEnvelope`; errors never escape as `Err`.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

use okemcp_k8s::{ResourceKind, ResourceReader, Session, View, effective_limit, relationship_edges};
use okemcp_logs::{fetch_pod_logs, problem_lines};
use okemcp_types::{CoreError, Defaults, Page, Result, Shape, ToolEnvelope, normalize};

use crate::args::{
    AuthArgs, ClusterArgs, ClustersArgs, EventsArgs, GetArgs, ListArgs, LogsArgs, MetricsArgs,
    NodePoolArgs, NodePoolsArgs, SetDefaultsArgs, auth_mode, decode,
};
use crate::catalog::ToolName;

#[derive(Clone)]
pub struct ToolRouter {
    session: Arc<Session>,
}

impl ToolRouter {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run one tool call
    pub async fn call(&self, name: &str, args: Value) -> ToolEnvelope {
        let Some(tool) = ToolName::parse(name) else {
            tracing::warn!(tool = name, "Unknown tool");
            return ToolEnvelope::failure(
                Shape::Single,
                &CoreError::Validation(format!("unknown tool '{}'", name)),
            );
        };

        let started = Instant::now();
        match self.dispatch(tool, args).await {
            Ok(envelope) => {
                tracing::debug!(
                    tool = tool.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call finished"
                );
                envelope
            }
            Err(err) => {
                tracing::warn!(
                    tool = tool.as_str(),
                    code = ?err.code(),
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call failed"
                );
                ToolEnvelope::failure(tool.shape(), &err)
            }
        }
    }

    async fn dispatch(&self, tool: ToolName, args: Value) -> Result<ToolEnvelope> {
        match tool {
            ToolName::MetaHealth => Ok(ToolEnvelope::item(self.session.health(), None)),
            ToolName::ConfigGetEffectiveDefaults => self.effective_defaults(),
            ToolName::ConfigSetDefaults => self.set_defaults(decode(args)?),
            ToolName::ConfigResetDefaults => {
                let stored = self.session.defaults().reset()?;
                Ok(ToolEnvelope::item(json!(stored), None))
            }
            ToolName::AuthRefresh => self.refresh(decode(args)?),
            ToolName::K8sList => self.list(decode(args)?).await,
            ToolName::K8sGet => self.get(decode(args)?).await,
            ToolName::GetPodLogs => self.logs(decode(args)?).await,
            ToolName::ListEvents => self.events(decode(args)?).await,
            ToolName::ListNodeMetrics => self.metrics(decode(args)?, false).await,
            ToolName::ListPodMetrics => self.metrics(decode(args)?, true).await,
            ToolName::ListClusters => self.clusters(decode(args)?).await,
            ToolName::GetCluster => {
                let args: ClusterArgs = decode(args)?;
                let cluster = self
                    .session
                    .get_cluster(args.cluster_id.as_deref(), auth_mode(args.auth.as_deref())?)
                    .await?;
                Ok(ToolEnvelope::item(cluster, None))
            }
            ToolName::ListNodePools => self.node_pools(decode(args)?).await,
            ToolName::GetNodePool => {
                let args: NodePoolArgs = decode(args)?;
                let pool = self
                    .session
                    .get_node_pool(&args.node_pool_id, auth_mode(args.auth.as_deref())?)
                    .await?;
                Ok(ToolEnvelope::item(pool, None))
            }
        }
    }

    // ========================================================================
    // Defaults and credentials
    // ========================================================================

    fn effective_defaults(&self) -> Result<ToolEnvelope> {
        let defaults = self.session.defaults();
        Ok(ToolEnvelope::item(
            json!(defaults.effective()),
            Some(json!({
                "stored": defaults.get(),
                "precedence": ["explicit", "environment", "stored"],
            })),
        ))
    }

    fn set_defaults(&self, args: SetDefaultsArgs) -> Result<ToolEnvelope> {
        let patch = Defaults::new(args.compartment_id.as_deref(), args.cluster_id.as_deref());
        if patch == Defaults::default() {
            return Err(CoreError::Validation(
                "provide compartment_id and/or cluster_id".into(),
            ));
        }
        let stored = self.session.defaults().set(&patch)?;
        Ok(ToolEnvelope::item(json!(stored), None))
    }

    /// Only the outcome is reported; token material stays inside the resolver
    fn refresh(&self, args: AuthArgs) -> Result<ToolEnvelope> {
        let ctx = self.session.refresh(auth_mode(args.auth.as_deref())?)?;
        Ok(ToolEnvelope::item(
            json!({
                "refreshed": true,
                "mode": ctx.mode,
                "profile": ctx.profile,
            }),
            None,
        ))
    }

    // ========================================================================
    // Cluster resources
    // ========================================================================

    async fn list(&self, args: ListArgs) -> Result<ToolEnvelope> {
        let kind: ResourceKind = args.kind.parse()?;
        let auth = auth_mode(args.auth.as_deref())?;
        let request = args.request();
        let request = &request;
        let hints = args.hints.unwrap_or(true);
        let view = View::new(args.full);

        // Edges come from the full objects, before they are trimmed
        let (page, edges) = self
            .session
            .with_cluster(args.cluster_id.as_deref(), auth, move |client| async move {
                let reader = ResourceReader::new(client);
                let page = reader.list(kind, request).await?;
                if !hints {
                    return Ok::<_, CoreError>((page, None));
                }
                let mut edges = relationship_edges(kind, &page.items);
                if kind == ResourceKind::Service {
                    edges.extend(
                        reader
                            .selector_edges(&page.items, effective_limit(request.limit))
                            .await,
                    );
                }
                Ok((page, Some(edges)))
            })
            .await?;

        let mut meta = json!({
            "kind": kind.name(),
            "namespace": request.namespace,
            "limit": effective_limit(request.limit),
            "view": view.as_str(),
        });
        if let Some(edges) = edges {
            meta["hints"] = json!({ "edges": edges });
        }
        let items = page.items.into_iter().map(|item| view.apply(kind, item)).collect();
        Ok(ToolEnvelope::page(Page::new(items, page.next), Some(meta)))
    }

    async fn get(&self, args: GetArgs) -> Result<ToolEnvelope> {
        let kind: ResourceKind = args.kind.parse()?;
        let auth = auth_mode(args.auth.as_deref())?;
        let namespace = normalize(args.namespace.as_deref());
        let namespace = namespace.as_deref();
        let name = args.name.as_str();

        let view = View::new(args.full);

        let item = self
            .session
            .with_cluster(args.cluster_id.as_deref(), auth, move |client| async move {
                ResourceReader::new(client).get(kind, namespace, name).await
            })
            .await?;
        Ok(ToolEnvelope::item(
            view.apply(kind, item),
            Some(json!({ "kind": kind.name(), "view": view.as_str() })),
        ))
    }

    async fn logs(&self, args: LogsArgs) -> Result<ToolEnvelope> {
        let auth = auth_mode(args.auth.as_deref())?;
        let request = args.request();
        request.validate()?;
        let request = &request;

        let logs = self
            .session
            .with_cluster(args.cluster_id.as_deref(), auth, move |client| async move {
                fetch_pod_logs(client, request).await
            })
            .await?;

        let meta = json!({
            "summary": logs.summary,
            "problem_lines": problem_lines(&logs.summary),
            "tail_lines": request.effective_tail_lines(),
            "truncated": logs.truncated,
        });
        Ok(ToolEnvelope::item(
            json!({
                "namespace": logs.namespace,
                "pod": logs.pod,
                "container": logs.container,
                "log": logs.text,
            }),
            Some(meta),
        ))
    }

    async fn events(&self, args: EventsArgs) -> Result<ToolEnvelope> {
        let auth = auth_mode(args.auth.as_deref())?;
        let request = args.request();
        let request = &request;
        let involved_kind = args.kind.as_deref();
        let involved_name = args.name.as_deref();

        let page = self
            .session
            .with_cluster(args.cluster_id.as_deref(), auth, move |client| async move {
                ResourceReader::new(client)
                    .events(request, involved_kind, involved_name)
                    .await
            })
            .await?;
        Ok(ToolEnvelope::page(
            page,
            Some(json!({ "namespace": request.namespace })),
        ))
    }

    async fn metrics(&self, args: MetricsArgs, pods: bool) -> Result<ToolEnvelope> {
        let auth = auth_mode(args.auth.as_deref())?;
        let request = args.request();
        let request = &request;

        let report = self
            .session
            .with_cluster(args.cluster_id.as_deref(), auth, move |client| async move {
                let reader = ResourceReader::new(client);
                if pods {
                    reader.pod_metrics(request).await
                } else {
                    reader.node_metrics(request).await
                }
            })
            .await?;
        let meta = json!({
            "available": report.available,
            "reason": report.reason,
        });
        Ok(ToolEnvelope::page(report.page, Some(meta)))
    }

    // ========================================================================
    // Control plane
    // ========================================================================

    async fn clusters(&self, args: ClustersArgs) -> Result<ToolEnvelope> {
        let page = self
            .session
            .list_clusters(
                args.compartment_id.as_deref(),
                args.page.as_deref(),
                args.limit(),
                auth_mode(args.auth.as_deref())?,
            )
            .await?;
        Ok(ToolEnvelope::page(page, None))
    }

    async fn node_pools(&self, args: NodePoolsArgs) -> Result<ToolEnvelope> {
        let page = self
            .session
            .list_node_pools(
                args.compartment_id.as_deref(),
                args.cluster_id.as_deref(),
                args.page.as_deref(),
                args.limit(),
                auth_mode(args.auth.as_deref())?,
            )
            .await?;
        Ok(ToolEnvelope::page(page, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::Utc;
    use http::{Request, Response, StatusCode};
    use kube::Client;
    use kube::client::Body;
    use okemcp_k8s::oci::{ControlPlane, KubeconfigRequest};
    use okemcp_k8s::{
        ClientFactory, CredentialContext, CredentialResolver, DefaultsStore, Environment,
        KubeconfigDocument, KubeconfigPayload, ResolverConfig, SessionConfig,
    };
    use okemcp_types::{ClusterSummary, ControlPlanePage, NodePoolSummary};
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower_test::mock::Handle;

    type MockHandle = Handle<Request<Body>, Response<Body>>;

    const KUBECONFIG: &str = r#"apiVersion: v1
clusters:
- name: cluster-c1
  cluster:
    server: https://10.0.0.1:6443
users:
- name: user-c1
  user:
    exec:
      apiVersion: client.authentication.k8s.io/v1beta1
      command: oci
      args: [ce, cluster, generate-token, --cluster-id, ocid1.cluster.oc1..c1]
contexts:
- name: context-c1
  context:
    cluster: cluster-c1
    user: user-c1
current-context: context-c1
"#;

    struct StubControlPlane;

    fn cluster(id: &str) -> ClusterSummary {
        ClusterSummary {
            id: id.into(),
            name: format!("{}-name", id),
            compartment_id: Some("comp-1".into()),
            kubernetes_version: Some("v1.30.1".into()),
            lifecycle_state: Some("ACTIVE".into()),
            endpoints: None,
        }
    }

    #[async_trait]
    impl ControlPlane for StubControlPlane {
        async fn create_kubeconfig(
            &self,
            _cluster_id: &str,
            _request: &KubeconfigRequest,
            _ctx: &CredentialContext,
        ) -> Result<KubeconfigPayload> {
            Ok(KubeconfigPayload::Encoded(KUBECONFIG.into()))
        }

        async fn list_clusters(
            &self,
            _compartment_id: &str,
            page: Option<&str>,
            _limit: Option<u32>,
            _ctx: &CredentialContext,
        ) -> Result<ControlPlanePage<ClusterSummary>> {
            Ok(match page {
                None => ControlPlanePage { items: vec![cluster("c1")], next: Some("p2".into()) },
                Some(_) => ControlPlanePage { items: vec![cluster("c2")], next: None },
            })
        }

        async fn get_cluster(&self, cluster_id: &str, _ctx: &CredentialContext) -> Result<ClusterSummary> {
            Ok(cluster(cluster_id))
        }

        async fn list_node_pools(
            &self,
            compartment_id: &str,
            cluster_id: Option<&str>,
            _page: Option<&str>,
            _limit: Option<u32>,
            _ctx: &CredentialContext,
        ) -> Result<ControlPlanePage<NodePoolSummary>> {
            Ok(ControlPlanePage {
                items: vec![NodePoolSummary {
                    id: "np1".into(),
                    name: "pool".into(),
                    cluster_id: cluster_id.map(str::to_string),
                    compartment_id: Some(compartment_id.into()),
                    kubernetes_version: None,
                    lifecycle_state: Some("ACTIVE".into()),
                    node_shape: Some("VM.Standard.E4.Flex".into()),
                }],
                next: None,
            })
        }

        async fn get_node_pool(&self, node_pool_id: &str, _ctx: &CredentialContext) -> Result<NodePoolSummary> {
            Err(CoreError::NotFound(format!("node pool {}", node_pool_id)))
        }
    }

    /// Hands out one mock client per build
    struct MockFactory {
        clients: Mutex<Vec<Client>>,
    }

    #[async_trait]
    impl ClientFactory for MockFactory {
        async fn create(&self, _document: KubeconfigDocument) -> Result<Client> {
            self.clients
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| CoreError::Upstream { status: 500, message: "no client queued".into() })
        }
    }

    struct Fixture {
        _dir: TempDir,
        token: String,
        router: ToolRouter,
    }

    fn fixture(clients: Vec<Client>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
        let token = format!("{}.{}.c2lnbmF0dXJl", header, payload);
        let token_path = dir.path().join("token");
        fs::write(&token_path, &token).unwrap();
        let config_file = dir.path().join("config");
        fs::write(
            &config_file,
            format!(
                "[SESSION]\nregion = us-ashburn-1\nsecurity_token_file = {}\n",
                token_path.display()
            ),
        )
        .unwrap();

        let config = SessionConfig {
            resolver: ResolverConfig {
                config_file: Some(config_file),
                profile: Some("SESSION".into()),
                region: None,
            },
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let env = Environment::default();
        let session = Session::with_parts(
            &config,
            DefaultsStore::in_memory(env.clone()),
            CredentialResolver::new(config.resolver.clone(), env),
            Arc::new(StubControlPlane),
            Arc::new(MockFactory { clients: Mutex::new(clients) }),
        );
        Fixture {
            _dir: dir,
            token,
            router: ToolRouter::new(Arc::new(session)),
        }
    }

    fn mock_client() -> (Client, MockHandle) {
        let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        (Client::new(service, "default"), handle)
    }

    /// Answer one request, returning its path and query
    async fn serve(mut handle: MockHandle, status: StatusCode, body: Vec<u8>) -> String {
        let (request, send) = handle.next_request().await.expect("request");
        let target = request.uri().to_string();
        send.send_response(Response::builder().status(status).body(Body::from(body)).unwrap());
        target
    }

    fn to_json(envelope: &ToolEnvelope) -> Value {
        serde_json::to_value(envelope).unwrap()
    }

    fn pod_list() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": {"continue": "tok-2"},
            "items": [{
                "metadata": {
                    "name": "web-6d4-abc",
                    "namespace": "default",
                    "managedFields": [{"manager": "kubectl"}],
                    "ownerReferences": [
                        {"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web-6d4", "uid": "u1", "controller": true}
                    ]
                },
                "spec": {"containers": [{"name": "app", "image": "nginx"}]}
            }]
        }))
        .unwrap()
    }

    fn status(code: u16, message: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": "Unknown",
            "code": code,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_tool_is_validation_error() {
        let f = fixture(vec![]);
        let out = to_json(&f.router.call("kubectl_delete", json!({})).await);
        assert_eq!(out["error"]["code"], "ValidationError");
        assert!(out["item"].is_null());
    }

    #[tokio::test]
    async fn test_defaults_round_trip_through_tools() {
        let f = fixture(vec![]);
        let out = to_json(
            &f.router
                .call("config_set_defaults", json!({"compartmentId": "comp-a", "cluster_id": "c1"}))
                .await,
        );
        assert!(out["error"].is_null());
        assert_eq!(out["item"]["compartment_id"], "comp-a");

        let out = to_json(&f.router.call("config_get_effective_defaults", Value::Null).await);
        assert_eq!(out["item"]["cluster_id"], "c1");
        assert_eq!(out["meta"]["stored"]["compartment_id"], "comp-a");

        let out = to_json(&f.router.call("config_reset_defaults", json!({})).await);
        assert!(out["item"]["cluster_id"].is_null());

        let out = to_json(&f.router.call("config_set_defaults", json!({"cluster_id": "  "})).await);
        assert_eq!(out["error"]["code"], "ValidationError");
    }

    #[tokio::test]
    async fn test_k8s_list_pods_with_cold_cache() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let server = tokio::spawn(serve(handle, StatusCode::OK, pod_list()));

        let out = to_json(
            &f.router
                .call(
                    "k8s_list",
                    json!({"kind": "pods", "namespace": "default", "limit": 2, "clusterId": "c1"}),
                )
                .await,
        );
        let target = server.await.unwrap();

        assert!(target.starts_with("/api/v1/namespaces/default/pods"));
        assert!(target.contains("limit=2"));
        assert!(out["error"].is_null());
        assert_eq!(out["next"], "tok-2");
        assert_eq!(out["items"][0]["name"], "web-6d4-abc");
        assert_eq!(out["items"][0]["ready"], "0/1");
        assert!(out["items"][0]["metadata"].is_null());
        assert_eq!(out["meta"]["limit"], 2);
        assert_eq!(out["meta"]["view"], "summary");
        assert_eq!(
            out["meta"]["hints"]["edges"][0],
            json!({"from": "ReplicaSet/default/web-6d4", "to": "Pod/default/web-6d4-abc", "type": "controls"})
        );
    }

    #[tokio::test]
    async fn test_k8s_list_full_objects_on_request() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let server = tokio::spawn(serve(handle, StatusCode::OK, pod_list()));

        let out = to_json(
            &f.router
                .call("k8s_list", json!({"kind": "pods", "cluster_id": "c1", "full": true}))
                .await,
        );
        server.await.unwrap();
        assert_eq!(out["items"][0]["metadata"]["name"], "web-6d4-abc");
        assert_eq!(out["items"][0]["spec"]["containers"][0]["image"], "nginx");
        assert!(out["items"][0]["metadata"]["managedFields"].is_null());
        assert_eq!(out["meta"]["view"], "full");
    }

    #[tokio::test]
    async fn test_k8s_list_services_hint_selected_pods() {
        let (client, mut handle) = mock_client();
        let f = fixture(vec![client]);
        let server = tokio::spawn(async move {
            let services = json!({
                "apiVersion": "v1",
                "kind": "ServiceList",
                "metadata": {},
                "items": [{
                    "metadata": {"name": "web", "namespace": "default"},
                    "spec": {"type": "ClusterIP", "clusterIP": "10.96.0.10", "selector": {"app": "web"}, "ports": [{"port": 80}]}
                }]
            });
            let (_, send) = handle.next_request().await.expect("services");
            send.send_response(Response::builder().body(Body::from(serde_json::to_vec(&services).unwrap())).unwrap());

            let (request, send) = handle.next_request().await.expect("selected pods");
            let target = request.uri().to_string();
            send.send_response(Response::builder().body(Body::from(pod_list())).unwrap());
            target
        });

        let out = to_json(
            &f.router
                .call("k8s_list", json!({"kind": "svc", "namespace": "default", "cluster_id": "c1", "limit": 3}))
                .await,
        );
        let pods_target = server.await.unwrap();

        assert!(pods_target.starts_with("/api/v1/namespaces/default/pods"));
        assert!(pods_target.contains("labelSelector=app%3Dweb"));
        assert!(pods_target.contains("limit=3"));
        assert_eq!(out["items"][0]["ports"], json!(["80/TCP"]));
        assert_eq!(
            out["meta"]["hints"]["edges"],
            json!([{"from": "Service/default/web", "to": "Pod/default/web-6d4-abc", "type": "selects"}])
        );
    }

    #[tokio::test]
    async fn test_k8s_list_without_hints() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let server = tokio::spawn(serve(handle, StatusCode::OK, pod_list()));

        let out = to_json(
            &f.router
                .call("k8s_list", json!({"kind": "po", "cluster_id": "c1", "hints": false}))
                .await,
        );
        let target = server.await.unwrap();
        assert!(target.starts_with("/api/v1/pods"));
        assert!(out["meta"]["hints"].is_null());
    }

    #[tokio::test]
    async fn test_k8s_list_unknown_kind_keeps_list_shape() {
        let f = fixture(vec![]);
        let out = to_json(&f.router.call("k8s_list", json!({"kind": "widgets", "cluster_id": "c1"})).await);
        assert_eq!(out["error"]["code"], "ValidationError");
        assert!(out["items"].is_null());
        assert!(out["next"].is_null());
    }

    #[tokio::test]
    async fn test_k8s_list_without_cluster_is_config_error() {
        let f = fixture(vec![]);
        let out = to_json(&f.router.call("k8s_list", json!({"kind": "pods"})).await);
        assert_eq!(out["error"]["code"], "ConfigError");
        assert!(out["error"]["message"].as_str().unwrap().contains("cluster_id"));
    }

    #[tokio::test]
    async fn test_k8s_get_missing_object() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let server = tokio::spawn(serve(handle, StatusCode::NOT_FOUND, status(404, "pods \"nope\" not found")));

        let out = to_json(
            &f.router
                .call("k8s_get", json!({"kind": "Pod", "name": "nope", "cluster_id": "c1"}))
                .await,
        );
        let target = server.await.unwrap();
        assert!(target.starts_with("/api/v1/namespaces/default/pods/nope"));
        assert_eq!(out["error"]["code"], "NotFoundError");
    }

    #[tokio::test]
    async fn test_pod_logs_carry_summary() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let body = b"2024-03-01T12:00:01Z INFO starting\n2024-03-01T12:00:02Z ERROR boom\n".to_vec();
        let server = tokio::spawn(serve(handle, StatusCode::OK, body));

        let out = to_json(
            &f.router
                .call(
                    "oke_get_pod_logs",
                    json!({"pod": "api-0", "namespace": "prod", "tailLines": 50, "cluster_id": "c1"}),
                )
                .await,
        );
        let target = server.await.unwrap();
        assert!(target.starts_with("/api/v1/namespaces/prod/pods/api-0/log"));
        assert!(target.contains("tailLines=50"));
        assert!(out["item"]["log"].as_str().unwrap().contains("boom"));
        assert_eq!(out["meta"]["summary"]["lines"], 2);
        assert_eq!(out["meta"]["summary"]["levels"]["error"], 1);
        assert_eq!(out["meta"]["problem_lines"], 1);
    }

    #[tokio::test]
    async fn test_pod_logs_kubelet_unreachable() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let server = tokio::spawn(serve(
            handle,
            StatusCode::INTERNAL_SERVER_ERROR,
            status(500, "dial tcp 10.0.10.5:10250: i/o timeout"),
        ));

        let out = to_json(
            &f.router
                .call("oke_get_pod_logs", json!({"pod": "api-0", "cluster_id": "c1"}))
                .await,
        );
        server.await.unwrap();
        assert_eq!(out["error"]["code"], "NetworkTimeout");
        assert!(out["item"].is_null());
    }

    #[tokio::test]
    async fn test_metrics_api_absent_is_not_an_error() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let server = tokio::spawn(serve(handle, StatusCode::NOT_FOUND, status(404, "the server could not find the requested resource")));

        let out = to_json(&f.router.call("oke_list_node_metrics", json!({"cluster_id": "c1"})).await);
        let target = server.await.unwrap();
        assert!(target.starts_with("/apis/metrics.k8s.io/v1beta1/nodes"));
        assert!(out["error"].is_null());
        assert_eq!(out["items"], json!([]));
        assert_eq!(out["meta"]["available"], false);
    }

    #[tokio::test]
    async fn test_events_for_one_object() {
        let (client, handle) = mock_client();
        let f = fixture(vec![client]);
        let long_message = "x".repeat(800);
        let body = serde_json::to_vec(&json!({
            "apiVersion": "v1",
            "kind": "EventList",
            "metadata": {},
            "items": [{
                "metadata": {"name": "api-0.1", "namespace": "prod"},
                "involvedObject": {"kind": "Pod", "name": "api-0", "namespace": "prod"},
                "reason": "BackOff",
                "type": "Warning",
                "message": long_message,
                "count": 4,
                "lastTimestamp": "2024-03-01T12:00:00Z"
            }]
        }))
        .unwrap();
        let server = tokio::spawn(serve(handle, StatusCode::OK, body));

        let out = to_json(
            &f.router
                .call(
                    "oke_list_events",
                    json!({"namespace": "prod", "kind": "Pod", "name": "api-0", "cluster_id": "c1"}),
                )
                .await,
        );
        let target = server.await.unwrap();
        assert!(target.starts_with("/api/v1/namespaces/prod/events"));
        assert!(target.contains("fieldSelector="));
        assert_eq!(out["items"][0]["reason"], "BackOff");
        assert_eq!(out["items"][0]["message"].as_str().unwrap().len(), 500);
        assert_eq!(out["meta"]["namespace"], "prod");
    }

    #[tokio::test]
    async fn test_get_cluster_uses_stored_default() {
        let f = fixture(vec![]);
        let out = to_json(&f.router.call("oke_get_cluster", json!({})).await);
        assert_eq!(out["error"]["code"], "ConfigError");

        f.router
            .call("config_set_defaults", json!({"clusterId": "c7"}))
            .await;
        let out = to_json(&f.router.call("oke_get_cluster", json!({})).await);
        assert_eq!(out["item"]["id"], "c7");
        assert_eq!(out["item"]["lifecycle_state"], "ACTIVE");
    }

    #[tokio::test]
    async fn test_auth_refresh_reports_mode_only() {
        let f = fixture(vec![]);
        let envelope = f.router.call("auth_refresh", json!({})).await;
        let out = to_json(&envelope);
        assert_eq!(out["item"], json!({"refreshed": true, "mode": "security_token", "profile": "SESSION"}));
        assert!(!serde_json::to_string(&envelope).unwrap().contains(&f.token));
    }

    #[tokio::test]
    async fn test_auth_refresh_honours_requested_mode() {
        let f = fixture(vec![]);
        // The profile only carries a session token, so api_key has no signer
        let out = to_json(&f.router.call("auth_refresh", json!({"auth": "api_key"})).await);
        assert_eq!(out["error"]["code"], "AuthError");
        assert!(out["error"]["message"].as_str().unwrap().contains("missing tenancy"));

        let out = to_json(&f.router.call("auth_refresh", json!({"auth": "security_token"})).await);
        assert_eq!(out["item"]["mode"], "security_token");

        let out = to_json(&f.router.call("auth_refresh", json!({"auth": "password"})).await);
        assert_eq!(out["error"]["code"], "ValidationError");
    }

    #[tokio::test]
    async fn test_list_clusters_requires_compartment_then_pages() {
        let f = fixture(vec![]);
        let out = to_json(&f.router.call("oke_list_clusters", json!({})).await);
        assert_eq!(out["error"]["code"], "ConfigError");
        assert!(out["items"].is_null());

        let out = to_json(&f.router.call("oke_list_clusters", json!({"compartmentId": "comp-1"})).await);
        assert_eq!(out["items"][0]["id"], "c1");
        assert_eq!(out["next"], "p2");

        let out = to_json(
            &f.router
                .call("oke_list_clusters", json!({"compartment_id": "comp-1", "page": "p2"}))
                .await,
        );
        assert_eq!(out["items"][0]["id"], "c2");
        assert!(out["next"].is_null());
    }

    #[tokio::test]
    async fn test_node_pool_tools() {
        let f = fixture(vec![]);
        let out = to_json(&f.router.call("oke_list_node_pools", json!({"cluster_id": "c9"})).await);
        assert_eq!(out["items"][0]["compartment_id"], "comp-1");
        assert_eq!(out["items"][0]["cluster_id"], "c9");

        let out = to_json(&f.router.call("oke_get_node_pool", json!({"nodePoolId": "np-x"})).await);
        assert_eq!(out["error"]["code"], "NotFoundError");
    }

    #[tokio::test]
    async fn test_meta_health() {
        let f = fixture(vec![]);
        let out = to_json(&f.router.call("meta_health", json!({})).await);
        assert_eq!(out["item"]["status"], "ok");
        assert_eq!(out["item"]["effective_credential_mode"], "security_token");
        assert_eq!(out["error"], Value::Null);
    }
}
