//! Read-only access to cluster resources
//!
//! Lists return one page at a time; the continuation token is handed back
//! verbatim so callers can resume. Objects are returned as JSON with
//! `managedFields` removed; see `summary` for the trimmed views.

use kube::api::{Api, DynamicObject, ListParams};
use kube::core::{ApiResource, GroupVersionKind, TypeMeta};
use kube::Client;
use serde_json::{Value, json};

use okemcp_types::{CoreError, Page, Result};

use crate::errors::from_kube;
use crate::kinds::ResourceKind;

pub const DEFAULT_LIST_LIMIT: u32 = 20;
pub const MAX_LIST_LIMIT: u32 = 200;
pub const DEFAULT_NAMESPACE: &str = "default";
/// Event messages are truncated to this many characters
pub const EVENT_MESSAGE_CHARS: usize = 500;

/// Requested page size clamped to `[1, MAX_LIST_LIMIT]`
pub fn effective_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub namespace: Option<String>,
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListRequest {
    pub fn list_params(&self) -> ListParams {
        let mut params = ListParams::default().limit(effective_limit(self.limit));
        if let Some(token) = self.continue_token.as_deref().filter(|t| !t.is_empty()) {
            params = params.continue_token(token);
        }
        if let Some(labels) = self.label_selector.as_deref().filter(|s| !s.is_empty()) {
            params = params.labels(labels);
        }
        if let Some(fields) = self.field_selector.as_deref().filter(|s| !s.is_empty()) {
            params = params.fields(fields);
        }
        params
    }
}

/// Metrics availability and samples
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsReport {
    pub available: bool,
    pub reason: Option<String>,
    pub page: Page,
}

/// Resource operations against one cluster client
#[derive(Clone)]
pub struct ResourceReader {
    client: Client,
}

impl ResourceReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespaced: bool, namespace: Option<&str>) -> Api<DynamicObject> {
        match (namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, resource),
            _ => Api::all_with(self.client.clone(), resource),
        }
    }

    /// One page of `kind`; without a namespace, namespaced kinds list across all namespaces
    pub async fn list(&self, kind: ResourceKind, request: &ListRequest) -> Result<Page> {
        let resource = kind.api_resource();
        let namespace = request.namespace.as_deref().filter(|ns| !ns.is_empty());
        if namespace.is_some() && !kind.is_namespaced() {
            tracing::debug!(kind = %kind, "Ignoring namespace for cluster-scoped kind");
        }

        let api = self.api(&resource, kind.is_namespaced(), namespace);
        let list = api
            .list(&request.list_params())
            .await
            .map_err(|e| from_kube(e, &format!("list {}", kind)))?;

        let next = list.metadata.continue_.clone();
        let items = list
            .items
            .into_iter()
            .map(|obj| object_to_value(obj, &resource))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(kind = %kind, count = items.len(), more = next.is_some(), "Listed resources");
        Ok(Page::new(items, next))
    }

    /// Single object; namespaced kinds default to the `default` namespace
    pub async fn get(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Result<Value> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("name is required".into()));
        }
        let resource = kind.api_resource();
        let namespace = kind
            .is_namespaced()
            .then(|| namespace.filter(|ns| !ns.is_empty()).unwrap_or(DEFAULT_NAMESPACE));
        let target = match namespace {
            Some(ns) => format!("{} {}/{}", kind, ns, name),
            None => format!("{} {}", kind, name),
        };

        let api = self.api(&resource, kind.is_namespaced(), namespace);
        match api
            .get_opt(name)
            .await
            .map_err(|e| from_kube(e, &format!("get {}", target)))?
        {
            Some(obj) => object_to_value(obj, &resource),
            None => Err(CoreError::NotFound(target)),
        }
    }

    /// Core events, optionally narrowed to one involved object, newest first
    pub async fn events(
        &self,
        request: &ListRequest,
        involved_kind: Option<&str>,
        involved_name: Option<&str>,
    ) -> Result<Page> {
        let mut selectors: Vec<String> = request
            .field_selector
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        if let Some(kind) = involved_kind.filter(|k| !k.is_empty()) {
            selectors.push(format!("involvedObject.kind={}", kind));
        }
        if let Some(name) = involved_name.filter(|n| !n.is_empty()) {
            selectors.push(format!("involvedObject.name={}", name));
        }
        let request = ListRequest {
            field_selector: (!selectors.is_empty()).then(|| selectors.join(",")),
            ..request.clone()
        };

        let page = self.list(ResourceKind::Event, &request).await?;
        let mut items: Vec<Value> = page.items.iter().map(summarize_event).collect();
        items.sort_by(|a, b| {
            let ts = |v: &Value| v["last_timestamp"].as_str().unwrap_or_default().to_string();
            ts(b).cmp(&ts(a))
        });
        Ok(Page::new(items, page.next))
    }

    /// `selects` edges from each Service to the pods its selector matches,
    /// at most `limit` pods per service. A failed lookup only drops that
    /// service's edges.
    pub async fn selector_edges(&self, services: &[Value], limit: u32) -> Vec<Value> {
        let mut edges = Vec::new();
        for service in services {
            let metadata = &service["metadata"];
            let (Some(name), Some(namespace)) = (metadata["name"].as_str(), metadata["namespace"].as_str())
            else {
                continue;
            };
            let Some(selector) = label_selector(&service["spec"]["selector"]) else {
                continue;
            };

            let request = ListRequest {
                namespace: Some(namespace.to_string()),
                limit: Some(limit),
                label_selector: Some(selector),
                ..Default::default()
            };
            let pods = match self.list(ResourceKind::Pod, &request).await {
                Ok(page) => page.items,
                Err(e) => {
                    tracing::debug!(service = name, namespace, error = %e, "Skipping selector lookup");
                    continue;
                }
            };

            let from = object_id(ResourceKind::Service.name(), Some(namespace), name);
            for pod in &pods {
                if let Some(pod_name) = pod["metadata"]["name"].as_str() {
                    edges.push(json!({
                        "from": from,
                        "to": object_id(ResourceKind::Pod.name(), Some(namespace), pod_name),
                        "type": "selects",
                    }));
                }
            }
        }
        edges
    }

    pub async fn node_metrics(&self, request: &ListRequest) -> Result<MetricsReport> {
        self.metrics("NodeMetrics", "nodes", false, request).await
    }

    pub async fn pod_metrics(&self, request: &ListRequest) -> Result<MetricsReport> {
        self.metrics("PodMetrics", "pods", true, request).await
    }

    /// `metrics.k8s.io` samples; a missing or unavailable metrics API is
    /// reported as `available: false` rather than an error
    async fn metrics(
        &self,
        kind: &str,
        plural: &str,
        namespaced: bool,
        request: &ListRequest,
    ) -> Result<MetricsReport> {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, plural);
        let namespace = request.namespace.as_deref().filter(|ns| !ns.is_empty());
        let api = self.api(&resource, namespaced, namespace);

        match api.list(&request.list_params()).await {
            Ok(list) => {
                let next = list.metadata.continue_.clone();
                let items = list
                    .items
                    .into_iter()
                    .map(|obj| object_to_value(obj, &resource))
                    .collect::<Result<Vec<_>>>()?;
                Ok(MetricsReport {
                    available: true,
                    reason: None,
                    page: Page::new(items, next),
                })
            }
            Err(e) => match from_kube(e, &format!("list {}", plural)) {
                CoreError::NotFound(msg) => Ok(unavailable(msg)),
                CoreError::Upstream { status: 503, message } => Ok(unavailable(message)),
                other => Err(other),
            },
        }
    }
}

fn unavailable(reason: String) -> MetricsReport {
    tracing::debug!(reason = %reason, "Metrics API unavailable");
    MetricsReport {
        available: false,
        reason: Some(format!("metrics API not available: {}", reason)),
        page: Page::default(),
    }
}

fn object_to_value(mut obj: DynamicObject, resource: &ApiResource) -> Result<Value> {
    obj.metadata.managed_fields = None;
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    serde_json::to_value(&obj).map_err(|e| CoreError::Upstream {
        status: 502,
        message: format!("could not encode {}: {}", resource.kind, e),
    })
}

pub(crate) fn summarize_event(event: &Value) -> Value {
    let message: String = event["message"]
        .as_str()
        .unwrap_or_default()
        .chars()
        .take(EVENT_MESSAGE_CHARS)
        .collect();
    let last = event["lastTimestamp"]
        .as_str()
        .or_else(|| event["eventTime"].as_str())
        .or_else(|| event["metadata"]["creationTimestamp"].as_str());
    json!({
        "type": event["type"],
        "reason": event["reason"],
        "message": message,
        "count": event["count"],
        "first_timestamp": event["firstTimestamp"],
        "last_timestamp": last,
        "namespace": event["metadata"]["namespace"],
        "involved_object": {
            "kind": event["involvedObject"]["kind"],
            "name": event["involvedObject"]["name"],
            "namespace": event["involvedObject"]["namespace"],
        },
    })
}

// ============================================================================
// Relationship hints
// ============================================================================

fn object_id(kind: &str, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{}/{}", kind, ns, name),
        None => format!("{}/{}", kind, name),
    }
}

/// `k=v,k2=v2` from a Service selector map; `None` when it selects nothing
fn label_selector(selector: &Value) -> Option<String> {
    let mut pairs: Vec<String> = selector
        .as_object()?
        .iter()
        .filter_map(|(key, value)| value.as_str().map(|v| format!("{}={}", key, v)))
        .collect();
    pairs.sort();
    (!pairs.is_empty()).then(|| pairs.join(","))
}

/// Edges derivable from the returned items alone: owner references
/// (`controls` for the managing controller, `owns` otherwise) and HPA
/// scale targets (`targets`)
pub fn relationship_edges(kind: ResourceKind, items: &[Value]) -> Vec<Value> {
    let mut edges = Vec::new();
    for item in items {
        let metadata = &item["metadata"];
        let Some(name) = metadata["name"].as_str() else {
            continue;
        };
        let namespace = metadata["namespace"].as_str();
        let this = object_id(kind.name(), namespace, name);

        for owner in metadata["ownerReferences"].as_array().into_iter().flatten() {
            let (Some(owner_kind), Some(owner_name)) = (owner["kind"].as_str(), owner["name"].as_str())
            else {
                continue;
            };
            let relation = if owner["controller"].as_bool() == Some(true) {
                "controls"
            } else {
                "owns"
            };
            edges.push(json!({
                "from": object_id(owner_kind, namespace, owner_name),
                "to": this,
                "type": relation,
            }));
        }

        if kind == ResourceKind::HorizontalPodAutoscaler {
            let target = &item["spec"]["scaleTargetRef"];
            if let (Some(target_kind), Some(target_name)) = (target["kind"].as_str(), target["name"].as_str()) {
                edges.push(json!({
                    "from": this,
                    "to": object_id(target_kind, namespace, target_name),
                    "type": "targets",
                }));
            }
        }
    }
    edges
}
