//! Compact per-kind views of cluster objects
//!
//! Lists and gets answer with these by default: identity, the handful of
//! status fields an operator reads first, and the creation time. The full
//! object, minus `managedFields`, is returned only on request.

use serde_json::{Map, Value, json};

use crate::kinds::ResourceKind;
use crate::resources::summarize_event;

const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";
const NODE_ROLE_PREFIX: &str = "node-role.kubernetes.io/";

/// How much of each object a response carries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Summary,
    Full,
}

impl View {
    pub fn new(full: bool) -> Self {
        if full { Self::Full } else { Self::Summary }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Full => "full",
        }
    }

    pub fn apply(self, kind: ResourceKind, object: Value) -> Value {
        match self {
            Self::Full => object,
            Self::Summary => summarize(kind, &object),
        }
    }
}

/// Trimmed view of one object of `kind`
pub fn summarize(kind: ResourceKind, object: &Value) -> Value {
    if kind == ResourceKind::Event {
        return summarize_event(object);
    }

    let metadata = &object["metadata"];
    let mut summary = Map::new();
    summary.insert("name".into(), metadata["name"].clone());
    if kind.is_namespaced() {
        summary.insert("namespace".into(), metadata["namespace"].clone());
    }
    if let Value::Object(fields) = details(kind, object) {
        summary.extend(fields);
    }
    summary.insert("created_at".into(), metadata["creationTimestamp"].clone());
    Value::Object(summary)
}

fn details(kind: ResourceKind, object: &Value) -> Value {
    let spec = &object["spec"];
    let status = &object["status"];
    match kind {
        ResourceKind::Pod => pod(spec, status),
        ResourceKind::Deployment => json!({
            "replicas": spec["replicas"],
            "ready": count(&status["readyReplicas"]),
            "available": count(&status["availableReplicas"]),
            "updated": count(&status["updatedReplicas"]),
        }),
        ResourceKind::ReplicaSet | ResourceKind::StatefulSet => json!({
            "replicas": spec["replicas"],
            "ready": count(&status["readyReplicas"]),
        }),
        ResourceKind::DaemonSet => json!({
            "desired": count(&status["desiredNumberScheduled"]),
            "ready": count(&status["numberReady"]),
            "available": count(&status["numberAvailable"]),
        }),
        ResourceKind::Job => json!({
            "completions": spec["completions"],
            "active": count(&status["active"]),
            "succeeded": count(&status["succeeded"]),
            "failed": count(&status["failed"]),
        }),
        ResourceKind::CronJob => json!({
            "schedule": spec["schedule"],
            "suspend": spec["suspend"].as_bool().unwrap_or(false),
            "active": status["active"].as_array().map_or(0, Vec::len),
            "last_schedule": status["lastScheduleTime"],
        }),
        ResourceKind::HorizontalPodAutoscaler => {
            let target = &spec["scaleTargetRef"];
            let target = match (target["kind"].as_str(), target["name"].as_str()) {
                (Some(kind), Some(name)) => Value::String(format!("{}/{}", kind, name)),
                _ => Value::Null,
            };
            json!({
                "target": target,
                "min_replicas": spec["minReplicas"].as_i64().unwrap_or(1),
                "max_replicas": spec["maxReplicas"],
                "current_replicas": count(&status["currentReplicas"]),
                "desired_replicas": count(&status["desiredReplicas"]),
            })
        }
        ResourceKind::Service => {
            let ports: Vec<String> = array(&spec["ports"]).iter().map(service_port).collect();
            json!({
                "type": spec["type"],
                "cluster_ip": spec["clusterIP"],
                "ports": ports,
                "selector": spec["selector"],
            })
        }
        ResourceKind::Endpoints => {
            let subsets = array(&object["subsets"]);
            let sum = |key: &str| -> usize { subsets.iter().map(|s| array(&s[key]).len()).sum() };
            json!({
                "ready_addresses": sum("addresses"),
                "not_ready_addresses": sum("notReadyAddresses"),
            })
        }
        ResourceKind::EndpointSlice => {
            let endpoints = array(&object["endpoints"]);
            let ready = endpoints
                .iter()
                .filter(|e| e["conditions"]["ready"].as_bool() != Some(false))
                .count();
            json!({
                "address_type": object["addressType"],
                "endpoints": endpoints.len(),
                "ready": ready,
            })
        }
        ResourceKind::Ingress => {
            let hosts: Vec<&str> = array(&spec["rules"])
                .iter()
                .filter_map(|rule| rule["host"].as_str())
                .collect();
            json!({ "class": spec["ingressClassName"], "hosts": hosts })
        }
        ResourceKind::NetworkPolicy => json!({
            "pod_selector": spec["podSelector"],
            "policy_types": spec["policyTypes"],
        }),
        ResourceKind::PersistentVolumeClaim => json!({
            "phase": status["phase"],
            "capacity": status["capacity"]["storage"],
            "storage_class": spec["storageClassName"],
            "volume": spec["volumeName"],
        }),
        ResourceKind::PersistentVolume => {
            let claim = &spec["claimRef"];
            let claim = match (claim["namespace"].as_str(), claim["name"].as_str()) {
                (Some(ns), Some(name)) => Value::String(format!("{}/{}", ns, name)),
                _ => Value::Null,
            };
            json!({
                "phase": status["phase"],
                "capacity": spec["capacity"]["storage"],
                "storage_class": spec["storageClassName"],
                "claim": claim,
                "reclaim_policy": spec["persistentVolumeReclaimPolicy"],
            })
        }
        ResourceKind::StorageClass => json!({
            "provisioner": object["provisioner"],
            "reclaim_policy": object["reclaimPolicy"],
            "default": object["metadata"]["annotations"][DEFAULT_CLASS_ANNOTATION].as_str() == Some("true"),
        }),
        ResourceKind::Namespace => json!({ "phase": status["phase"] }),
        ResourceKind::Node => node(object),
        ResourceKind::Event => Value::Null,
    }
}

fn pod(spec: &Value, status: &Value) -> Value {
    let statuses = array(&status["containerStatuses"]);
    let total = spec["containers"].as_array().map_or(statuses.len(), Vec::len);
    let ready = statuses
        .iter()
        .filter(|c| c["ready"].as_bool() == Some(true))
        .count();
    let restarts: i64 = statuses.iter().map(|c| count(&c["restartCount"])).sum();
    json!({
        "phase": status["phase"],
        "ready": format!("{}/{}", ready, total),
        "restarts": restarts,
        "node": spec["nodeName"],
        "pod_ip": status["podIP"],
    })
}

fn node(object: &Value) -> Value {
    let status = &object["status"];
    let ready = array(&status["conditions"])
        .iter()
        .find(|c| c["type"] == "Ready")
        .and_then(|c| c["status"].as_str())
        .map(|s| s == "True");
    let internal_ip = array(&status["addresses"])
        .iter()
        .find(|a| a["type"] == "InternalIP")
        .map(|a| a["address"].clone())
        .unwrap_or(Value::Null);
    let roles: Vec<&str> = object["metadata"]["labels"]
        .as_object()
        .into_iter()
        .flat_map(|labels| labels.keys())
        .filter_map(|key| key.strip_prefix(NODE_ROLE_PREFIX))
        .collect();
    json!({
        "ready": ready,
        "roles": roles,
        "unschedulable": object["spec"]["unschedulable"].as_bool().unwrap_or(false),
        "kubelet_version": status["nodeInfo"]["kubeletVersion"],
        "internal_ip": internal_ip,
    })
}

/// `80/TCP`, or `80:8080/TCP` when the target port differs
fn service_port(port: &Value) -> String {
    let number = &port["port"];
    let protocol = port["protocol"].as_str().unwrap_or("TCP");
    match &port["targetPort"] {
        Value::Null => format!("{}/{}", number, protocol),
        target if target == number => format!("{}/{}", number, protocol),
        Value::String(name) => format!("{}:{}/{}", number, name, protocol),
        target => format!("{}:{}/{}", number, target, protocol),
    }
}

fn array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn count(value: &Value) -> i64 {
    value.as_i64().unwrap_or(0)
}
