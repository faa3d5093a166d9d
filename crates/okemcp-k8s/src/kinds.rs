//! Supported resource kinds

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Endpoints, Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Service,
};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::core::ApiResource;
use std::fmt;
use std::str::FromStr;

use okemcp_types::CoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    HorizontalPodAutoscaler,
    Service,
    Endpoints,
    EndpointSlice,
    Ingress,
    NetworkPolicy,
    PersistentVolumeClaim,
    PersistentVolume,
    StorageClass,
    Namespace,
    Node,
    Event,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 19] = [
        Self::Pod,
        Self::Deployment,
        Self::ReplicaSet,
        Self::StatefulSet,
        Self::DaemonSet,
        Self::Job,
        Self::CronJob,
        Self::HorizontalPodAutoscaler,
        Self::Service,
        Self::Endpoints,
        Self::EndpointSlice,
        Self::Ingress,
        Self::NetworkPolicy,
        Self::PersistentVolumeClaim,
        Self::PersistentVolume,
        Self::StorageClass,
        Self::Namespace,
        Self::Node,
        Self::Event,
    ];

    /// Canonical Kubernetes kind name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::ReplicaSet => "ReplicaSet",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            Self::Service => "Service",
            Self::Endpoints => "Endpoints",
            Self::EndpointSlice => "EndpointSlice",
            Self::Ingress => "Ingress",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::PersistentVolume => "PersistentVolume",
            Self::StorageClass => "StorageClass",
            Self::Namespace => "Namespace",
            Self::Node => "Node",
            Self::Event => "Event",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            Self::PersistentVolume | Self::StorageClass | Self::Namespace | Self::Node
        )
    }

    pub fn api_resource(&self) -> ApiResource {
        match self {
            Self::Pod => ApiResource::erase::<Pod>(&()),
            Self::Deployment => ApiResource::erase::<Deployment>(&()),
            Self::ReplicaSet => ApiResource::erase::<ReplicaSet>(&()),
            Self::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
            Self::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
            Self::Job => ApiResource::erase::<Job>(&()),
            Self::CronJob => ApiResource::erase::<CronJob>(&()),
            Self::HorizontalPodAutoscaler => {
                ApiResource::erase::<HorizontalPodAutoscaler>(&())
            }
            Self::Service => ApiResource::erase::<Service>(&()),
            Self::Endpoints => ApiResource::erase::<Endpoints>(&()),
            Self::EndpointSlice => ApiResource::erase::<EndpointSlice>(&()),
            Self::Ingress => ApiResource::erase::<Ingress>(&()),
            Self::NetworkPolicy => ApiResource::erase::<NetworkPolicy>(&()),
            Self::PersistentVolumeClaim => {
                ApiResource::erase::<PersistentVolumeClaim>(&())
            }
            Self::PersistentVolume => ApiResource::erase::<PersistentVolume>(&()),
            Self::StorageClass => ApiResource::erase::<StorageClass>(&()),
            Self::Namespace => ApiResource::erase::<Namespace>(&()),
            Self::Node => ApiResource::erase::<Node>(&()),
            Self::Event => ApiResource::erase::<Event>(&()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    /// Accepts kind names, plurals and kubectl short names, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_lowercase().as_str() {
            "pod" | "pods" | "po" => Self::Pod,
            "deployment" | "deployments" | "deploy" => Self::Deployment,
            "replicaset" | "replicasets" | "rs" => Self::ReplicaSet,
            "statefulset" | "statefulsets" | "sts" => Self::StatefulSet,
            "daemonset" | "daemonsets" | "ds" => Self::DaemonSet,
            "job" | "jobs" => Self::Job,
            "cronjob" | "cronjobs" | "cj" => Self::CronJob,
            "horizontalpodautoscaler" | "horizontalpodautoscalers" | "hpa" => {
                Self::HorizontalPodAutoscaler
            }
            "service" | "services" | "svc" => Self::Service,
            "endpoints" | "ep" => Self::Endpoints,
            "endpointslice" | "endpointslices" => Self::EndpointSlice,
            "ingress" | "ingresses" | "ing" => Self::Ingress,
            "networkpolicy" | "networkpolicies" | "netpol" => Self::NetworkPolicy,
            "persistentvolumeclaim" | "persistentvolumeclaims" | "pvc" => {
                Self::PersistentVolumeClaim
            }
            "persistentvolume" | "persistentvolumes" | "pv" => Self::PersistentVolume,
            "storageclass" | "storageclasses" | "sc" => Self::StorageClass,
            "namespace" | "namespaces" | "ns" => Self::Namespace,
            "node" | "nodes" | "no" => Self::Node,
            "event" | "events" | "ev" => Self::Event,
            _ => {
                let supported: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                return Err(CoreError::Validation(format!(
                    "unsupported kind '{}'; supported kinds: {}",
                    s,
                    supported.join(", ")
                )));
            }
        };
        Ok(kind)
    }
}
