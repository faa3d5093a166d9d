use serde::Serialize;

use okemcp_types::Shape;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    MetaHealth,
    ConfigGetEffectiveDefaults,
    ConfigSetDefaults,
    ConfigResetDefaults,
    AuthRefresh,
    K8sList,
    K8sGet,
    GetPodLogs,
    ListEvents,
    ListNodeMetrics,
    ListPodMetrics,
    ListClusters,
    GetCluster,
    ListNodePools,
    GetNodePool,
}

impl ToolName {
    pub const ALL: [ToolName; 15] = [
        Self::MetaHealth,
        Self::ConfigGetEffectiveDefaults,
        Self::ConfigSetDefaults,
        Self::ConfigResetDefaults,
        Self::AuthRefresh,
        Self::K8sList,
        Self::K8sGet,
        Self::GetPodLogs,
        Self::ListEvents,
        Self::ListNodeMetrics,
        Self::ListPodMetrics,
        Self::ListClusters,
        Self::GetCluster,
        Self::ListNodePools,
        Self::GetNodePool,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name.trim())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetaHealth => "meta_health",
            Self::ConfigGetEffectiveDefaults => "config_get_effective_defaults",
            Self::ConfigSetDefaults => "config_set_defaults",
            Self::ConfigResetDefaults => "config_reset_defaults",
            Self::AuthRefresh => "auth_refresh",
            Self::K8sList => "k8s_list",
            Self::K8sGet => "k8s_get",
            Self::GetPodLogs => "oke_get_pod_logs",
            Self::ListEvents => "oke_list_events",
            Self::ListNodeMetrics => "oke_list_node_metrics",
            Self::ListPodMetrics => "oke_list_pod_metrics",
            Self::ListClusters => "oke_list_clusters",
            Self::GetCluster => "oke_get_cluster",
            Self::ListNodePools => "oke_list_node_pools",
            Self::GetNodePool => "oke_get_node_pool",
        }
    }

    /// Envelope shape, also used for failures
    pub fn shape(&self) -> Shape {
        match self {
            Self::K8sList
            | Self::ListEvents
            | Self::ListNodeMetrics
            | Self::ListPodMetrics
            | Self::ListClusters
            | Self::ListNodePools => Shape::List,
            _ => Shape::Single,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::MetaHealth => "Server status, effective defaults and credential mode",
            Self::ConfigGetEffectiveDefaults => {
                "Defaults used when compartment_id/cluster_id are omitted"
            }
            Self::ConfigSetDefaults => "Store default compartment_id and/or cluster_id",
            Self::ConfigResetDefaults => "Clear stored defaults",
            Self::AuthRefresh => "Re-read OCI credentials and drop cached cluster clients",
            Self::K8sList => {
                "List resources of a kind, one page at a time (trimmed; full=true for whole objects)"
            }
            Self::K8sGet => "Get one resource by kind and name (trimmed; full=true for the whole object)",
            Self::GetPodLogs => "Fetch container logs of a pod",
            Self::ListEvents => "List events, optionally for one object",
            Self::ListNodeMetrics => "Node CPU/memory usage from metrics.k8s.io",
            Self::ListPodMetrics => "Pod CPU/memory usage from metrics.k8s.io",
            Self::ListClusters => "List OKE clusters in a compartment",
            Self::GetCluster => "Get an OKE cluster",
            Self::ListNodePools => "List node pools in a compartment or cluster",
            Self::GetNodePool => "Get a node pool",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Every tool the router answers
pub fn catalog() -> Vec<ToolInfo> {
    ToolName::ALL
        .iter()
        .map(|tool| ToolInfo {
            name: tool.as_str(),
            description: tool.description(),
        })
        .collect()
}
