//! OKE session layer for oke-mcp
//!
//! This crate resolves OCI credentials, generates and patches cluster
//! kubeconfigs, caches Kubernetes clients per cluster and credential
//! identity, and exposes read-only resource access on top of them.

mod cache;
mod credentials;
mod defaults;
pub mod env;
mod errors;
mod kinds;
mod kubeconfig;
pub mod oci;
mod resources;
mod session;
mod summary;

pub use cache::{CacheKey, CachedClient, ClientFactory, ClusterClientCache, KubeconfigClientFactory};
pub use credentials::{CredentialContext, CredentialResolver, ResolverConfig, SigningIdentity};
pub use defaults::{DefaultsBackend, DefaultsStore, JsonFileBackend, MemoryBackend};
pub use env::Environment;
pub use errors::{from_kube, from_status};
pub use kinds::ResourceKind;
pub use kubeconfig::{KubeconfigDocument, KubeconfigPayload, KubeconfigProvider, redacted_excerpt};
pub use resources::{
    DEFAULT_LIST_LIMIT, DEFAULT_NAMESPACE, EVENT_MESSAGE_CHARS, ListRequest, MAX_LIST_LIMIT,
    MetricsReport, ResourceReader, effective_limit, relationship_edges,
};
pub use session::{
    DEFAULT_CLIENT_TTL, MAX_CLIENT_TTL, MIN_CLIENT_TTL, Session, SessionConfig, clamp_client_ttl,
};
pub use summary::{View, summarize};

// Re-export types used in our public API
pub use okemcp_types::{AuthMode, CoreError, Defaults, Page, Result};

