//! Session facade shared by all tool calls
//!
//! Owns the defaults store, credential resolver, control plane client and
//! cluster client cache. Cluster operations run under a deadline and are
//! retried exactly once, with freshly resolved credentials, when the
//! upstream rejects the credentials.

use chrono::{DateTime, Utc};
use kube::Client;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use okemcp_types::{AuthMode, CoreError, Page, Result, normalize};

use crate::cache::{ClientFactory, ClusterClientCache, KubeconfigClientFactory};
use crate::credentials::{CredentialContext, CredentialResolver, ResolverConfig};
use crate::defaults::DefaultsStore;
use crate::env::Environment;
use crate::kubeconfig::KubeconfigProvider;
use crate::oci::container_engine::{ContainerEngineClient, ControlPlane, KubeconfigRequest};

pub const DEFAULT_CLIENT_TTL: Duration = Duration::from_secs(10 * 60);
pub const MIN_CLIENT_TTL: Duration = Duration::from_secs(60);
pub const MAX_CLIENT_TTL: Duration = Duration::from_secs(20 * 60);

/// Keep cached clients well inside the generated kubeconfig lifetime
pub fn clamp_client_ttl(ttl: Duration) -> Duration {
    ttl.clamp(MIN_CLIENT_TTL, MAX_CLIENT_TTL)
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub resolver: ResolverConfig,
    pub kubeconfig: KubeconfigRequest,
    pub client_ttl: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub control_plane_endpoint: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            kubeconfig: KubeconfigRequest::default(),
            client_ttl: DEFAULT_CLIENT_TTL,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            control_plane_endpoint: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Attempt {
    Initial,
    Retry,
}

pub struct Session {
    defaults: DefaultsStore,
    resolver: CredentialResolver,
    control_plane: Arc<dyn ControlPlane>,
    cache: ClusterClientCache,
    request_timeout: Duration,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Wire up the production control plane and client factory
    pub fn connect(config: &SessionConfig, defaults: DefaultsStore, env: Environment) -> Result<Self> {
        let mut control_plane =
            ContainerEngineClient::new(config.connect_timeout, config.request_timeout)?;
        if let Some(endpoint) = &config.control_plane_endpoint {
            control_plane = control_plane.with_endpoint(endpoint.clone());
        }
        let factory =
            KubeconfigClientFactory::new(config.connect_timeout, config.request_timeout);
        let resolver = CredentialResolver::new(config.resolver.clone(), env);

        Ok(Self::with_parts(
            config,
            defaults,
            resolver,
            Arc::new(control_plane),
            Arc::new(factory),
        ))
    }

    pub fn with_parts(
        config: &SessionConfig,
        defaults: DefaultsStore,
        resolver: CredentialResolver,
        control_plane: Arc<dyn ControlPlane>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let provider = KubeconfigProvider::new(Arc::clone(&control_plane), config.kubeconfig.clone());
        let cache = ClusterClientCache::new(provider, factory, clamp_client_ttl(config.client_ttl));
        Self {
            defaults,
            resolver,
            control_plane,
            cache,
            request_timeout: config.request_timeout,
            started_at: Utc::now(),
        }
    }

    pub fn defaults(&self) -> &DefaultsStore {
        &self.defaults
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &ClusterClientCache {
        &self.cache
    }

    /// Re-resolve credentials, in `auth` mode when given, and drop every
    /// cached client. The cache is cleared even when resolution fails.
    pub fn refresh(&self, auth: Option<AuthMode>) -> Result<CredentialContext> {
        let result = self.resolver.refresh(auth);
        let dropped = self.cache.invalidate_all();
        tracing::info!(dropped, ok = result.is_ok(), "Invalidated cluster clients");
        result
    }

    /// Diagnostics: effective defaults and credential mode
    pub fn health(&self) -> Value {
        let credentials = match self.resolver.resolve(None) {
            Ok(ctx) => json!({
                "mode": ctx.mode,
                "profile": ctx.profile,
                "region": ctx.region,
                "token_expires_at": ctx.token_expires_at,
                "error": null,
            }),
            Err(e) => json!({
                "mode": null,
                "profile": self.resolver.profile_name(),
                "region": null,
                "token_expires_at": null,
                "error": e.to_string(),
            }),
        };
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": self.started_at,
            "defaults": self.defaults.effective(),
            "effective_credential_mode": credentials["mode"],
            "credentials": credentials,
            "client_cache": {
                "clients": self.cache.len(),
                "ttl_seconds": self.cache.ttl().as_secs(),
            },
        })
    }

    /// Run `op` with the client for the resolved cluster
    pub async fn with_cluster<T, F, Fut>(
        &self,
        cluster_id: Option<&str>,
        auth: Option<AuthMode>,
        op: F,
    ) -> Result<T>
    where
        F: Fn(Client) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cluster_id = self.defaults.resolve_cluster(cluster_id)?;
        let cluster_id = cluster_id.as_str();
        let op = &op;
        self.with_reauth(auth, Some(cluster_id), move |ctx| async move {
            let entry = self.cache.get_or_create(cluster_id, &ctx).await?;
            op(entry.client.clone()).await
        })
        .await
    }

    /// Resolve credentials and run `op` under the request deadline. An auth
    /// failure from `op` is retried once with credentials re-read from disk;
    /// a second auth failure is returned as is.
    async fn with_reauth<T, F, Fut>(
        &self,
        auth: Option<AuthMode>,
        cluster_id: Option<&str>,
        op: F,
    ) -> Result<T>
    where
        F: Fn(CredentialContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = Attempt::Initial;
        loop {
            let ctx = match attempt {
                Attempt::Initial => self.resolver.resolve(auth)?,
                Attempt::Retry => self.resolver.resolve_fresh(auth)?,
            };
            let outcome = match tokio::time::timeout(self.request_timeout, op(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::NetworkTimeout(format!(
                    "no response within {}s",
                    self.request_timeout.as_secs()
                ))),
            };
            match outcome {
                Err(err) if err.is_auth() && attempt == Attempt::Initial => {
                    tracing::warn!(
                        cluster = cluster_id.unwrap_or("-"),
                        error = %err,
                        "Credentials rejected, re-resolving once"
                    );
                    if let Some(id) = cluster_id {
                        self.cache.invalidate(id);
                    }
                    attempt = Attempt::Retry;
                }
                other => return other,
            }
        }
    }

    // ========================================================================
    // Control plane
    // ========================================================================

    pub async fn list_clusters(
        &self,
        compartment_id: Option<&str>,
        page: Option<&str>,
        limit: Option<u32>,
        auth: Option<AuthMode>,
    ) -> Result<Page> {
        let compartment_id = self.defaults.resolve_compartment(compartment_id)?;
        let compartment_id = compartment_id.as_str();
        let page_token = normalize(page);
        let page_token = page_token.as_deref();
        let result = self
            .with_reauth(auth, None, move |ctx| async move {
                self.control_plane
                    .list_clusters(compartment_id, page_token, limit, &ctx)
                    .await
            })
            .await?;
        Ok(Page::new(to_values(&result.items)?, result.next))
    }

    pub async fn get_cluster(&self, cluster_id: Option<&str>, auth: Option<AuthMode>) -> Result<Value> {
        let cluster_id = self.defaults.resolve_cluster(cluster_id)?;
        let cluster_id = cluster_id.as_str();
        let cluster = self
            .with_reauth(auth, None, move |ctx| async move {
                self.control_plane.get_cluster(cluster_id, &ctx).await
            })
            .await?;
        to_value(&cluster)
    }

    /// Node pools in a compartment; the compartment is inferred from the
    /// cluster when only a cluster is known
    pub async fn list_node_pools(
        &self,
        compartment_id: Option<&str>,
        cluster_id: Option<&str>,
        page: Option<&str>,
        limit: Option<u32>,
        auth: Option<AuthMode>,
    ) -> Result<Page> {
        let cluster_id = normalize(cluster_id).or(self.defaults.effective().cluster_id);
        let compartment_id = match self.defaults.resolve_compartment(compartment_id) {
            Ok(id) => id,
            Err(missing @ CoreError::MissingIdentifier { .. }) => {
                let Some(cluster) = cluster_id.as_deref() else {
                    return Err(missing);
                };
                let summary = self.get_cluster(Some(cluster), auth).await?;
                summary["compartment_id"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or(missing)?
            }
            Err(e) => return Err(e),
        };
        let compartment_id = compartment_id.as_str();
        let cluster_id = cluster_id.as_deref();
        let page_token = normalize(page);
        let page_token = page_token.as_deref();

        let result = self
            .with_reauth(auth, None, move |ctx| async move {
                self.control_plane
                    .list_node_pools(compartment_id, cluster_id, page_token, limit, &ctx)
                    .await
            })
            .await?;
        Ok(Page::new(to_values(&result.items)?, result.next))
    }

    pub async fn get_node_pool(&self, node_pool_id: &str, auth: Option<AuthMode>) -> Result<Value> {
        let node_pool_id = normalize(Some(node_pool_id))
            .ok_or_else(|| CoreError::Validation("node_pool_id is required".into()))?;
        let node_pool_id = node_pool_id.as_str();
        let pool = self
            .with_reauth(auth, None, move |ctx| async move {
                self.control_plane.get_node_pool(node_pool_id, &ctx).await
            })
            .await?;
        to_value(&pool)
    }
}

fn to_value<T: serde::Serialize>(item: &T) -> Result<Value> {
    serde_json::to_value(item).map_err(|e| CoreError::Upstream {
        status: 502,
        message: format!("could not encode control plane response: {}", e),
    })
}

fn to_values<T: serde::Serialize>(items: &[T]) -> Result<Vec<Value>> {
    items.iter().map(to_value).collect()
}
