//! Per-cluster Kubernetes client cache
//!
//! Entries are keyed by cluster id and credential fingerprint. Each key owns
//! a slot holding a once-cell: the first caller builds the client while
//! concurrent callers for the same key wait on the same cell, and the client
//! only becomes visible once it is fully constructed. A failed build leaves
//! the cell empty for the next caller. A miss also evicts expired slots and
//! slots left behind by a credential rotation.

use async_trait::async_trait;
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use okemcp_types::{CoreError, Result};

use crate::credentials::CredentialContext;
use crate::kubeconfig::{KubeconfigDocument, KubeconfigProvider};

/// Turns a patched kubeconfig into a ready client
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self, document: KubeconfigDocument) -> Result<Client>;
}

/// Builds `kube::Client`s with bounded connect and read timeouts
pub struct KubeconfigClientFactory {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl KubeconfigClientFactory {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

#[async_trait]
impl ClientFactory for KubeconfigClientFactory {
    async fn create(&self, document: KubeconfigDocument) -> Result<Client> {
        let options = KubeConfigOptions {
            context: document.current_context().map(str::to_string),
            ..Default::default()
        };
        let mut config = Config::from_custom_kubeconfig(document.into_kubeconfig(), &options)
            .await
            .map_err(|e| CoreError::Validation(format!("kubeconfig rejected: {}", e)))?;
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);
        config.write_timeout = Some(self.read_timeout);

        Client::try_from(config).map_err(|e| CoreError::Upstream {
            status: 502,
            message: format!("failed to create cluster client: {}", e),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub cluster_id: String,
    /// Auth mode and profile; stable across token rotations
    pub identity: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(cluster_id: &str, ctx: &CredentialContext) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            identity: format!("{}:{}", ctx.mode, ctx.profile),
            fingerprint: ctx.fingerprint(),
        }
    }

    /// Same cluster and identity under older credentials
    fn is_superseded_by(&self, newer: &CacheKey) -> bool {
        self.cluster_id == newer.cluster_id
            && self.identity == newer.identity
            && self.fingerprint != newer.fingerprint
    }
}

/// A constructed client and its provenance
pub struct CachedClient {
    pub cluster_id: String,
    pub fingerprint: String,
    pub client: Client,
    pub created_at: Instant,
    ttl: Duration,
}

impl CachedClient {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

impl fmt::Debug for CachedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedClient")
            .field("cluster_id", &self.cluster_id)
            .field("fingerprint", &self.fingerprint)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Slot {
    cell: OnceCell<Arc<CachedClient>>,
}

pub struct ClusterClientCache {
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
    provider: KubeconfigProvider,
    factory: Arc<dyn ClientFactory>,
    ttl: Duration,
}

impl ClusterClientCache {
    pub fn new(provider: KubeconfigProvider, factory: Arc<dyn ClientFactory>, ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            provider,
            factory,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the client for `(cluster_id, ctx.fingerprint())`, building it
    /// at most once per key however many callers race
    pub async fn get_or_create(
        &self,
        cluster_id: &str,
        ctx: &CredentialContext,
    ) -> Result<Arc<CachedClient>> {
        let key = CacheKey::new(cluster_id, ctx);
        let slot = self.slot_for(&key);
        let entry = slot
            .cell
            .get_or_try_init(|| self.construct(&key, ctx))
            .await?;
        Ok(Arc::clone(entry))
    }

    fn slot_for(&self, key: &CacheKey) -> Arc<Slot> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            match slot.cell.get() {
                Some(entry) if entry.is_expired(now) => {
                    tracing::debug!(cluster = %key.cluster_id, "Cached client expired");
                }
                Some(_) => {
                    tracing::debug!(cluster = %key.cluster_id, "Client cache HIT");
                    return Arc::clone(slot);
                }
                // Construction in flight (or last attempt failed); share the slot
                None => return Arc::clone(slot),
            }
        }

        // Callers already holding an evicted client keep it until they drop it
        let before = slots.len();
        slots.retain(|existing, slot| {
            let expired = slot.cell.get().is_some_and(|entry| entry.is_expired(now));
            !expired && !existing.is_superseded_by(key)
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            tracing::debug!(cluster = %key.cluster_id, evicted, "Evicted stale client slots");
        }

        let slot = Arc::new(Slot::default());
        slots.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    async fn construct(&self, key: &CacheKey, ctx: &CredentialContext) -> Result<Arc<CachedClient>> {
        tracing::info!(cluster = %key.cluster_id, mode = %ctx.mode, "Client cache MISS, building client");
        let start = Instant::now();

        let document = self.provider.build(&key.cluster_id, ctx).await?;
        let client = self.factory.create(document).await?;

        tracing::info!(
            cluster = %key.cluster_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cluster client ready"
        );
        Ok(Arc::new(CachedClient {
            cluster_id: key.cluster_id.clone(),
            fingerprint: key.fingerprint.clone(),
            client,
            created_at: Instant::now(),
            ttl: self.ttl,
        }))
    }

    /// Drop every entry for one cluster; returns how many were removed
    pub fn invalidate(&self, cluster_id: &str) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, _| key.cluster_id != cluster_id);
        before - slots.len()
    }

    pub fn invalidate_all(&self) -> usize {
        let mut slots = self.slots.lock();
        let removed = slots.len();
        slots.clear();
        removed
    }

    /// Live, fully constructed entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.cell.get().is_some_and(|entry| !entry.is_expired(now)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
