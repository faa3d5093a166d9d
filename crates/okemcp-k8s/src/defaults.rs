//! Fallback identifiers for tool calls
//!
//! Stored defaults are persisted as JSON so they survive restarts. Identifier
//! resolution order is: explicit argument, environment variable, stored value.

use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};

use okemcp_types::{CoreError, Defaults, Result, normalize};

use crate::env::{CLUSTER_ENV, COMPARTMENT_ENV, Environment};

/// Persistence for stored defaults
pub trait DefaultsBackend: Send + Sync {
    fn load(&self) -> Result<Defaults>;
    fn save(&self, defaults: &Defaults) -> Result<()>;
}

/// Defaults stored in a JSON file
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/oke-mcp/defaults.json` (platform config dir)
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("oke-mcp").join("defaults.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DefaultsBackend for JsonFileBackend {
    fn load(&self) -> Result<Defaults> {
        if !self.path.exists() {
            return Ok(Defaults::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            CoreError::Config(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, defaults: &Defaults) -> Result<()> {
        let io_err =
            |e: std::io::Error| CoreError::Config(format!("failed to write {}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(defaults)
            .map_err(|e| CoreError::Config(format!("failed to encode defaults: {}", e)))?;

        // Write-then-rename so a crash never leaves a truncated file behind
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

/// Non-persistent backend
#[derive(Default)]
pub struct MemoryBackend {
    stored: Mutex<Defaults>,
}

impl DefaultsBackend for MemoryBackend {
    fn load(&self) -> Result<Defaults> {
        Ok(self.stored.lock().clone())
    }

    fn save(&self, defaults: &Defaults) -> Result<()> {
        *self.stored.lock() = defaults.clone();
        Ok(())
    }
}

/// Process-wide defaults with a fixed precedence order
pub struct DefaultsStore {
    current: RwLock<Defaults>,
    backend: Box<dyn DefaultsBackend>,
    env: Environment,
}

impl DefaultsStore {
    /// Load stored defaults; an unreadable store starts empty
    pub fn new(backend: Box<dyn DefaultsBackend>, env: Environment) -> Self {
        let current = backend.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable defaults store");
            Defaults::default()
        });
        Self {
            current: RwLock::new(current),
            backend,
            env,
        }
    }

    pub fn in_memory(env: Environment) -> Self {
        Self::new(Box::<MemoryBackend>::default(), env)
    }

    /// Stored values only (no environment merging)
    pub fn get(&self) -> Defaults {
        self.current.read().clone()
    }

    /// Merge the supplied fields into the stored defaults and persist them.
    ///
    /// The write lock is held across persist and swap; on a persistence
    /// failure the stored value is left unchanged.
    pub fn set(&self, patch: &Defaults) -> Result<Defaults> {
        let mut current = self.current.write();
        let merged = current.merged(patch);
        self.backend.save(&merged)?;
        *current = merged.clone();
        tracing::info!(
            compartment_id = ?merged.compartment_id,
            cluster_id = ?merged.cluster_id,
            "Updated stored defaults"
        );
        Ok(merged)
    }

    /// Clear stored values
    pub fn reset(&self) -> Result<Defaults> {
        let mut current = self.current.write();
        let cleared = Defaults::default();
        self.backend.save(&cleared)?;
        *current = cleared.clone();
        Ok(cleared)
    }

    /// Defaults as seen by a call that supplies no identifiers
    pub fn effective(&self) -> Defaults {
        let stored = self.get();
        Defaults {
            compartment_id: self
                .env
                .first(COMPARTMENT_ENV)
                .map(str::to_string)
                .or(stored.compartment_id),
            cluster_id: self
                .env
                .first(CLUSTER_ENV)
                .map(str::to_string)
                .or(stored.cluster_id),
        }
    }

    pub fn resolve_compartment(&self, explicit: Option<&str>) -> Result<String> {
        let stored = self.get().compartment_id;
        resolve_identifier(explicit, self.env.first(COMPARTMENT_ENV), stored)
            .ok_or(CoreError::MissingIdentifier {
                name: "compartment_id",
                env: COMPARTMENT_ENV[0],
            })
    }

    pub fn resolve_cluster(&self, explicit: Option<&str>) -> Result<String> {
        let stored = self.get().cluster_id;
        resolve_identifier(explicit, self.env.first(CLUSTER_ENV), stored).ok_or(
            CoreError::MissingIdentifier {
                name: "cluster_id",
                env: CLUSTER_ENV[0],
            },
        )
    }
}

/// explicit > environment > stored
fn resolve_identifier(
    explicit: Option<&str>,
    env: Option<&str>,
    stored: Option<String>,
) -> Option<String> {
    normalize(explicit)
        .or_else(|| normalize(env))
        .or_else(|| normalize(stored.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use okemcp_types::ErrorCode;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store_with(env: &[(&str, &str)], stored: Defaults) -> DefaultsStore {
        let store = DefaultsStore::in_memory(Environment::from_pairs(env.iter().copied()));
        store.set(&stored).unwrap();
        store
    }

    #[test]
    fn test_precedence_explicit_env_stored() {
        let stored = Defaults::new(Some("stored-comp"), Some("stored-cluster"));

        // Every combination of present/absent sources picks the highest one present
        for explicit in [None, Some("explicit")] {
            for env in [None, Some("env")] {
                for has_stored in [false, true] {
                    let env_pairs: Vec<(&str, &str)> =
                        env.map(|v| vec![("OKE_CLUSTER_ID", v)]).unwrap_or_default();
                    let store = store_with(
                        &env_pairs,
                        if has_stored { stored.clone() } else { Defaults::default() },
                    );
                    let result = store.resolve_cluster(explicit);

                    let expected = explicit
                        .or(env)
                        .or(has_stored.then_some("stored-cluster"));
                    match expected {
                        Some(value) => assert_eq!(result.unwrap(), value),
                        None => assert_eq!(result.unwrap_err().code(), ErrorCode::ConfigError),
                    }
                }
            }
        }
    }

    #[test]
    fn test_missing_identifier_names_it() {
        let store = DefaultsStore::in_memory(Environment::default());
        let err = store.resolve_compartment(None).unwrap_err();
        assert_eq!(
            err,
            CoreError::MissingIdentifier {
                name: "compartment_id",
                env: "OKE_COMPARTMENT_ID"
            }
        );
    }

    #[test]
    fn test_blank_explicit_falls_through() {
        let store = store_with(&[("COMPARTMENT_OCID", "env-comp")], Defaults::default());
        assert_eq!(store.resolve_compartment(Some("   ")).unwrap(), "env-comp");
    }

    #[test]
    fn test_set_merges_partial() {
        let store = store_with(&[], Defaults::new(Some("comp"), Some("cluster-a")));
        let updated = store.set(&Defaults::new(None, Some("cluster-b"))).unwrap();
        assert_eq!(updated, Defaults::new(Some("comp"), Some("cluster-b")));
        assert_eq!(store.get(), updated);
    }

    #[test]
    fn test_effective_prefers_env() {
        let store = store_with(
            &[("OKE_COMPARTMENT_ID", "env-comp")],
            Defaults::new(Some("stored-comp"), Some("stored-cluster")),
        );
        let effective = store.effective();
        assert_eq!(effective.compartment_id.as_deref(), Some("env-comp"));
        assert_eq!(effective.cluster_id.as_deref(), Some("stored-cluster"));
    }

    #[test]
    fn test_json_backend_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("defaults.json");

        let store = DefaultsStore::new(
            Box::new(JsonFileBackend::new(&path)),
            Environment::default(),
        );
        store.set(&Defaults::new(Some("comp"), Some("cluster"))).unwrap();

        let reopened = DefaultsStore::new(
            Box::new(JsonFileBackend::new(&path)),
            Environment::default(),
        );
        assert_eq!(reopened.get(), Defaults::new(Some("comp"), Some("cluster")));

        reopened.reset().unwrap();
        let cleared = JsonFileBackend::new(&path).load().unwrap();
        assert_eq!(cleared, Defaults::default());
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("defaults.json");
        fs::write(&path, "{not json").unwrap();

        let store = DefaultsStore::new(Box::new(JsonFileBackend::new(&path)), Environment::default());
        assert_eq!(store.get(), Defaults::default());
    }

    #[test]
    fn test_concurrent_set_never_tears() {
        let store = Arc::new(DefaultsStore::in_memory(Environment::default()));
        let pairs = [("comp-a", "cluster-a"), ("comp-b", "cluster-b")];

        let writers: Vec<_> = pairs
            .iter()
            .map(|(comp, cluster)| {
                let store = Arc::clone(&store);
                let (comp, cluster) = (comp.to_string(), cluster.to_string());
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        store
                            .set(&Defaults::new(Some(comp.as_str()), Some(cluster.as_str())))
                            .unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            let seen = store.get();
            if let (Some(comp), Some(cluster)) = (seen.compartment_id, seen.cluster_id) {
                assert_eq!(comp.trim_start_matches("comp-"), cluster.trim_start_matches("cluster-"));
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }
}
