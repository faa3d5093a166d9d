//! Server settings
//!
//! Loaded from a TOML file, then overridden by environment variables, then
//! by command-line flags.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use okemcp_k8s::oci::{KubeEndpoint, KubeconfigRequest};
use okemcp_k8s::{
    DEFAULT_CLIENT_TTL, DefaultsBackend, Environment, JsonFileBackend, MemoryBackend,
    ResolverConfig, SessionConfig,
};

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub log_level: Option<String>,
    /// Where stored defaults are persisted
    pub defaults_file: Option<PathBuf>,
    pub oci: OciSettings,
    pub kubeconfig: KubeconfigSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OciSettings {
    pub config_file: Option<PathBuf>,
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Overrides `https://containerengine.<region>.oraclecloud.com`
    pub endpoint: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KubeconfigSettings {
    /// PUBLIC_ENDPOINT, PRIVATE_ENDPOINT, VCN_HOSTNAME or LEGACY_KUBERNETES
    pub endpoint: Option<String>,
    pub token_version: Option<String>,
    pub expiration_seconds: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub client_ttl_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
}

impl Settings {
    /// `~/.config/oke-mcp/config.toml` (platform config dir)
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("oke-mcp").join("config.toml"))
    }

    /// Load an explicit file, or the default file when it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables win over the file
    pub fn apply_env(&mut self, env: &Environment) -> Result<()> {
        if let Some(level) = env.get("LOG_LEVEL") {
            self.log_level = Some(level.to_string());
        }
        if let Some(profile) = env.first(&["OCI_CLI_PROFILE", "OCI_PROFILE"]) {
            self.oci.profile = Some(profile.to_string());
        }
        if let Some(file) = env.get("OCI_CONFIG_FILE") {
            self.oci.config_file = Some(PathBuf::from(file));
        }
        if let Some(region) = env.first(&["OCI_REGION", "OCI_CLI_REGION"]) {
            self.oci.region = Some(region.to_string());
        }
        if let Some(endpoint) = env.get("OKE_ENDPOINT") {
            self.kubeconfig.endpoint = Some(endpoint.to_string());
        }
        if let Some(version) = env.get("OKE_KUBECONFIG_TOKEN_VERSION") {
            self.kubeconfig.token_version = Some(version.to_string());
        }
        if let Some(secs) = env_secs(env, "OKE_KUBECONFIG_EXP_SECONDS")? {
            self.kubeconfig.expiration_seconds = Some(secs);
        }
        if let Some(secs) = env_secs(env, "OKE_CLIENT_TTL_SECONDS")? {
            self.session.client_ttl_seconds = Some(secs);
        }
        if let Some(file) = env.get("OKE_DEFAULTS_FILE") {
            self.defaults_file = Some(PathBuf::from(file));
        }
        Ok(())
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        let defaults = SessionConfig::default();
        let mut kubeconfig = KubeconfigRequest::default();
        if let Some(endpoint) = &self.kubeconfig.endpoint {
            kubeconfig.endpoint = endpoint
                .parse::<KubeEndpoint>()
                .context("invalid kubeconfig endpoint")?;
        }
        if let Some(version) = &self.kubeconfig.token_version {
            kubeconfig.token_version = version.clone();
        }
        if let Some(secs) = self.kubeconfig.expiration_seconds {
            kubeconfig.expiration = Duration::from_secs(secs);
        }

        let secs = |value: Option<u64>, fallback: Duration| value.map(Duration::from_secs).unwrap_or(fallback);
        Ok(SessionConfig {
            resolver: ResolverConfig {
                config_file: self.oci.config_file.clone(),
                profile: self.oci.profile.clone(),
                region: self.oci.region.clone(),
            },
            kubeconfig,
            client_ttl: secs(self.session.client_ttl_seconds, DEFAULT_CLIENT_TTL),
            connect_timeout: secs(self.session.connect_timeout_seconds, defaults.connect_timeout),
            request_timeout: secs(self.session.request_timeout_seconds, defaults.request_timeout),
            control_plane_endpoint: self.oci.endpoint.clone(),
        })
    }

    /// JSON file backend at the configured or default path; in-memory when
    /// no config directory exists
    pub fn defaults_backend(&self) -> Box<dyn DefaultsBackend> {
        match self.defaults_file.clone().or_else(JsonFileBackend::default_path) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Using defaults file");
                Box::new(JsonFileBackend::new(path))
            }
            None => {
                tracing::warn!("No config directory; stored defaults will not persist");
                Box::<MemoryBackend>::default()
            }
        }
    }
}

fn env_secs(env: &Environment, key: &str) -> Result<Option<u64>> {
    env.get(key)
        .map(|value| {
            value
                .parse::<u64>()
                .with_context(|| format!("{} must be a number of seconds", key))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use okemcp_k8s::{MAX_CLIENT_TTL, clamp_client_ttl};
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
log_level = "debug"
defaults_file = "/tmp/oke-defaults.json"

[oci]
profile = "SESSION"
region = "eu-frankfurt-1"

[kubeconfig]
endpoint = "PRIVATE_ENDPOINT"
expiration_seconds = 1800

[session]
client_ttl_seconds = 300
request_timeout_seconds = 15
"#;

    #[test]
    fn test_parse_sections() {
        let settings = Settings::parse(SAMPLE).unwrap();
        assert_eq!(settings.log_level(), "debug");
        assert_eq!(settings.oci.profile.as_deref(), Some("SESSION"));

        let config = settings.session_config().unwrap();
        assert_eq!(config.kubeconfig.endpoint, KubeEndpoint::Private);
        assert_eq!(config.kubeconfig.expiration, Duration::from_secs(1800));
        assert_eq!(config.client_ttl, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.resolver.region.as_deref(), Some("eu-frankfurt-1"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Settings::parse("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = Settings::parse(SAMPLE).unwrap();
        let env = Environment::from_pairs([
            ("LOG_LEVEL", "warn"),
            ("OCI_PROFILE", "OTHER"),
            ("OKE_ENDPOINT", "PUBLIC_ENDPOINT"),
            ("OKE_CLIENT_TTL_SECONDS", "7200"),
        ]);
        settings.apply_env(&env).unwrap();

        assert_eq!(settings.log_level(), "warn");
        assert_eq!(settings.oci.profile.as_deref(), Some("OTHER"));
        let config = settings.session_config().unwrap();
        assert_eq!(config.kubeconfig.endpoint, KubeEndpoint::Public);
        // The session clamps this when it builds the cache
        assert_eq!(clamp_client_ttl(config.client_ttl), MAX_CLIENT_TTL);
    }

    #[test]
    fn test_bad_env_number_is_error() {
        let mut settings = Settings::default();
        let env = Environment::from_pairs([("OKE_KUBECONFIG_EXP_SECONDS", "soon")]);
        let err = settings.apply_env(&env).unwrap_err();
        assert!(err.to_string().contains("OKE_KUBECONFIG_EXP_SECONDS"));
    }

    #[test]
    fn test_bad_endpoint_is_error() {
        let settings = Settings::parse("[kubeconfig]\nendpoint = \"SIDEWAYS\"\n").unwrap();
        assert!(settings.session_config().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Settings::load(Some(&path)).unwrap(), Settings::parse(SAMPLE).unwrap());

        let missing = dir.path().join("missing.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }
}
