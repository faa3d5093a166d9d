//! Credential resolution
//!
//! Decides which auth mode and profile a call uses and validates the
//! backing material. Mode order: explicit argument, `OCI_CLI_AUTH`, then the
//! profile itself (a `security_token_file` implies session auth), falling
//! back to `api_key`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use okemcp_types::{AuthMode, CoreError, Result, normalize};

use crate::env::{AUTH_ENV, CONFIG_FILE_ENV, Environment, PROFILE_ENV, REGION_ENV, TOKEN_FILE_ENV};
use crate::oci::config_file::{
    DEFAULT_PROFILE, OciConfigFile, ProfileSection, default_config_path, expand_home,
};

/// Tokens expiring within this window are treated as expired
const TOKEN_EXPIRY_SKEW_SECS: i64 = 30;

/// Key material needed to sign control-plane requests
#[derive(Clone, Debug, Default)]
pub struct SigningIdentity {
    pub tenancy: Option<String>,
    pub user: Option<String>,
    pub key_fingerprint: Option<String>,
    pub key_file: Option<PathBuf>,
    pub pass_phrase: Option<SecretString>,
}

/// Outcome of a successful resolution
#[derive(Clone, Debug)]
pub struct CredentialContext {
    pub mode: AuthMode,
    pub profile: String,
    pub token_path: Option<PathBuf>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub resolved_at: DateTime<Utc>,
    pub region: Option<String>,
    pub identity: SigningIdentity,
    /// Digest of the backing material; changes when the token rotates
    signature: String,
}

impl CredentialContext {
    /// Identity component of client cache keys. Contains no secret material.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}:{}", self.mode, self.profile, self.signature)
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at
            .is_some_and(|exp| exp <= now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECS))
    }
}

/// Operator-supplied resolver settings; unset fields fall back to the environment
#[derive(Clone, Debug, Default)]
pub struct ResolverConfig {
    pub config_file: Option<PathBuf>,
    pub profile: Option<String>,
    pub region: Option<String>,
}

struct ResolverState {
    profile: ProfileSection,
    contexts: HashMap<AuthMode, CredentialContext>,
}

pub struct CredentialResolver {
    config: ResolverConfig,
    env: Environment,
    state: RwLock<Option<ResolverState>>,
}

impl CredentialResolver {
    pub fn new(config: ResolverConfig, env: Environment) -> Self {
        Self {
            config,
            env,
            state: RwLock::new(None),
        }
    }

    pub fn profile_name(&self) -> String {
        normalize(self.config.profile.as_deref())
            .or_else(|| self.env.first(PROFILE_ENV).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .config_file
            .clone()
            .or_else(|| self.env.get(CONFIG_FILE_ENV).map(expand_home))
            .or_else(default_config_path)
    }

    /// Resolve credentials, reusing cached state while the token is fresh
    pub fn resolve(&self, explicit: Option<AuthMode>) -> Result<CredentialContext> {
        let now = Utc::now();
        {
            let guard = self.state.read();
            if let Some(state) = guard.as_ref() {
                let mode = self.select_mode(explicit, &state.profile);
                if let Some(ctx) = state.contexts.get(&mode).filter(|c| !c.is_stale(now)) {
                    return Ok(ctx.clone());
                }
            }
        }

        let mut guard = self.state.write();
        let state = match guard.take() {
            Some(state) => state,
            None => ResolverState {
                profile: self.load_profile()?,
                contexts: HashMap::new(),
            },
        };
        let state = guard.insert(state);

        let mode = self.select_mode(explicit, &state.profile);
        if let Some(ctx) = state.contexts.get(&mode).filter(|c| !c.is_stale(now)) {
            return Ok(ctx.clone());
        }
        let ctx = self.build_context(mode, &state.profile, now)?;
        state.contexts.insert(mode, ctx.clone());
        Ok(ctx)
    }

    /// Re-read the profile and token from disk, discarding cached state
    pub fn resolve_fresh(&self, explicit: Option<AuthMode>) -> Result<CredentialContext> {
        let mut guard = self.state.write();
        *guard = None;

        let profile = self.load_profile()?;
        let mode = self.select_mode(explicit, &profile);
        let built = self.build_context(mode, &profile, Utc::now());

        let state = guard.insert(ResolverState {
            profile,
            contexts: HashMap::new(),
        });
        let ctx = built?;
        state.contexts.insert(mode, ctx.clone());
        Ok(ctx)
    }

    /// Unconditional re-resolution in the explicit or environment-selected mode
    pub fn refresh(&self, explicit: Option<AuthMode>) -> Result<CredentialContext> {
        let result = self.resolve_fresh(explicit);
        match &result {
            Ok(ctx) => tracing::info!(
                mode = %ctx.mode,
                profile = %ctx.profile,
                expires_at = ?ctx.token_expires_at,
                "Refreshed credentials"
            ),
            Err(e) => tracing::warn!(error = %e, "Credential refresh failed"),
        }
        result
    }

    fn load_profile(&self) -> Result<ProfileSection> {
        let name = self.profile_name();
        let file = match self.config_path() {
            Some(path) => OciConfigFile::load(&path)?,
            None => OciConfigFile::default(),
        };

        if file.has_profile(&name) {
            return file
                .profile(&name)
                .ok_or_else(|| CoreError::Config(format!("profile {} could not be loaded", name)));
        }
        if name == DEFAULT_PROFILE {
            return Ok(ProfileSection::empty(&name));
        }
        let location = self
            .config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "the OCI config file".to_string());
        Err(CoreError::Config(format!(
            "profile {} not found in {}",
            name, location
        )))
    }

    fn select_mode(&self, explicit: Option<AuthMode>, profile: &ProfileSection) -> AuthMode {
        if let Some(mode) = explicit {
            return mode;
        }
        if let Some(raw) = self.env.get(AUTH_ENV) {
            match raw.parse() {
                Ok(mode) => return mode,
                Err(_) => tracing::warn!(value = raw, "Ignoring unsupported {}", AUTH_ENV),
            }
        }
        if profile.security_token_file.is_some() {
            AuthMode::SecurityToken
        } else {
            AuthMode::ApiKey
        }
    }

    fn build_context(
        &self,
        mode: AuthMode,
        profile: &ProfileSection,
        now: DateTime<Utc>,
    ) -> Result<CredentialContext> {
        let region = normalize(self.config.region.as_deref())
            .or_else(|| self.env.first(REGION_ENV).map(str::to_string))
            .or_else(|| profile.region.clone());
        let identity = SigningIdentity {
            tenancy: profile.tenancy.clone(),
            user: profile.user.clone(),
            key_fingerprint: profile.fingerprint.clone(),
            key_file: profile.key_file.clone(),
            pass_phrase: profile.pass_phrase.clone(),
        };

        let (token_path, token_expires_at, signature) = match mode {
            AuthMode::SecurityToken => {
                let path = profile
                    .security_token_file
                    .clone()
                    .or_else(|| self.env.get(TOKEN_FILE_ENV).map(expand_home))
                    .ok_or_else(|| {
                        CoreError::Auth(format!(
                            "no signer available: auth mode security_token needs a security token file for profile {} (set security_token_file or {})",
                            profile.name, TOKEN_FILE_ENV
                        ))
                    })?;
                let raw = fs::read_to_string(&path).map_err(|e| {
                    CoreError::Auth(format!(
                        "cannot read security token file {}: {}",
                        path.display(),
                        e.kind()
                    ))
                })?;
                let token = raw.trim();
                if token.is_empty() {
                    return Err(CoreError::Auth(format!(
                        "security token file {} is empty",
                        path.display()
                    )));
                }
                let expires_at = token_expiry(token);
                if let Some(exp) = expires_at {
                    if exp <= now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECS) {
                        return Err(CoreError::Auth(format!(
                            "security token for profile {} expired at {}; run `oci session refresh --profile {}`",
                            profile.name,
                            exp.to_rfc3339(),
                            profile.name
                        )));
                    }
                }
                (Some(path), expires_at, short_digest(token.as_bytes()))
            }
            AuthMode::ApiKey => {
                let missing: Vec<&str> = [
                    ("tenancy", identity.tenancy.is_none()),
                    ("user", identity.user.is_none()),
                    ("fingerprint", identity.key_fingerprint.is_none()),
                    ("key_file", identity.key_file.is_none()),
                ]
                .into_iter()
                .filter_map(|(key, absent)| absent.then_some(key))
                .collect();
                if !missing.is_empty() {
                    return Err(CoreError::Auth(format!(
                        "no signer available: profile {} is missing {}",
                        profile.name,
                        missing.join(", ")
                    )));
                }
                let material = format!(
                    "{}:{}",
                    identity.key_fingerprint.as_deref().unwrap_or_default(),
                    identity
                        .key_file
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                );
                (None, None, short_digest(material.as_bytes()))
            }
        };

        tracing::debug!(mode = %mode, profile = %profile.name, "Resolved credentials");
        Ok(CredentialContext {
            mode,
            profile: profile.name.clone(),
            token_path,
            token_expires_at,
            resolved_at: now,
            region,
            identity,
            signature,
        })
    }
}

/// `exp` claim of a JWT; `None` for opaque tokens
fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    DateTime::from_timestamp(claims.get("exp")?.as_i64()?, 0)
}

fn short_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}
