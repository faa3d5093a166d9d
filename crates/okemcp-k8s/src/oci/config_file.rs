//! OCI CLI configuration file (`~/.oci/config`)
//!
//! INI-style: `[PROFILE]` sections of `key = value` pairs. Named profiles
//! inherit keys from `[DEFAULT]`, matching the OCI SDKs.

use secrecy::SecretString;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use okemcp_types::{CoreError, Result};

pub const DEFAULT_PROFILE: &str = "DEFAULT";

/// Default location of the OCI CLI config file
pub fn default_config_path() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".oci").join("config"))
}

/// Expand a leading `~/` against the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[derive(Clone, Debug, Default)]
pub struct OciConfigFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl OciConfigFile {
    /// Read a config file; a missing file yields an empty config
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "OCI config file not present");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("failed to read OCI config {}: {}", path.display(), e))
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('='))
            else {
                continue;
            };
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        Self { sections }
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Profile view with `[DEFAULT]` inheritance; `None` if neither exists
    pub fn profile(&self, name: &str) -> Option<ProfileSection> {
        let own = self.sections.get(name);
        let inherited = self.sections.get(DEFAULT_PROFILE);
        if own.is_none() && inherited.is_none() {
            return None;
        }

        let lookup = |key: &str| -> Option<String> {
            own.and_then(|s| s.get(key))
                .or_else(|| inherited.and_then(|s| s.get(key)))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(ProfileSection {
            name: name.to_string(),
            tenancy: lookup("tenancy"),
            user: lookup("user"),
            fingerprint: lookup("fingerprint"),
            key_file: lookup("key_file").map(|p| expand_home(&p)),
            pass_phrase: lookup("pass_phrase").map(SecretString::from),
            region: lookup("region"),
            security_token_file: lookup("security_token_file").map(|p| expand_home(&p)),
        })
    }
}

/// Signing-relevant keys of one profile
#[derive(Clone, Debug)]
pub struct ProfileSection {
    pub name: String,
    pub tenancy: Option<String>,
    pub user: Option<String>,
    pub fingerprint: Option<String>,
    pub key_file: Option<PathBuf>,
    pub pass_phrase: Option<SecretString>,
    pub region: Option<String>,
    pub security_token_file: Option<PathBuf>,
}

impl ProfileSection {
    /// Placeholder for a profile absent from the config file
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tenancy: None,
            user: None,
            fingerprint: None,
            key_file: None,
            pass_phrase: None,
            region: None,
            security_token_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
# OCI CLI config
[DEFAULT]
user = ocid1.user.oc1..aaa
fingerprint = 11:22:33
tenancy = ocid1.tenancy.oc1..bbb
region = us-ashburn-1
key_file = /keys/oci_api_key.pem

[SESSION]
security_token_file = /tokens/token
region=eu-frankfurt-1
pass_phrase = hunter2
"#;

    #[test]
    fn test_parse_sections() {
        let config = OciConfigFile::parse(SAMPLE);
        assert!(config.has_profile("DEFAULT"));
        assert!(config.has_profile("SESSION"));
        assert!(!config.has_profile("OTHER"));

        let default = config.profile("DEFAULT").unwrap();
        assert_eq!(default.tenancy.as_deref(), Some("ocid1.tenancy.oc1..bbb"));
        assert_eq!(default.key_file, Some(PathBuf::from("/keys/oci_api_key.pem")));
        assert!(default.security_token_file.is_none());
    }

    #[test]
    fn test_named_profile_inherits_default() {
        let config = OciConfigFile::parse(SAMPLE);
        let session = config.profile("SESSION").unwrap();
        assert_eq!(session.region.as_deref(), Some("eu-frankfurt-1"));
        assert_eq!(session.user.as_deref(), Some("ocid1.user.oc1..aaa"));
        assert_eq!(session.security_token_file, Some(PathBuf::from("/tokens/token")));
        assert_eq!(session.pass_phrase.unwrap().expose_secret(), "hunter2");
    }

    #[test]
    fn test_pass_phrase_not_in_debug() {
        let config = OciConfigFile::parse(SAMPLE);
        let session = config.profile("SESSION").unwrap();
        assert!(!format!("{:?}", session).contains("hunter2"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let config = OciConfigFile::load(Path::new("/nonexistent/oci/config")).unwrap();
        assert!(config.profile("DEFAULT").is_none());
    }
}
