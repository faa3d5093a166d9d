//! Snapshot of the process environment
//!
//! Components read environment variables through this type instead of
//! `std::env` so the precedence rules can be exercised deterministically.

use std::collections::HashMap;

/// Compartment id variables, first hit wins
pub const COMPARTMENT_ENV: &[&str] = &["OKE_COMPARTMENT_ID", "COMPARTMENT_OCID"];
/// Cluster id variables, first hit wins
pub const CLUSTER_ENV: &[&str] = &["OKE_CLUSTER_ID", "CLUSTER_OCID"];
pub const AUTH_ENV: &str = "OCI_CLI_AUTH";
pub const PROFILE_ENV: &[&str] = &["OCI_CLI_PROFILE", "OCI_PROFILE"];
pub const CONFIG_FILE_ENV: &str = "OCI_CONFIG_FILE";
pub const TOKEN_FILE_ENV: &str = "OCI_SECURITY_TOKEN_FILE";
pub const REGION_ENV: &[&str] = &["OCI_REGION", "OCI_CLI_REGION"];

#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-blank, trimmed value of a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-blank value among several variable names
    pub fn first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_skips_blank_values() {
        let env = Environment::from_pairs([("OKE_CLUSTER_ID", "  "), ("CLUSTER_OCID", "ocid1.cluster.b")]);
        assert_eq!(env.first(CLUSTER_ENV), Some("ocid1.cluster.b"));
        assert_eq!(env.first(COMPARTMENT_ENV), None);
    }
}
