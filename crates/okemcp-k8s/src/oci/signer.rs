//! OCI HTTP request signing (draft-cavage signatures, rsa-sha256)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::fs;

use okemcp_types::{AuthMode, CoreError, Result};

use crate::credentials::CredentialContext;

/// Signs control-plane requests for one credential context
pub struct RequestSigner {
    key_id: String,
    key: PKey<Private>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(key_id: String, key: PKey<Private>) -> Self {
        Self { key_id, key }
    }

    /// Load the private key and build the key id for a resolved context
    pub fn from_context(ctx: &CredentialContext) -> Result<Self> {
        let identity = &ctx.identity;
        let key_file = identity.key_file.as_ref().ok_or_else(|| {
            CoreError::Auth(format!(
                "no signer available: profile {} has no key_file",
                ctx.profile
            ))
        })?;
        let pem = fs::read(key_file).map_err(|e| {
            CoreError::Auth(format!(
                "no signer available: cannot read key_file {}: {}",
                key_file.display(),
                e
            ))
        })?;
        let key = match &identity.pass_phrase {
            Some(pass) => {
                PKey::private_key_from_pem_passphrase(&pem, pass.expose_secret().as_bytes())
            }
            None => PKey::private_key_from_pem(&pem),
        }
        .map_err(|_| {
            CoreError::Auth(format!(
                "no signer available: key_file {} is not a usable private key",
                key_file.display()
            ))
        })?;

        let key_id = match ctx.mode {
            AuthMode::SecurityToken => {
                let path = ctx.token_path.as_ref().ok_or_else(|| {
                    CoreError::Auth("no signer available: security token file not configured".into())
                })?;
                let token = fs::read_to_string(path).map_err(|e| {
                    CoreError::Auth(format!(
                        "cannot read security token file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                format!("ST${}", token.trim())
            }
            AuthMode::ApiKey => {
                let (Some(tenancy), Some(user), Some(fingerprint)) =
                    (&identity.tenancy, &identity.user, &identity.key_fingerprint)
                else {
                    return Err(CoreError::Auth(format!(
                        "no signer available: profile {} needs tenancy, user and fingerprint",
                        ctx.profile
                    )));
                };
                format!("{}/{}/{}", tenancy, user, fingerprint)
            }
        };

        Ok(Self::new(key_id, key))
    }

    /// Headers to attach to a request: date, host, authorization and, for
    /// requests with a body, the content headers covered by the signature
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
        now: DateTime<Utc>,
    ) -> Result<HeaderMap> {
        let host = url
            .host_str()
            .ok_or_else(|| CoreError::Config(format!("request url {} has no host", url)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let mut signed: Vec<(&'static str, String)> = vec![
            ("date", date),
            ("(request-target)", request_target(method, url)),
            ("host", host),
        ];
        if let Some(body) = body {
            signed.push(("x-content-sha256", STANDARD.encode(Sha256::digest(body))));
            signed.push(("content-type", "application/json".to_string()));
            signed.push(("content-length", body.len().to_string()));
        }

        let signing_string = signing_string(&signed);
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)
            .map_err(|e| CoreError::Auth(format!("request signing failed: {}", e)))?;
        signer
            .update(signing_string.as_bytes())
            .map_err(|e| CoreError::Auth(format!("request signing failed: {}", e)))?;
        let signature = signer
            .sign_to_vec()
            .map_err(|e| CoreError::Auth(format!("request signing failed: {}", e)))?;

        let header_names: Vec<&str> = signed.iter().map(|(name, _)| *name).collect();
        let authorization = format!(
            r#"Signature version="1",keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""#,
            self.key_id,
            header_names.join(" "),
            STANDARD.encode(signature)
        );

        let mut headers = HeaderMap::new();
        for (name, value) in signed.iter().filter(|(name, _)| *name != "(request-target)") {
            headers.insert(HeaderName::from_static(*name), header_value(value)?);
        }
        headers.insert(reqwest::header::AUTHORIZATION, header_value(&authorization)?);
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| CoreError::Auth("request signing produced an invalid header".into()))
}

/// `(request-target)` pseudo-header: lowercase method, path and query
pub fn request_target(method: &Method, url: &Url) -> String {
    let mut target = format!("{} {}", method.as_str().to_lowercase(), url.path());
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}

pub fn signing_string(headers: &[(&str, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}
