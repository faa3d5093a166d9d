//! Container Engine (OKE) REST client

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use okemcp_types::{ClusterSummary, ControlPlanePage, CoreError, NodePoolSummary, Result};

use crate::credentials::CredentialContext;
use crate::kubeconfig::KubeconfigPayload;
use crate::oci::signer::RequestSigner;

const API_VERSION: &str = "20180222";
const NEXT_PAGE_HEADER: &str = "opc-next-page";

/// Which cluster API endpoint generated kubeconfigs point at
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KubeEndpoint {
    #[default]
    Public,
    Private,
    VcnHostname,
    Legacy,
}

impl KubeEndpoint {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC_ENDPOINT",
            Self::Private => "PRIVATE_ENDPOINT",
            Self::VcnHostname => "VCN_HOSTNAME",
            Self::Legacy => "LEGACY_KUBERNETES",
        }
    }
}

impl fmt::Display for KubeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for KubeEndpoint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase().replace('-', "_");
        match upper.trim_end_matches("_ENDPOINT") {
            "PUBLIC" => Ok(Self::Public),
            "PRIVATE" => Ok(Self::Private),
            "VCN_HOSTNAME" => Ok(Self::VcnHostname),
            "LEGACY_KUBERNETES" | "LEGACY" => Ok(Self::Legacy),
            _ => Err(CoreError::Config(format!(
                "unknown kubeconfig endpoint '{}' (expected PUBLIC_ENDPOINT or PRIVATE_ENDPOINT)",
                s
            ))),
        }
    }
}

/// Parameters of the kubeconfig generation call
#[derive(Clone, Debug)]
pub struct KubeconfigRequest {
    pub endpoint: KubeEndpoint,
    pub token_version: String,
    pub expiration: Duration,
}

impl Default for KubeconfigRequest {
    fn default() -> Self {
        Self {
            endpoint: KubeEndpoint::Public,
            token_version: "2.0.0".to_string(),
            expiration: Duration::from_secs(3600),
        }
    }
}

impl KubeconfigRequest {
    /// The service accepts expirations between 5 minutes and 24 hours
    pub fn expiration_secs(&self) -> u64 {
        self.expiration.as_secs().clamp(300, 86_400)
    }
}

/// Read operations against the OKE control plane
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_kubeconfig(
        &self,
        cluster_id: &str,
        request: &KubeconfigRequest,
        ctx: &CredentialContext,
    ) -> Result<KubeconfigPayload>;

    async fn list_clusters(
        &self,
        compartment_id: &str,
        page: Option<&str>,
        limit: Option<u32>,
        ctx: &CredentialContext,
    ) -> Result<ControlPlanePage<ClusterSummary>>;

    async fn get_cluster(&self, cluster_id: &str, ctx: &CredentialContext)
    -> Result<ClusterSummary>;

    async fn list_node_pools(
        &self,
        compartment_id: &str,
        cluster_id: Option<&str>,
        page: Option<&str>,
        limit: Option<u32>,
        ctx: &CredentialContext,
    ) -> Result<ControlPlanePage<NodePoolSummary>>;

    async fn get_node_pool(
        &self,
        node_pool_id: &str,
        ctx: &CredentialContext,
    ) -> Result<NodePoolSummary>;
}

/// Signed HTTPS client for `containerengine.<region>.oraclecloud.com`
pub struct ContainerEngineClient {
    http: reqwest::Client,
    endpoint_override: Option<String>,
}

impl ContainerEngineClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("oke-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint_override: None,
        })
    }

    /// Use a fixed service endpoint instead of the regional default
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    fn base_url(&self, ctx: &CredentialContext) -> Result<Url> {
        let raw = match &self.endpoint_override {
            Some(endpoint) => format!("{}/{}/", endpoint.trim_end_matches('/'), API_VERSION),
            None => {
                let region = ctx.region.as_deref().ok_or_else(|| {
                    CoreError::Config(format!(
                        "no region configured for profile {}; set region in the OCI config or OCI_REGION",
                        ctx.profile
                    ))
                })?;
                format!(
                    "https://containerengine.{}.oraclecloud.com/{}/",
                    region, API_VERSION
                )
            }
        };
        Url::parse(&raw).map_err(|e| CoreError::Config(format!("invalid endpoint {}: {}", raw, e)))
    }

    fn url(&self, ctx: &CredentialContext, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url(ctx)?
            .join(path)
            .map_err(|e| CoreError::Config(format!("invalid request path {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        ctx: &CredentialContext,
    ) -> Result<reqwest::Response> {
        let signer = RequestSigner::from_context(ctx)?;
        let headers = signer.sign(&method, &url, body.as_deref(), Utc::now())?;

        tracing::debug!(method = %method, path = url.path(), "Control plane request");
        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(status_error(status, &text))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        ctx: &CredentialContext,
    ) -> Result<(T, Option<String>)> {
        let response = self.send(Method::GET, url, None, ctx).await?;
        let next = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let body = response.json::<T>().await.map_err(|e| CoreError::Upstream {
            status: 502,
            message: format!("malformed control plane response: {}", e),
        })?;
        Ok((body, next))
    }
}

#[async_trait]
impl ControlPlane for ContainerEngineClient {
    async fn create_kubeconfig(
        &self,
        cluster_id: &str,
        request: &KubeconfigRequest,
        ctx: &CredentialContext,
    ) -> Result<KubeconfigPayload> {
        let url = self.url(ctx, &format!("clusters/{}/kubeconfig/content", cluster_id), &[])?;
        let body = serde_json::json!({
            "tokenVersion": request.token_version,
            "expiration": request.expiration_secs(),
            "endpoint": request.endpoint.as_api_str(),
        });
        let body = serde_json::to_vec(&body)
            .map_err(|e| CoreError::Validation(format!("failed to encode request: {}", e)))?;

        let response = self.send(Method::POST, url, Some(body), ctx).await?;
        let text = response.text().await.map_err(transport_error)?;
        Ok(KubeconfigPayload::from_response_text(text))
    }

    async fn list_clusters(
        &self,
        compartment_id: &str,
        page: Option<&str>,
        limit: Option<u32>,
        ctx: &CredentialContext,
    ) -> Result<ControlPlanePage<ClusterSummary>> {
        let limit = limit.map(|l| l.to_string());
        let mut query = vec![("compartmentId", compartment_id)];
        if let Some(limit) = &limit {
            query.push(("limit", limit.as_str()));
        }
        if let Some(page) = page {
            query.push(("page", page));
        }
        let url = self.url(ctx, "clusters", &query)?;
        let (items, next) = self.get_json::<Vec<ClusterSummary>>(url, ctx).await?;
        Ok(ControlPlanePage { items, next })
    }

    async fn get_cluster(
        &self,
        cluster_id: &str,
        ctx: &CredentialContext,
    ) -> Result<ClusterSummary> {
        let url = self.url(ctx, &format!("clusters/{}", cluster_id), &[])?;
        Ok(self.get_json::<ClusterSummary>(url, ctx).await?.0)
    }

    async fn list_node_pools(
        &self,
        compartment_id: &str,
        cluster_id: Option<&str>,
        page: Option<&str>,
        limit: Option<u32>,
        ctx: &CredentialContext,
    ) -> Result<ControlPlanePage<NodePoolSummary>> {
        let limit = limit.map(|l| l.to_string());
        let mut query = vec![("compartmentId", compartment_id)];
        if let Some(cluster_id) = cluster_id {
            query.push(("clusterId", cluster_id));
        }
        if let Some(limit) = &limit {
            query.push(("limit", limit.as_str()));
        }
        if let Some(page) = page {
            query.push(("page", page));
        }
        let url = self.url(ctx, "nodePools", &query)?;
        let (items, next) = self.get_json::<Vec<NodePoolSummary>>(url, ctx).await?;
        Ok(ControlPlanePage { items, next })
    }

    async fn get_node_pool(
        &self,
        node_pool_id: &str,
        ctx: &CredentialContext,
    ) -> Result<NodePoolSummary> {
        let url = self.url(ctx, &format!("nodePools/{}", node_pool_id), &[])?;
        Ok(self.get_json::<NodePoolSummary>(url, ctx).await?.0)
    }
}

#[derive(Deserialize)]
struct ServiceError {
    code: Option<String>,
    message: Option<String>,
}

/// Map a non-success control plane status onto the error taxonomy
pub fn status_error(status: StatusCode, body: &str) -> CoreError {
    let detail = match serde_json::from_str::<ServiceError>(body) {
        Ok(ServiceError {
            code: Some(code),
            message: Some(message),
        }) => format!("{}: {}", code, message),
        Ok(ServiceError {
            message: Some(message),
            ..
        }) => message,
        _ => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    match status {
        StatusCode::UNAUTHORIZED => CoreError::Auth(format!("control plane rejected credentials: {}", detail)),
        StatusCode::NOT_FOUND => CoreError::NotFound(detail),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => CoreError::NetworkTimeout(detail),
        _ => CoreError::Upstream {
            status: status.as_u16(),
            message: detail,
        },
    }
}

/// Only timeouts are `NetworkTimeout`; refused connections, DNS and TLS
/// failures are upstream errors
fn transport_error(err: reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::NetworkTimeout(format!("control plane timed out: {}", err))
    } else {
        CoreError::Upstream {
            status: 502,
            message: format!("control plane request failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use okemcp_types::ErrorCode;

    #[test]
    fn test_endpoint_parse_accepts_short_and_api_forms() {
        assert_eq!("public".parse::<KubeEndpoint>().unwrap(), KubeEndpoint::Public);
        assert_eq!("PRIVATE_ENDPOINT".parse::<KubeEndpoint>().unwrap(), KubeEndpoint::Private);
        assert_eq!("vcn-hostname".parse::<KubeEndpoint>().unwrap(), KubeEndpoint::VcnHostname);
        assert!("internal".parse::<KubeEndpoint>().is_err());
    }

    #[test]
    fn test_expiration_clamped() {
        let mut request = KubeconfigRequest::default();
        request.expiration = Duration::from_secs(10);
        assert_eq!(request.expiration_secs(), 300);
        request.expiration = Duration::from_secs(7 * 86_400);
        assert_eq!(request.expiration_secs(), 86_400);
    }

    #[test]
    fn test_status_mapping() {
        let body = r#"{"code":"NotAuthorizedOrNotFound","message":"cluster missing"}"#;
        let err = status_error(StatusCode::NOT_FOUND, body);
        assert_eq!(err.code(), ErrorCode::NotFoundError);
        assert!(err.to_string().contains("cluster missing"));

        assert!(status_error(StatusCode::UNAUTHORIZED, "").is_auth());
        assert_eq!(status_error(StatusCode::SERVICE_UNAVAILABLE, "oops").upstream_status(), Some(503));
    }

    #[tokio::test]
    async fn test_refused_connection_is_upstream() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_connect());
        let err = transport_error(err);
        assert_eq!(err.code(), ErrorCode::UpstreamError);
        assert_eq!(err.upstream_status(), Some(502));
    }
}
