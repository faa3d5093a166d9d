//! Mapping of Kubernetes client failures onto the error taxonomy

use std::error::Error as StdError;

use okemcp_types::CoreError;

/// Markers of a blocked or slow network path
const TIMEOUT_MARKERS: &[&str] = &["i/o timeout", "timed out", "timeout", "deadline has elapsed"];

/// The API server relays kubelet dial failures with the kubelet address
const KUBELET_PORT: &str = ":10250";

/// Convert a `kube::Error` raised while performing `what`
pub fn from_kube(err: kube::Error, what: &str) -> CoreError {
    match err {
        kube::Error::Api(resp) => from_status(resp.code, &resp.message, what),
        kube::Error::Auth(e) => CoreError::Auth(format!("{}: {}", what, e)),
        other if chain_mentions_timeout(&other) => {
            CoreError::NetworkTimeout(format!("{}: {}", what, other))
        }
        other => CoreError::Upstream {
            status: 502,
            message: format!("{}: {}", what, other),
        },
    }
}

/// Classify an API server status response
pub fn from_status(code: u16, message: &str, what: &str) -> CoreError {
    match code {
        401 => CoreError::Auth(format!("{}: cluster rejected credentials: {}", what, message)),
        404 => CoreError::NotFound(format!("{}: {}", what, message)),
        504 => CoreError::NetworkTimeout(format!("{}: {}", what, message)),
        c if c >= 500 && (mentions_timeout(message) || message.contains(KUBELET_PORT)) => {
            CoreError::NetworkTimeout(format!("{}: {}", what, message))
        }
        c => CoreError::Upstream {
            status: c,
            message: format!("{}: {}", what, message),
        },
    }
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_lowercase();
    TIMEOUT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Local transport failures count as timeouts only when something in the
/// source chain timed out; refused connections, DNS and TLS failures do not
fn chain_mentions_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        if mentions_timeout(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}
