//! OCI control plane access

pub mod config_file;
pub mod container_engine;
pub mod signer;

pub use config_file::{OciConfigFile, ProfileSection};
pub use container_engine::{ContainerEngineClient, ControlPlane, KubeEndpoint, KubeconfigRequest};
pub use signer::RequestSigner;
