pub mod swarm;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::dto::service::SwarmService;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("connection to orchestrator failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("orchestrator request failed: {0}")]
    Transport(String),
    #[error("orchestrator request timed out after {0:?}")]
    Timeout(Duration),
    #[error("service '{id}' was modified concurrently: {message}")]
    Conflict {
        id: String,
        message: String,
    },
    #[error("orchestrator responded with {status}: {message}")]
    Api {
        status: u16,
        message: String,
    },
    #[error("invalid orchestrator response: {0}")]
    InvalidResponse(String),
    #[error("service spec is malformed: {0}")]
    MalformedSpec(String),
}

/// The specification of a service together with the version it was read at.
///
/// The spec is kept as raw json so that an update sends back every field, including the
/// ones this crate doesn't know about.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedSpec {
    pub version: u64,
    pub spec: Value,
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List every service in the cluster.
    async fn list_services(&self) -> Result<Vec<SwarmService>, OrchestratorError>;

    /// Read the current specification of a service and its version.
    async fn inspect_service(&self, id: &str) -> Result<VersionedSpec, OrchestratorError>;

    /// Replace the image of a service, forcing its tasks to be replaced.
    ///
    /// Parameters:
    /// * `id` - The id of the service to update.
    /// * `current` - The spec read by [`Orchestrator::inspect_service`]. Its version is sent
    /// along so the update is rejected with [`OrchestratorError::Conflict`] if the service
    /// changed in between.
    /// * `image` - The full image reference to run.
    async fn update_service_image(&self, id: &str, current: VersionedSpec, image: &str) -> Result<(), OrchestratorError>;
}
