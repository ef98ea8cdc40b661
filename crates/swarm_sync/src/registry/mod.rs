pub mod distribution;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::dto::image::ImageReference;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("request to registry failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry request timed out after {0:?}")]
    Timeout(Duration),
    #[error("registry responded with {status} for '{url}'")]
    Status {
        status: u16,
        url: String,
    },
    #[error("registry authentication challenge could not be answered: {0}")]
    Challenge(String),
    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
}

/// A registry that can list the tags of a repository.
#[async_trait]
pub trait TagRegistry: Send + Sync {
    /// List every tag of the repository the image belongs to.
    ///
    /// The tags come back in whatever order the registry stored them in.
    async fn list_tags(&self, image: &ImageReference) -> Result<Vec<String>, RegistryError>;
}
