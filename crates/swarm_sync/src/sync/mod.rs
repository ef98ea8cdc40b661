pub mod reconciler;
pub mod scheduler;

use thiserror::Error;

use crate::orchestrator::OrchestratorError;
use crate::registry::RegistryError;

/// Why a single service could not be reconciled.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to list tags: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to update service: {0}")]
    Update(#[from] OrchestratorError),
}
