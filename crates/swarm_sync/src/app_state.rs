use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::dto::PassReport;
use crate::error::AppError;
use crate::registry::TagRegistry;
use crate::sync::scheduler::BatchScheduler;

pub struct AppState {
    pub config: Config,
    pub registry: Arc<dyn TagRegistry>,
    pub scheduler: BatchScheduler,
    /// Held for the whole duration of a pass, passes never overlap.
    pass_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config, registry: Arc<dyn TagRegistry>, scheduler: BatchScheduler) -> Self
    {
        Self {
            config,
            registry,
            scheduler,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run a pass unless one is already running.
    pub async fn run_pass(&self) -> Result<PassReport, AppError> {
        let _guard = self.pass_lock.try_lock()
            .map_err(|_| AppError::PassInProgress)?;

        Ok(self.scheduler.check_and_update().await?)
    }
}
