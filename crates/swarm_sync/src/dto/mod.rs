use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub mod image;
pub mod service;

/// An update that was applied to a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub service: String,
    pub from_image: String,
    pub to_image: String,
}

impl UpdateOutcome {
    pub fn new(service: String, from_image: String, to_image: String) -> Self {
        Self {
            service,
            from_image,
            to_image,
        }
    }
}

/// A service that could not be reconciled during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceFailure {
    /// Position of the service in the pass.
    pub index: usize,
    pub service: String,
    pub error: String,
}

/// The result of one reconciliation pass over every managed service.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Amount of managed services that were looked at.
    pub checked: usize,
    pub updates: Vec<UpdateOutcome>,
    pub failures: Vec<ServiceFailure>,
}

impl PassReport {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();

        Self {
            id,
            started_at: now,
            finished_at: now,
            checked: 0,
            updates: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}
