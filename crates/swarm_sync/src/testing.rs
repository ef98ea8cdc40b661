//! In-memory registry and orchestrator used by the tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::dto::image::ImageReference;
use crate::dto::service::{ContainerSpec, ObjectVersion, ServiceSpec, SwarmService, TaskTemplate};
use crate::orchestrator::{Orchestrator, OrchestratorError, VersionedSpec};
use crate::registry::{RegistryError, TagRegistry};

#[derive(Default)]
pub struct FakeRegistry {
    tags: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, canonical_name: &str, tags: &[&str]) -> Self {
        self.tags.insert(canonical_name.to_string(), tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn failing(mut self, canonical_name: &str) -> Self {
        self.failing.insert(canonical_name.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagRegistry for FakeRegistry {
    async fn list_tags(&self, image: &ImageReference) -> Result<Vec<String>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let name = image.canonical_name();
        if self.failing.contains(&name) {
            return Err(RegistryError::Status { status: 503, url: name });
        }

        self.tags.get(&name)
            .cloned()
            .ok_or(RegistryError::Status { status: 404, url: name })
    }
}

/// A recorded call to [`Orchestrator::update_service_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpdate {
    pub id: String,
    pub version: u64,
    pub image: String,
}

#[derive(Default)]
pub struct FakeOrchestrator {
    services: Mutex<Vec<SwarmService>>,
    conflicting: HashSet<String>,
    updates: Mutex<Vec<RecordedUpdate>>,
}

impl FakeOrchestrator {
    pub fn new(services: Vec<SwarmService>) -> Self {
        Self {
            services: Mutex::new(services),
            ..Default::default()
        }
    }

    /// Reject every update of the service as if it had been modified concurrently.
    pub fn conflicting(mut self, id: &str) -> Self {
        self.conflicting.insert(id.to_string());
        self
    }

    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list_services(&self) -> Result<Vec<SwarmService>, OrchestratorError> {
        Ok(self.services.lock().unwrap().clone())
    }

    async fn inspect_service(&self, id: &str) -> Result<VersionedSpec, OrchestratorError> {
        let services = self.services.lock().unwrap();
        let service = services.iter()
            .find(|s| s.id == id)
            .ok_or_else(|| OrchestratorError::Api { status: 404, message: format!("service {} not found", id) })?;

        Ok(VersionedSpec {
            version: service.version.index,
            spec: serde_json::to_value(&service.spec).unwrap(),
        })
    }

    async fn update_service_image(&self, id: &str, current: VersionedSpec, image: &str) -> Result<(), OrchestratorError> {
        if self.conflicting.contains(id) {
            return Err(OrchestratorError::Conflict {
                id: id.to_string(),
                message: "update out of sequence".to_string(),
            });
        }

        let mut services = self.services.lock().unwrap();
        let service = services.iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| OrchestratorError::Api { status: 404, message: format!("service {} not found", id) })?;

        if service.version.index != current.version {
            return Err(OrchestratorError::Conflict {
                id: id.to_string(),
                message: "update out of sequence".to_string(),
            });
        }

        service.version.index += 1;
        service.spec.task_template.container_spec = Some(ContainerSpec { image: image.to_string() });

        self.updates.lock().unwrap().push(RecordedUpdate {
            id: id.to_string(),
            version: current.version,
            image: image.to_string(),
        });

        Ok(())
    }
}

/// A service running `image`, with the given labels.
pub fn swarm_service(id: &str, name: &str, image: &str, labels: &[(&str, &str)]) -> SwarmService {
    SwarmService {
        id: id.to_string(),
        version: ObjectVersion { index: 10 },
        spec: ServiceSpec {
            name: name.to_string(),
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            task_template: TaskTemplate {
                container_spec: Some(ContainerSpec { image: image.to_string() }),
            },
        },
    }
}

/// A managed service running `image`, following `pattern` when given.
pub fn managed_service(id: &str, name: &str, image: &str, pattern: Option<&str>) -> SwarmService {
    let mut labels = vec![("swarm-sync.managed", "true")];
    if let Some(pattern) = pattern {
        labels.push(("swarm-sync.image-pattern", pattern));
    }

    swarm_service(id, name, image, &labels)
}
