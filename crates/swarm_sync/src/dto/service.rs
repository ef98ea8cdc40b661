use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tag::TagPattern;

use super::image::ImageReference;

/// Pattern used when a managed service has no image pattern label.
pub const DEFAULT_IMAGE_PATTERN: &str = "latest";

/// A service as listed by the swarm, only the fields needed for reconciliation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmService {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub version: ObjectVersion,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectVersion {
    pub index: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub task_template: TaskTemplate,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskTemplate {
    #[serde(default)]
    pub container_spec: Option<ContainerSpec>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    #[serde(default)]
    pub image: String,
}

impl SwarmService {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.spec.labels.as_ref()
            .and_then(|labels| labels.get(key))
            .map(|v| v.as_str())
    }

    pub fn image(&self) -> Option<&str> {
        self.spec.task_template.container_spec.as_ref()
            .map(|c| c.image.as_str())
            .filter(|i| !i.is_empty())
    }
}

/// The label keys that opt a service into management, e.g. `swarm-sync.managed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementLabels {
    pub managed: String,
    pub image_pattern: String,
}

impl ManagementLabels {
    pub fn new(prefix: &str) -> Self {
        Self {
            managed: format!("{}.managed", prefix),
            image_pattern: format!("{}.image-pattern", prefix),
        }
    }
}

/// A managed service, normalized for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub image: ImageReference,
    pub tag_pattern: TagPattern,
}

impl ServiceDescriptor {
    /// The image repository as written in the service spec.
    pub fn current_image_repository(&self) -> &str {
        &self.image.name
    }

    pub fn current_image_tag(&self) -> &str {
        &self.image.tag
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Build descriptors for the services opted into management, in inventory order.
///
/// Services that are not opted in are dropped silently. Managed services whose image can't
/// be read are dropped with a warning so the rest of the inventory is still reconciled.
pub fn managed_services(services: &[SwarmService], labels: &ManagementLabels) -> Vec<ServiceDescriptor> {
    services.iter()
        .filter(|s| s.label(&labels.managed).map(is_truthy).unwrap_or(false))
        .filter_map(|s| {
            let image = match s.image() {
                Some(image) => image,
                None => {
                    warn!("Managed service '{}' has no container image, skipping", s.spec.name);
                    return None;
                }
            };

            let image = match ImageReference::parse(image) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Managed service '{}' has an unusable image: {}", s.spec.name, e);
                    return None;
                }
            };

            let tag_pattern = TagPattern::parse(
                s.label(&labels.image_pattern)
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .unwrap_or(DEFAULT_IMAGE_PATTERN)
            );

            debug!("Service '{}' runs {} with pattern '{}'", s.spec.name, image, tag_pattern);

            Some(ServiceDescriptor {
                id: s.id.clone(),
                name: s.spec.name.clone(),
                image,
                tag_pattern,
            })
        })
        .collect()
}
