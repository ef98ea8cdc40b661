use std::sync::Arc;

use tracing::{debug, info};

use crate::dto::service::ServiceDescriptor;
use crate::dto::UpdateOutcome;
use crate::orchestrator::Orchestrator;
use crate::registry::TagRegistry;
use crate::resolver::resolve_latest;

use super::SyncError;

/// Brings a single service to the newest tag its pattern allows.
pub struct Reconciler {
    registry: Arc<dyn TagRegistry>,
    orchestrator: Arc<dyn Orchestrator>,
}

impl Reconciler {
    pub fn new(registry: Arc<dyn TagRegistry>, orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            registry,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    /// Reconcile one service.
    ///
    /// Returns the applied update, or `None` if there was no matching tag or the service
    /// already runs it. The service spec is read right before the update and its version is
    /// sent along, a concurrent change makes the update fail instead of being retried.
    pub async fn reconcile(&self, service: &ServiceDescriptor) -> Result<Option<UpdateOutcome>, SyncError> {
        let latest = resolve_latest(self.registry.as_ref(), &service.image, &service.tag_pattern).await?;

        let latest = match latest {
            Some(tag) if tag != service.current_image_tag() => tag,
            Some(_) => {
                debug!("Service '{}' already runs the latest tag of {}", service.name, service.current_image_repository());
                return Ok(None);
            },
            None => return Ok(None),
        };

        let target = service.image.with_tag(&latest);

        let current = self.orchestrator.inspect_service(&service.id).await?;
        self.orchestrator.update_service_image(&service.id, current, &target.to_string()).await?;

        info!("Updated service '{}' from {} to {}", service.name, service.image.as_written(), target);

        Ok(Some(UpdateOutcome::new(
            service.name.clone(),
            service.image.as_written().to_string(),
            target.to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::dto::service::{managed_services, ManagementLabels};
    use crate::orchestrator::OrchestratorError;
    use crate::testing::{managed_service, FakeOrchestrator, FakeRegistry, RecordedUpdate};

    use super::*;

    fn descriptor(image: &str, pattern: Option<&str>) -> ServiceDescriptor {
        let services = vec![managed_service("svc1", "web", image, pattern)];
        managed_services(&services, &ManagementLabels::new("swarm-sync")).remove(0)
    }

    fn setup(registry: FakeRegistry, orchestrator: FakeOrchestrator) -> (Reconciler, Arc<FakeOrchestrator>) {
        let orchestrator = Arc::new(orchestrator);
        (Reconciler::new(Arc::new(registry), orchestrator.clone()), orchestrator)
    }

    #[tokio::test]
    async fn updates_to_the_newest_matching_tag() {
        let service = descriptor("repo:5.1", Some("glob:5.*"));
        let (reconciler, orchestrator) = setup(
            FakeRegistry::new().with_tags("docker.io/library/repo", &["5.1", "5.2", "6.0"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "repo:5.1", Some("glob:5.*"))]),
        );

        let outcome = reconciler.reconcile(&service).await.unwrap();
        assert_eq!(outcome, Some(UpdateOutcome::new("web".into(), "repo:5.1".into(), "repo:5.2".into())));
        assert_eq!(orchestrator.updates(), vec![RecordedUpdate {
            id: "svc1".into(),
            version: 10,
            image: "repo:5.2".into(),
        }]);
    }

    #[tokio::test]
    async fn up_to_date_service_is_left_alone() {
        let service = descriptor("repo:5.1", Some("glob:5.*"));
        let (reconciler, orchestrator) = setup(
            FakeRegistry::new().with_tags("docker.io/library/repo", &["5.1"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "repo:5.1", Some("glob:5.*"))]),
        );

        assert_eq!(reconciler.reconcile(&service).await.unwrap(), None);
        assert!(orchestrator.updates().is_empty());
    }

    #[tokio::test]
    async fn higher_tags_outside_the_pattern_are_ignored() {
        let service = descriptor("repo:5.2", Some("glob:5.*"));
        let (reconciler, orchestrator) = setup(
            FakeRegistry::new().with_tags("docker.io/library/repo", &["5.1", "5.2", "6.0", "7.1"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "repo:5.2", Some("glob:5.*"))]),
        );

        assert_eq!(reconciler.reconcile(&service).await.unwrap(), None);
        assert!(orchestrator.updates().is_empty());
    }

    #[tokio::test]
    async fn no_matching_tag_is_not_an_update() {
        let service = descriptor("repo:5.1", Some("glob:9.*"));
        let (reconciler, orchestrator) = setup(
            FakeRegistry::new().with_tags("docker.io/library/repo", &["5.1", "5.2"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "repo:5.1", Some("glob:9.*"))]),
        );

        assert_eq!(reconciler.reconcile(&service).await.unwrap(), None);
        assert!(orchestrator.updates().is_empty());
    }

    #[tokio::test]
    async fn untagged_image_follows_latest() {
        let service = descriptor("myimage", None);
        let (reconciler, orchestrator) = setup(
            FakeRegistry::new().with_tags("docker.io/library/myimage", &["1.0", "latest"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "myimage", None)]),
        );

        // `myimage` already is `myimage:latest`, the only tag the default pattern accepts.
        assert_eq!(reconciler.reconcile(&service).await.unwrap(), None);
        assert!(orchestrator.updates().is_empty());
    }

    #[tokio::test]
    async fn untagged_image_is_reported_as_written() {
        let service = descriptor("myimage@sha256:0123", Some("1.*"));
        let (reconciler, orchestrator) = setup(
            FakeRegistry::new().with_tags("docker.io/library/myimage", &["1.0", "1.1", "latest"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "myimage@sha256:0123", Some("1.*"))]),
        );

        let outcome = reconciler.reconcile(&service).await.unwrap().unwrap();
        assert_eq!(outcome.from_image, "myimage");
        assert_eq!(outcome.to_image, "myimage:1.1");
        assert_eq!(orchestrator.updates()[0].image, "myimage:1.1");
    }

    #[tokio::test]
    async fn registry_failure_is_an_error_without_update() {
        let service = descriptor("repo:5.1", Some("glob:5.*"));
        let (reconciler, orchestrator) = setup(
            FakeRegistry::new().failing("docker.io/library/repo"),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "repo:5.1", Some("glob:5.*"))]),
        );

        assert!(matches!(reconciler.reconcile(&service).await, Err(SyncError::Registry(_))));
        assert!(orchestrator.updates().is_empty());
    }

    #[tokio::test]
    async fn conflicting_update_is_surfaced() {
        let service = descriptor("repo:5.1", Some("glob:5.*"));
        let (reconciler, _orchestrator) = setup(
            FakeRegistry::new().with_tags("docker.io/library/repo", &["5.1", "5.2"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "repo:5.1", Some("glob:5.*"))])
                .conflicting("svc1"),
        );

        let err = reconciler.reconcile(&service).await.unwrap_err();
        assert!(matches!(err, SyncError::Update(OrchestratorError::Conflict { .. })));
    }

    #[tokio::test]
    async fn keeps_the_repository_as_written() {
        let service = descriptor("registry.local:5000/team/app:1.0", Some("1.*"));
        let (reconciler, _orchestrator) = setup(
            FakeRegistry::new().with_tags("registry.local:5000/team/app", &["1.0", "1.1"]),
            FakeOrchestrator::new(vec![managed_service("svc1", "web", "registry.local:5000/team/app:1.0", Some("1.*"))]),
        );

        let outcome = reconciler.reconcile(&service).await.unwrap().unwrap();
        assert_eq!(outcome.to_image, "registry.local:5000/team/app:1.1");
    }
}
