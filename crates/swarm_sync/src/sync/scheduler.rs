use std::time::Duration;

use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::dto::service::{managed_services, ManagementLabels, ServiceDescriptor};
use crate::dto::{PassReport, ServiceFailure};
use crate::orchestrator::OrchestratorError;

use super::reconciler::Reconciler;

/// Runs reconciliation passes over the managed services, one service at a time.
pub struct BatchScheduler {
    reconciler: Reconciler,
    labels: ManagementLabels,
    /// Pause between two services, keeps load on the registry and the swarm managers low.
    delay: Duration,
}

impl BatchScheduler {
    pub fn new(reconciler: Reconciler, labels: ManagementLabels, delay: Duration) -> Self {
        Self {
            reconciler,
            labels,
            delay,
        }
    }

    /// List the cluster inventory and reconcile every managed service in it.
    pub async fn check_and_update(&self) -> Result<PassReport, OrchestratorError> {
        let inventory = self.reconciler.orchestrator().list_services().await?;
        let services = managed_services(&inventory, &self.labels);

        if services.is_empty() {
            info!("No managed services found in swarm");
        } else {
            info!("Found {} managed services", services.len());
        }

        Ok(self.run_pass(&services).await)
    }

    /// Reconcile the services strictly in order.
    ///
    /// A failing service is recorded in the report and the pass moves on to the next one.
    pub async fn run_pass(&self, services: &[ServiceDescriptor]) -> PassReport {
        let mut report = PassReport::new(Uuid::new_v4());
        let span = info_span!("pass", id = %report.id);

        async {
            for (i, service) in services.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(self.delay).await;
                }

                report.checked += 1;
                match self.reconciler.reconcile(service).await {
                    Ok(Some(outcome)) => report.updates.push(outcome),
                    Ok(None) => {},
                    Err(e) => {
                        error!("Failed to reconcile service '{}' ({} of {}): {}", service.name, i + 1, services.len(), e);
                        report.failures.push(ServiceFailure {
                            index: i,
                            service: service.name.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            info!(
                "Pass finished, {} checked, {} updated, {} failed",
                report.checked, report.updates.len(), report.failures.len()
            );
        }.instrument(span).await;

        report.finish()
    }
}
