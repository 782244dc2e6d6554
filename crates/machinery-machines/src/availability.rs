//! Waiting for machine deployments to become available

use kube::api::DynamicObject;
use tracing::info;

use machinery_common::kube_utils::poll_until;
use machinery_common::Error;

use crate::config::ReconcileConfig;
use crate::resource::{name_contained_in, MachineDeployment, MachineResource};
use crate::store::MachineStore;

/// Ready and wanted replica totals over a set of machine deployments
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Sum of `status.readyReplicas`
    pub ready: u64,
    /// Sum of `spec.replicas`
    pub desired: u64,
}

impl Readiness {
    /// Every wanted replica is ready
    pub fn is_available(&self) -> bool {
        self.ready >= self.desired
    }
}

/// Sum replica counts of the listed deployments whose name is desired
///
/// Counts that are missing or not numbers count as zero, so a deployment
/// without status yet holds the wait open.
pub fn readiness(actual: &[DynamicObject], desired: &[MachineDeployment]) -> Readiness {
    actual
        .iter()
        .filter(|d| {
            d.metadata
                .name
                .as_deref()
                .is_some_and(|name| name_contained_in(name, desired))
        })
        .fold(Readiness::default(), |acc, d| Readiness {
            ready: acc.ready.saturating_add(count_at(d, "status", "readyReplicas")),
            desired: acc.desired.saturating_add(count_at(d, "spec", "replicas")),
        })
}

fn count_at(obj: &DynamicObject, section: &str, field: &str) -> u64 {
    obj.data
        .get(section)
        .and_then(|s| s.get(field))
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

/// Poll until every desired machine deployment reports all replicas ready
///
/// Only deployments that are both listed and desired count; a desired
/// deployment that is not listed yet contributes nothing. A failed listing
/// ends the wait with that error instead of being retried, leaving retries
/// to the next reconciliation cycle.
pub async fn wait_until_machine_deployments_available(
    store: &dyn MachineStore,
    namespace: &str,
    desired: &[MachineDeployment],
    config: &ReconcileConfig,
) -> Result<(), Error> {
    poll_until(
        config.timeout,
        config.poll_interval,
        "machine deployments to become available",
        move || async move {
            let actual = store.list(&MachineResource::Deployment, namespace).await?;
            let readiness = readiness(&actual, desired);
            info!(
                namespace = %namespace,
                ready = readiness.ready,
                desired = readiness.desired,
                "Waiting for machine deployments to become available"
            );
            Ok::<_, Error>(readiness.is_available())
        },
    )
    .await
}
