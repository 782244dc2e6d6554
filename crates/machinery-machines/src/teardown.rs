//! Forced teardown of machine resources
//!
//! Machines are labelled for force deletion so the machine controller skips
//! draining, then the remaining resources are watched until every collection
//! is empty.

use std::fmt;
use std::sync::Arc;

use kube::api::DynamicObject;
use tracing::{debug, info, warn};

use machinery_common::{Error, FORCE_DELETION_LABEL, FORCE_DELETION_VALUE};

use crate::config::ReconcileConfig;
use crate::resource::MachineResource;
use crate::store::{count_items, MachineStore};

/// Whether a machine already carries `force-deletion=True`
pub fn is_force_deletion_labelled(machine: &DynamicObject) -> bool {
    machine
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(FORCE_DELETION_LABEL))
        .is_some_and(|v| v == FORCE_DELETION_VALUE)
}

/// Label one machine for force deletion, skipping the write if it is labelled
pub async fn label_machine(
    store: &dyn MachineStore,
    namespace: &str,
    machine: &DynamicObject,
) -> Result<(), Error> {
    let name = machine
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::malformed("Machine", "<unnamed>", "missing metadata.name"))?;

    if is_force_deletion_labelled(machine) {
        debug!(machine = %name, "Machine already labelled for force deletion");
        return Ok(());
    }

    store
        .label(
            &MachineResource::Machine,
            namespace,
            name,
            FORCE_DELETION_LABEL,
            FORCE_DELETION_VALUE,
        )
        .await
        .map_err(|e| e.in_step(format!("labelling machine {}", name)))?;
    debug!(machine = %name, "Labelled machine for force deletion");
    Ok(())
}

/// Label every machine in `namespace` for force deletion
///
/// One task per machine, all in flight at once. Every task runs to
/// completion before failures are reported, so a single bad machine does
/// not leave the others unlabelled.
pub async fn label_machines_for_force_deletion(
    store: Arc<dyn MachineStore>,
    namespace: &str,
) -> Result<usize, Error> {
    let machines = store.list(&MachineResource::Machine, namespace).await?;
    let total = machines.len();

    let tasks = machines.into_iter().map(|machine| {
        let store = Arc::clone(&store);
        let namespace = namespace.to_string();
        tokio::spawn(async move { label_machine(store.as_ref(), &namespace, &machine).await })
    });

    let errors: Vec<Error> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .filter_map(|joined| match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(e) => Some(Error::internal_with_context(
                "label_machines_for_force_deletion",
                format!("labelling task failed: {}", e),
            )),
        })
        .collect();

    if !errors.is_empty() {
        warn!(namespace = %namespace, failed = errors.len(), total, "Failed to label machines");
        return Err(Error::aggregate("labelling machines", errors));
    }

    info!(namespace = %namespace, machines = total, "Labelled machines for force deletion");
    Ok(total)
}

/// Collections still holding objects, with their last observed counts
struct ExtinctionTracker {
    remaining: Vec<(MachineResource, usize)>,
}

impl ExtinctionTracker {
    fn new(resources: Vec<MachineResource>) -> Self {
        Self {
            remaining: resources.into_iter().map(|r| (r, usize::MAX)).collect(),
        }
    }

    /// Recount the collections not yet seen empty and drop those now empty
    async fn refresh(&mut self, store: &dyn MachineStore, namespace: &str) -> Result<(), Error> {
        for (resource, count) in &mut self.remaining {
            *count = count_items(store, resource, namespace).await?;
        }
        self.remaining.retain(|(_, count)| *count > 0);
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl fmt::Display for ExtinctionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = self
            .remaining
            .iter()
            .map(|(resource, count)| format!("{} {}", count, resource))
            .collect();
        f.write_str(&counts.join(", "))
    }
}

/// Poll until the class kind, deployments, sets and machines are all gone
///
/// A collection seen empty is not listed again. A failed listing ends the
/// wait with that error.
pub async fn wait_until_machine_resources_deleted(
    store: &dyn MachineStore,
    namespace: &str,
    class: &MachineResource,
    config: &ReconcileConfig,
) -> Result<(), Error> {
    let start = tokio::time::Instant::now();
    let mut tracker = ExtinctionTracker::new(MachineResource::teardown_set(class));

    loop {
        tracker.refresh(store, namespace).await?;
        if tracker.is_done() {
            info!(namespace = %namespace, "All machine resources deleted");
            return Ok(());
        }
        info!(
            namespace = %namespace,
            remaining = %tracker,
            "Waiting for machine resources to be deleted"
        );

        if start.elapsed() + config.poll_interval > config.timeout {
            return Err(Error::timeout(
                format!("machine resources to be deleted ({} remaining)", tracker),
                config.timeout,
            ));
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
