//! Machine reconciler
//!
//! Drives the deploy, teardown and secret refresh flows for one namespace.
//! Each flow is a fixed sequence of steps; the first failing step aborts the
//! flow with its error wrapped in the step name. Nothing is rolled back, the
//! next invocation starts again from a fresh listing of the cluster.

use std::sync::Arc;

use tracing::{info, instrument};

use machinery_common::Error;

use crate::applier::{chart_path, ManifestApplier, MACHINES_CHART};
use crate::availability::wait_until_machine_deployments_available;
use crate::cleanup::{cleanup_machine_classes, cleanup_machine_deployments};
use crate::config::ReconcileConfig;
use crate::generator::MachineConfigGenerator;
use crate::resource::{MachineDeployment, MachineResource};
use crate::secrets::{cleanup_machine_class_secrets, refresh_machine_class_secrets};
use crate::store::MachineStore;
use crate::teardown::{label_machines_for_force_deletion, wait_until_machine_resources_deleted};

/// Step names attached to errors leaving a flow
pub mod step {
    /// Config generator call
    pub const GENERATE_CONFIG: &str = "generate machine config";
    /// Applying the machine class chart
    pub const DEPLOY_CLASSES: &str = "deploy machine classes";
    /// Applying the machines chart
    pub const DEPLOY_DEPLOYMENTS: &str = "deploy machine deployments";
    /// Availability wait
    pub const WAIT_AVAILABLE: &str = "wait for machine deployments";
    /// Deleting undesired deployments
    pub const CLEANUP_DEPLOYMENTS: &str = "cleanup machine deployments";
    /// Deleting unreferenced classes
    pub const CLEANUP_CLASSES: &str = "cleanup machine classes";
    /// Deleting unused class secrets
    pub const CLEANUP_SECRETS: &str = "cleanup machine class secrets";
    /// Rotating class secrets
    pub const REFRESH_SECRETS: &str = "refresh machine class secrets";
    /// Force deletion labelling
    pub const LABEL_MACHINES: &str = "label machines";
    /// Extinction wait
    pub const WAIT_DELETED: &str = "wait for machine resources deletion";
}

/// Chart values for the `machines` chart
///
/// One entry per desired deployment, carrying the rollout settings from
/// `config` and a reference to the deployment's class of kind `class_kind`.
pub fn generate_machine_deployment_config(
    deployments: &[MachineDeployment],
    class_kind: &str,
    config: &ReconcileConfig,
) -> serde_json::Value {
    let values: Vec<serde_json::Value> = deployments
        .iter()
        .map(|deployment| {
            serde_json::json!({
                "name": deployment.name,
                "replicas": deployment.replicas,
                "minReadySeconds": config.min_ready_seconds,
                "rollingUpdate": {
                    "maxSurge": config.max_surge,
                    "maxUnavailable": config.max_unavailable,
                },
                "labels": { "name": deployment.name },
                "class": {
                    "kind": class_kind,
                    "name": deployment.class_name,
                },
            })
        })
        .collect();

    serde_json::json!({ "machineDeployments": values })
}

/// Reconciles the machines of one namespace
pub struct MachineReconciler {
    store: Arc<dyn MachineStore>,
    generator: Arc<dyn MachineConfigGenerator>,
    applier: Arc<dyn ManifestApplier>,
    namespace: String,
    config: ReconcileConfig,
}

impl MachineReconciler {
    /// Create a reconciler for `namespace`
    ///
    /// Fails if `config` does not pass [`ReconcileConfig::validate`].
    pub fn new(
        store: Arc<dyn MachineStore>,
        generator: Arc<dyn MachineConfigGenerator>,
        applier: Arc<dyn ManifestApplier>,
        namespace: impl Into<String>,
        config: ReconcileConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            store,
            generator,
            applier,
            namespace: namespace.into(),
            config,
        })
    }

    /// Namespace this reconciler manages
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Bring the namespace to the generator's desired machine state
    ///
    /// Applies classes and deployments, waits for availability, then deletes
    /// deployments, classes and secrets that are no longer wanted.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn deploy_machines(&self) -> Result<(), Error> {
        let ns = self.namespace.as_str();
        let store = self.store.as_ref();
        let class_info = self.generator.machine_class_info();
        let class = MachineResource::class(&class_info);

        let machine_config = self
            .generator
            .generate_machine_config()
            .await
            .map_err(|e| e.in_step(step::GENERATE_CONFIG))?;
        let desired = machine_config.deployments;

        let class_values = serde_json::json!({ "machineClasses": machine_config.class_values });
        self.applier
            .apply(&chart_path(&class_info.chart_name), &class_info.chart_name, ns, class_values)
            .await
            .map_err(|e| e.in_step(step::DEPLOY_CLASSES))?;

        let deployment_values =
            generate_machine_deployment_config(&desired, &class_info.kind, &self.config);
        self.applier
            .apply(&chart_path(MACHINES_CHART), MACHINES_CHART, ns, deployment_values)
            .await
            .map_err(|e| e.in_step(step::DEPLOY_DEPLOYMENTS))?;
        info!(
            deployments = desired.len(),
            kind = %class_info.kind,
            "Applied machine classes and deployments"
        );

        wait_until_machine_deployments_available(store, ns, &desired, &self.config)
            .await
            .map_err(|e| e.in_step(step::WAIT_AVAILABLE))?;

        cleanup_machine_deployments(store, ns, &desired)
            .await
            .map_err(|e| e.in_step(step::CLEANUP_DEPLOYMENTS))?;

        let used_secrets = cleanup_machine_classes(store, ns, &class, &desired)
            .await
            .map_err(|e| e.in_step(step::CLEANUP_CLASSES))?;

        cleanup_machine_class_secrets(store, ns, &used_secrets)
            .await
            .map_err(|e| e.in_step(step::CLEANUP_SECRETS))?;

        info!("Machines deployed");
        Ok(())
    }

    /// Force-delete every machine resource in the namespace
    ///
    /// Machines are labelled first so their deletion skips draining. Class
    /// secrets are left in place.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn destroy_machines(&self) -> Result<(), Error> {
        let ns = self.namespace.as_str();
        let store = self.store.as_ref();
        let class = MachineResource::class(&self.generator.machine_class_info());

        label_machines_for_force_deletion(Arc::clone(&self.store), ns)
            .await
            .map_err(|e| e.in_step(step::LABEL_MACHINES))?;

        cleanup_machine_deployments(store, ns, &[])
            .await
            .map_err(|e| e.in_step(step::CLEANUP_DEPLOYMENTS))?;

        cleanup_machine_classes(store, ns, &class, &[])
            .await
            .map_err(|e| e.in_step(step::CLEANUP_CLASSES))?;

        wait_until_machine_resources_deleted(store, ns, &class, &self.config)
            .await
            .map_err(|e| e.in_step(step::WAIT_DELETED))?;

        info!("Machines destroyed");
        Ok(())
    }

    /// Rotate the credentials of all machine class secrets
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn refresh_machine_class_secrets(&self) -> Result<(), Error> {
        let refreshed = refresh_machine_class_secrets(
            self.store.as_ref(),
            &self.namespace,
            self.generator.as_ref(),
        )
        .await
        .map_err(|e| e.in_step(step::REFRESH_SECRETS))?;

        info!(secrets = refreshed, "Machine class secrets refreshed");
        Ok(())
    }
}
