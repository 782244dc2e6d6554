//! Machine lifecycle reconciliation
//!
//! This crate provides:
//! - Collaborator traits for the cluster object store, the provider config
//!   generator and the chart applier, plus a kube-rs backed store
//! - MachineReconciler driving deploy, teardown and secret refresh
//! - The building blocks those flows are made of: availability and deletion
//!   waits, garbage collection of deployments and classes, and the class
//!   secret lifecycle

pub mod applier;
pub mod availability;
pub mod cleanup;
pub mod config;
pub mod generator;
pub mod reconciler;
pub mod resource;
pub mod secrets;
pub mod store;
pub mod teardown;

#[cfg(test)]
mod testing;

// Re-export collaborator traits
pub use applier::{chart_path, ManifestApplier, CHART_ROOT, MACHINES_CHART};
pub use generator::{MachineConfig, MachineConfigGenerator};
pub use store::{count_items, KubeMachineStore, MachineStore};

#[cfg(test)]
pub use applier::MockManifestApplier;
#[cfg(test)]
pub use generator::MockMachineConfigGenerator;
#[cfg(test)]
pub use store::MockMachineStore;

// Re-export reconciliation entry points
pub use config::{EnvSource, OsEnv, ReconcileConfig};
pub use reconciler::{generate_machine_deployment_config, MachineReconciler};
pub use resource::{MachineClassInfo, MachineDeployment, MachineResource};
