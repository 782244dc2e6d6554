//! Machine resource model
//!
//! [`MachineDeployment`] is the desired-state record produced by the config
//! generator each cycle. [`MachineResource`] describes the cluster-resident
//! collections the reconciler reads and deletes from.

use std::fmt;

use kube::discovery::ApiResource;
use serde::{Deserialize, Serialize};

use machinery_common::kube_utils::build_api_resource_with_plural;
use machinery_common::MACHINE_API_VERSION;

/// A desired group of machines sharing one machine class
///
/// Recomputed every reconciliation cycle; never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeployment {
    /// Deployment name, unique within the namespace
    pub name: String,
    /// Number of machines wanted
    pub replicas: u32,
    /// Name of the machine class the machines are built from
    pub class_name: String,
}

impl MachineDeployment {
    /// Create a new desired deployment
    pub fn new(name: impl Into<String>, replicas: u32, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replicas,
            class_name: class_name.into(),
        }
    }
}

/// Whether a deployment with `name` is part of the desired set
pub fn name_contained_in(name: &str, deployments: &[MachineDeployment]) -> bool {
    deployments.iter().any(|d| d.name == name)
}

/// Whether any desired deployment references the machine class `class_name`
pub fn class_contained_in(class_name: &str, deployments: &[MachineDeployment]) -> bool {
    deployments.iter().any(|d| d.class_name == class_name)
}

/// Provider-specific machine class resource description
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineClassInfo {
    /// Kind of the class resource (e.g., "AWSMachineClass")
    pub kind: String,
    /// Plural used in API paths (e.g., "awsmachineclasses")
    pub plural: String,
    /// Chart rendering the class manifests
    pub chart_name: String,
}

/// A machine resource collection in the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MachineResource {
    /// The provider's machine class kind
    Class {
        /// Kind of the class resource
        kind: String,
        /// Plural of the class resource
        plural: String,
    },
    /// MachineDeployments
    Deployment,
    /// MachineSets
    Set,
    /// Machines
    Machine,
}

impl MachineResource {
    /// Descriptor for the class kind described by `info`
    pub fn class(info: &MachineClassInfo) -> Self {
        Self::Class {
            kind: info.kind.clone(),
            plural: info.plural.clone(),
        }
    }

    /// Every collection that must be empty once teardown completes
    pub fn teardown_set(class: &MachineResource) -> Vec<MachineResource> {
        vec![
            class.clone(),
            MachineResource::Deployment,
            MachineResource::Set,
            MachineResource::Machine,
        ]
    }

    /// Resource kind
    pub fn kind(&self) -> &str {
        match self {
            Self::Class { kind, .. } => kind,
            Self::Deployment => "MachineDeployment",
            Self::Set => "MachineSet",
            Self::Machine => "Machine",
        }
    }

    /// Plural name used in API paths
    pub fn plural(&self) -> &str {
        match self {
            Self::Class { plural, .. } => plural,
            Self::Deployment => "machinedeployments",
            Self::Set => "machinesets",
            Self::Machine => "machines",
        }
    }

    /// ApiResource for dynamic API access
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource_with_plural(MACHINE_API_VERSION, self.kind(), self.plural())
    }
}

impl fmt::Display for MachineResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}
