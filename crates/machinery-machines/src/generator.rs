//! Provider-specific machine configuration
//!
//! Cloud providers implement [`MachineConfigGenerator`] to describe their
//! machine class resource and to compute class parameters, the desired
//! deployments and class secret credentials.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::ByteString;

#[cfg(test)]
use mockall::automock;

use machinery_common::Error;

use crate::resource::{MachineClassInfo, MachineDeployment};

/// Output of one machine configuration pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MachineConfig {
    /// Values for the machine class chart, one entry per class
    pub class_values: Vec<serde_json::Value>,
    /// Desired machine deployments
    pub deployments: Vec<MachineDeployment>,
}

/// Generates machine configuration for one cloud provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MachineConfigGenerator: Send + Sync {
    /// Kind, plural and chart of the provider's machine class
    fn machine_class_info(&self) -> MachineClassInfo;

    /// Compute machine class chart values and the desired deployments
    async fn generate_machine_config(&self) -> Result<MachineConfig, Error>;

    /// Current credential fields for machine class secrets
    fn generate_machine_class_secret_data(&self) -> BTreeMap<String, ByteString>;
}
