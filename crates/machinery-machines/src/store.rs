//! Cluster object store for machine resources
//!
//! Provides a trait-based abstraction over the few object-store calls the
//! reconciler needs, allowing tests to simulate a cluster while production
//! code talks to the API server through kube-rs.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use machinery_common::kube_utils::create_client;
use machinery_common::Error;

use crate::resource::MachineResource;

/// Trait abstracting object-store operations on machine resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// List every object of `resource` in `namespace`
    async fn list(
        &self,
        resource: &MachineResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error>;

    /// Set a single label on an object, leaving its other labels intact
    async fn label(
        &self,
        resource: &MachineResource,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(
        &self,
        resource: &MachineResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error>;

    /// List secrets in `namespace` matching a label selector
    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>, Error>;

    /// Replace a secret with the given object
    async fn update_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Delete a secret. Deleting an absent secret succeeds.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Count the objects of `resource` currently present in `namespace`
pub async fn count_items(
    store: &dyn MachineStore,
    resource: &MachineResource,
    namespace: &str,
) -> Result<usize, Error> {
    Ok(store.list(resource, namespace).await?.len())
}

/// Real store implementation using DynamicObject for untyped machine resources
pub struct KubeMachineStore {
    client: Client,
}

impl KubeMachineStore {
    /// Create a new KubeMachineStore
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a store from an optional kubeconfig path (in-cluster config otherwise)
    pub async fn from_kubeconfig(kubeconfig: Option<&Path>) -> Result<Self, Error> {
        Ok(Self::new(create_client(kubeconfig).await?))
    }

    fn api(&self, resource: &MachineResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &resource.api_resource())
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl MachineStore for KubeMachineStore {
    async fn list(
        &self,
        resource: &MachineResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        let list = self
            .api(resource, namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn label(
        &self,
        resource: &MachineResource,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "metadata": { "labels": { key: value } } });
        self.api(resource, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        resource: &MachineResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(kind = %resource.kind(), name = %name, "Already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>, Error> {
        let list = self
            .secrets(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn update_secret(&self, secret: &Secret) -> Result<(), Error> {
        let name = secret
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::malformed("Secret", "<unnamed>", "missing metadata.name"))?;
        let namespace = secret
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::malformed("Secret", name, "missing metadata.namespace"))?;

        self.secrets(namespace)
            .replace(name, &PostParams::default(), secret)
            .await?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self
            .secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(secret = %name, "Secret already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
