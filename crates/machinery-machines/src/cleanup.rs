//! Garbage collection of machine deployments and machine classes
//!
//! Both passes diff the cluster against the desired deployments by identity
//! only: a deployment survives if its name is desired, a class survives if
//! some desired deployment references it. Spec fields are never compared.
//! Deletions already issued are not rolled back when a later one fails; the
//! next reconciliation cycle picks up where this one stopped.

use std::collections::BTreeSet;

use kube::api::DynamicObject;
use tracing::{debug, info};

use machinery_common::Error;

use crate::resource::{class_contained_in, name_contained_in, MachineDeployment, MachineResource};
use crate::store::MachineStore;

/// Delete every machine deployment whose name is not in `desired`
///
/// Returns the names of the deleted deployments.
pub async fn cleanup_machine_deployments(
    store: &dyn MachineStore,
    namespace: &str,
    desired: &[MachineDeployment],
) -> Result<Vec<String>, Error> {
    let resource = MachineResource::Deployment;
    let mut deleted = Vec::new();

    for deployment in store.list(&resource, namespace).await? {
        let name = object_name(&deployment, &resource)?;
        if name_contained_in(name, desired) {
            continue;
        }

        store.delete(&resource, namespace, name).await?;
        info!(namespace = %namespace, deployment = %name, "Deleted orphaned machine deployment");
        deleted.push(name.to_string());
    }

    Ok(deleted)
}

/// Delete every machine class no desired deployment references
///
/// Returns the names of all secrets referenced by the listed classes. A class
/// deleted in this pass still counts its secret as used: the machines built
/// from it may still be bootstrapping, so its secret only becomes orphaned
/// once the class is gone from a later listing.
pub async fn cleanup_machine_classes(
    store: &dyn MachineStore,
    namespace: &str,
    class: &MachineResource,
    desired: &[MachineDeployment],
) -> Result<BTreeSet<String>, Error> {
    let mut used_secrets = BTreeSet::new();

    for machine_class in store.list(class, namespace).await? {
        let name = object_name(&machine_class, class)?;
        let secret = secret_ref_name(&machine_class).ok_or_else(|| {
            Error::malformed(
                class.kind(),
                name,
                "could not find secret reference (spec.secretRef.name)",
            )
        })?;

        used_secrets.insert(secret.to_string());
        if class_contained_in(name, desired) {
            debug!(class = %name, secret = %secret, "Machine class still referenced");
            continue;
        }

        store.delete(class, namespace, name).await?;
        info!(
            namespace = %namespace,
            kind = %class.kind(),
            class = %name,
            "Deleted orphaned machine class"
        );
    }

    Ok(used_secrets)
}

/// `spec.secretRef.name` of a machine class
pub fn secret_ref_name(machine_class: &DynamicObject) -> Option<&str> {
    machine_class
        .data
        .get("spec")
        .and_then(|s| s.get("secretRef"))
        .and_then(|r| r.get("name"))
        .and_then(|n| n.as_str())
}

fn object_name<'a>(obj: &'a DynamicObject, resource: &MachineResource) -> Result<&'a str, Error> {
    obj.metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::malformed(resource.kind(), "<unnamed>", "missing metadata.name"))
}
