//! Machine class secret lifecycle
//!
//! Class secrets are found by the `purpose=machine-class` label. A secret is
//! deleted once no listed machine class references it; rotation swaps in
//! fresh credentials but keeps the bootstrap `userData` of the running
//! machines.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use tracing::{debug, info};

use machinery_common::{Error, MACHINE_CLASS_SECRET_SELECTOR, USER_DATA_KEY};

use crate::generator::MachineConfigGenerator;
use crate::store::MachineStore;

/// Secrets in `namespace` labelled as machine class secrets
pub async fn list_machine_class_secrets(
    store: &dyn MachineStore,
    namespace: &str,
) -> Result<Vec<Secret>, Error> {
    store
        .list_secrets(namespace, MACHINE_CLASS_SECRET_SELECTOR)
        .await
}

/// Delete every machine class secret not in `used`
///
/// Returns the names of the deleted secrets. Stops at the first failed
/// delete.
pub async fn cleanup_machine_class_secrets(
    store: &dyn MachineStore,
    namespace: &str,
    used: &BTreeSet<String>,
) -> Result<Vec<String>, Error> {
    let mut deleted = Vec::new();

    for secret in list_machine_class_secrets(store, namespace).await? {
        let name = secret_name(&secret)?;
        if used.contains(name) {
            debug!(secret = %name, "Machine class secret still in use");
            continue;
        }

        store.delete_secret(namespace, name).await?;
        info!(namespace = %namespace, secret = %name, "Deleted unused machine class secret");
        deleted.push(name.to_string());
    }

    Ok(deleted)
}

/// Rotate the credentials of every machine class secret
///
/// Secrets are updated one by one; a failed update leaves the remaining
/// secrets on their old credentials.
pub async fn refresh_machine_class_secrets(
    store: &dyn MachineStore,
    namespace: &str,
    generator: &dyn MachineConfigGenerator,
) -> Result<usize, Error> {
    let secrets = list_machine_class_secrets(store, namespace).await?;
    let fresh = generator.generate_machine_class_secret_data();

    for secret in &secrets {
        let rotated = rotate_secret_data(secret, fresh.clone());
        store.update_secret(&rotated).await?;
        info!(
            namespace = %namespace,
            secret = %secret_name(secret)?,
            "Refreshed machine class secret"
        );
    }

    Ok(secrets.len())
}

/// `existing` with its data replaced by `fresh`
///
/// The `userData` entry of `existing` is carried over verbatim. A `userData`
/// in `fresh` is dropped so generated data never overwrites it, and a secret
/// without one stays without one.
pub fn rotate_secret_data(existing: &Secret, mut fresh: BTreeMap<String, ByteString>) -> Secret {
    fresh.remove(USER_DATA_KEY);
    if let Some(user_data) = existing.data.as_ref().and_then(|d| d.get(USER_DATA_KEY)) {
        fresh.insert(USER_DATA_KEY.to_string(), user_data.clone());
    }

    Secret {
        data: Some(fresh),
        ..existing.clone()
    }
}

fn secret_name(secret: &Secret) -> Result<&str, Error> {
    secret
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::malformed("Secret", "<unnamed>", "missing metadata.name"))
}
