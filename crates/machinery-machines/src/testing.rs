//! In-memory cluster used by the unit tests
//!
//! `FakeStore` keeps objects per resource plural, records every write in an
//! event log, can inject failures per collection or object, and can play the
//! machine controller: deployments turn ready after a number of polls, and
//! machine sets and machines whose deployment is gone disappear after a
//! number of machine listings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;

use machinery_common::{
    Error, FORCE_DELETION_LABEL, FORCE_DELETION_VALUE, MACHINE_CLASS_SECRET_SELECTOR,
    PURPOSE_LABEL, PURPOSE_MACHINE_CLASS, USER_DATA_KEY,
};

use crate::resource::{MachineClassInfo, MachineResource};
use crate::store::MachineStore;

/// Label tying machine sets and machines to their deployment
const DEPLOYMENT_LABEL: &str = "name";

pub fn aws_class_info() -> MachineClassInfo {
    MachineClassInfo {
        kind: "AWSMachineClass".to_string(),
        plural: "awsmachineclasses".to_string(),
        chart_name: "aws-machineclass".to_string(),
    }
}

pub fn aws_class() -> MachineResource {
    MachineResource::class(&aws_class_info())
}

pub fn machine_deployment(name: &str, replicas: i64, ready: i64) -> DynamicObject {
    DynamicObject::new(name, &MachineResource::Deployment.api_resource()).data(
        serde_json::json!({
            "spec": { "replicas": replicas },
            "status": { "readyReplicas": ready },
        }),
    )
}

pub fn machine_class(name: &str, secret: Option<&str>) -> DynamicObject {
    let spec = match secret {
        Some(secret) => serde_json::json!({ "secretRef": { "name": secret } }),
        None => serde_json::json!({ "region": "eu-west-1" }),
    };
    DynamicObject::new(name, &aws_class().api_resource()).data(serde_json::json!({ "spec": spec }))
}

pub fn machine_set(name: &str, deployment: &str) -> DynamicObject {
    with_labels(
        DynamicObject::new(name, &MachineResource::Set.api_resource()),
        &[(DEPLOYMENT_LABEL, deployment)],
    )
}

pub fn machine(name: &str, deployment: &str, force_deletion: bool) -> DynamicObject {
    let mut labels = vec![(DEPLOYMENT_LABEL, deployment)];
    if force_deletion {
        labels.push((FORCE_DELETION_LABEL, FORCE_DELETION_VALUE));
    }
    with_labels(
        DynamicObject::new(name, &MachineResource::Machine.api_resource()),
        &labels,
    )
}

pub fn class_secret(name: &str, namespace: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                PURPOSE_LABEL.to_string(),
                PURPOSE_MACHINE_CLASS.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(bytes(data)),
        ..Default::default()
    }
}

pub fn bytes(data: &[(&str, &str)]) -> BTreeMap<String, ByteString> {
    data.iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
        .collect()
}

pub fn user_data(secret: &Secret) -> Option<&[u8]> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(USER_DATA_KEY))
        .map(|b| b.0.as_slice())
}

fn with_labels(mut obj: DynamicObject, labels: &[(&str, &str)]) -> DynamicObject {
    obj.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    obj
}

fn injected(resource: &str) -> Error {
    Error::transport(resource, "injected failure")
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, BTreeMap<String, DynamicObject>>,
    secrets: BTreeMap<String, Secret>,
    events: Vec<String>,
    list_calls: BTreeMap<String, usize>,
    failing_lists: BTreeSet<String>,
    failing_labels: BTreeSet<String>,
    failing_secret_updates: BTreeSet<String>,
    failing_secret_deletes: BTreeSet<String>,
    ready_on_list: Option<usize>,
    reap_after_machine_lists: Option<usize>,
}

impl State {
    fn collection(&mut self, resource: &MachineResource) -> &mut BTreeMap<String, DynamicObject> {
        self.objects.entry(resource.plural().to_string()).or_default()
    }

    /// Deployments list call: turn everything ready once the threshold is hit
    fn progress_readiness(&mut self, calls: usize) {
        if !self.ready_on_list.is_some_and(|n| calls >= n) {
            return;
        }
        for deployment in self.collection(&MachineResource::Deployment).values_mut() {
            let replicas = deployment.data["spec"]["replicas"].clone();
            deployment.data["status"]["readyReplicas"] = replicas;
        }
    }

    /// Machines list call: remove sets and machines of deleted deployments
    fn reap_orphans(&mut self, calls: usize) {
        if !self.reap_after_machine_lists.is_some_and(|n| calls >= n) {
            return;
        }
        let live: BTreeSet<String> = self
            .collection(&MachineResource::Deployment)
            .keys()
            .cloned()
            .collect();
        for resource in [MachineResource::Set, MachineResource::Machine] {
            self.collection(&resource).retain(|_, obj| {
                obj.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(DEPLOYMENT_LABEL))
                    .is_some_and(|d| live.contains(d))
            });
        }
    }
}

/// In-memory [`MachineStore`]
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake store lock poisoned")
    }

    pub fn insert(&self, resource: &MachineResource, obj: DynamicObject) {
        let name = obj.metadata.name.clone().expect("fake objects are named");
        self.state().collection(resource).insert(name, obj);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let name = secret.metadata.name.clone().expect("fake secrets are named");
        self.state().secrets.insert(name, secret);
    }

    pub fn names(&self, resource: &MachineResource) -> Vec<String> {
        self.state().collection(resource).keys().cloned().collect()
    }

    pub fn get(&self, resource: &MachineResource, name: &str) -> Option<DynamicObject> {
        self.state().collection(resource).get(name).cloned()
    }

    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.state().secrets.get(name).cloned()
    }

    pub fn secret_names(&self) -> Vec<String> {
        self.state().secrets.keys().cloned().collect()
    }

    /// Writes in the order they happened, e.g. `"delete machinedeployments/pool-old"`
    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    pub fn list_calls(&self, resource: &MachineResource) -> usize {
        self.state()
            .list_calls
            .get(resource.plural())
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_list(&self, resource: &MachineResource) {
        self.state()
            .failing_lists
            .insert(resource.plural().to_string());
    }

    pub fn fail_label(&self, name: &str) {
        self.state().failing_labels.insert(name.to_string());
    }

    pub fn fail_secret_update(&self, name: &str) {
        self.state()
            .failing_secret_updates
            .insert(name.to_string());
    }

    pub fn fail_secret_delete(&self, name: &str) {
        self.state()
            .failing_secret_deletes
            .insert(name.to_string());
    }

    /// Deployments report every replica ready from the `n`th listing on
    pub fn ready_on_list(&self, n: usize) {
        self.state().ready_on_list = Some(n);
    }

    /// Orphaned sets and machines vanish from the `n`th machine listing on
    pub fn reap_after_machine_lists(&self, n: usize) {
        self.state().reap_after_machine_lists = Some(n);
    }
}

#[async_trait]
impl MachineStore for FakeStore {
    async fn list(
        &self,
        resource: &MachineResource,
        _namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        let mut state = self.state();
        let calls = {
            let calls = state
                .list_calls
                .entry(resource.plural().to_string())
                .or_default();
            *calls += 1;
            *calls
        };
        if state.failing_lists.contains(resource.plural()) {
            return Err(injected(resource.plural()));
        }

        match resource {
            MachineResource::Deployment => state.progress_readiness(calls),
            MachineResource::Machine => state.reap_orphans(calls),
            _ => {}
        }
        Ok(state.collection(resource).values().cloned().collect())
    }

    async fn label(
        &self,
        resource: &MachineResource,
        _namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let mut state = self.state();
        if state.failing_labels.contains(name) {
            return Err(injected(resource.plural()));
        }
        let obj = state
            .collection(resource)
            .get_mut(name)
            .ok_or_else(|| Error::transport(resource.plural(), format!("{} not found", name)))?;
        obj.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        state
            .events
            .push(format!("label {}/{} {}={}", resource.plural(), name, key, value));
        Ok(())
    }

    async fn delete(
        &self,
        resource: &MachineResource,
        _namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        let mut state = self.state();
        state.collection(resource).remove(name);
        state
            .events
            .push(format!("delete {}/{}", resource.plural(), name));
        Ok(())
    }

    async fn list_secrets(&self, _namespace: &str, selector: &str) -> Result<Vec<Secret>, Error> {
        assert_eq!(selector, MACHINE_CLASS_SECRET_SELECTOR);
        Ok(self.state().secrets.values().cloned().collect())
    }

    async fn update_secret(&self, secret: &Secret) -> Result<(), Error> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let mut state = self.state();
        if state.failing_secret_updates.contains(&name) {
            return Err(injected("secrets"));
        }
        state.events.push(format!("update secrets/{}", name));
        state.secrets.insert(name, secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, _namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.state();
        if state.failing_secret_deletes.contains(name) {
            return Err(injected("secrets"));
        }
        state.secrets.remove(name);
        state.events.push(format!("delete secrets/{}", name));
        Ok(())
    }
}
