//! Object naming and the provisioning plan for one allocation.
//!
//! Names and addresses are pure functions of the account and template, so
//! teardown can recompute exactly what creation declared.

use std::collections::BTreeMap;

use gamebox_cluster::{
    ClusterObject, ContainerResources, IngressSpec, ObjectKind, ServiceSpec, WorkloadSpec,
    owner_labels,
};
use gamebox_state::{Account, ResourceProfile, Template};

const NAME_PREFIX: &str = "gamebox";
const INGRESS_PATH: &str = "/";

/// Creation order. A failure stops the sequence without rolling back.
pub const CREATE_ORDER: [ObjectKind; 3] =
    [ObjectKind::Workload, ObjectKind::Service, ObjectKind::Ingress];

/// Teardown order: reverse of creation.
pub const TEARDOWN_ORDER: [ObjectKind; 3] =
    [ObjectKind::Ingress, ObjectKind::Service, ObjectKind::Workload];

/// Name shared by the workload, service, and ingress of an allocation.
pub fn object_name(namespace: &str, account_domain: &str) -> String {
    format!("{NAME_PREFIX}-{namespace}-{account_domain}")
}

/// Externally reachable host for an allocation.
pub fn address(account_domain: &str, template_domain: &str) -> String {
    format!("{account_domain}.{template_domain}")
}

/// The three objects to declare for `account` on `template`, in
/// [`CREATE_ORDER`].
pub fn provision_plan(account: &Account, template: &Template) -> [ClusterObject; 3] {
    let name = object_name(&template.namespace, &account.domain);
    let labels = owner_labels(&account.domain, &template.uid);

    let workload = ClusterObject::Workload(WorkloadSpec {
        name: name.clone(),
        namespace: template.namespace.clone(),
        image: template.name.clone(),
        port: template.port,
        labels: labels.clone(),
        resources: template
            .resources
            .as_ref()
            .map(container_resources)
            .filter(|r| !r.is_empty()),
    });

    let service = ClusterObject::Service(ServiceSpec {
        name: name.clone(),
        namespace: template.namespace.clone(),
        port: template.port,
        target_port: template.port,
        selector: labels.clone(),
        labels: labels.clone(),
    });

    let ingress = ClusterObject::Ingress(IngressSpec {
        name: name.clone(),
        namespace: template.namespace.clone(),
        host: address(&account.domain, &template.domain),
        path: INGRESS_PATH.to_string(),
        service_name: name,
        service_port: template.port,
        labels,
    });

    [workload, service, ingress]
}

fn container_resources(profile: &ResourceProfile) -> ContainerResources {
    fn quantities(cpu: &Option<String>, memory: &Option<String>) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(cpu) = cpu.as_ref().filter(|q| !q.is_empty()) {
            map.insert("cpu".to_string(), cpu.clone());
        }
        if let Some(memory) = memory.as_ref().filter(|q| !q.is_empty()) {
            map.insert("memory".to_string(), memory.clone());
        }
        map
    }

    ContainerResources {
        limits: quantities(&profile.limits_cpu, &profile.limits_memory),
        requests: quantities(&profile.requests_cpu, &profile.requests_memory),
    }
}
