//! Cluster object descriptions and their Kubernetes manifests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Label marking every object this system creates.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Label holding the owning account's domain label.
pub const LABEL_ACCOUNT: &str = "gamebox.io/account";
/// Label holding the template's public uid.
pub const LABEL_TEMPLATE: &str = "gamebox.io/template";

pub const MANAGED_BY: &str = "gamebox";

/// The three kinds of object backing an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Workload,
    Service,
    Ingress,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Workload => "workload",
            ObjectKind::Service => "service",
            ObjectKind::Ingress => "ingress",
        }
    }

    /// REST collection path for this kind in `namespace`.
    pub fn collection_path(&self, namespace: &str) -> String {
        match self {
            ObjectKind::Workload => format!("/api/v1/namespaces/{namespace}/pods"),
            ObjectKind::Service => format!("/api/v1/namespaces/{namespace}/services"),
            ObjectKind::Ingress => {
                format!("/apis/networking.k8s.io/v1/namespaces/{namespace}/ingresses")
            }
        }
    }

    /// REST path of a single named object.
    pub fn object_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{name}", self.collection_path(namespace))
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels identifying the owner of an allocation's objects.
pub fn owner_labels(account_domain: &str, template_uid: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_ACCOUNT.to_string(), account_domain.to_string()),
        (LABEL_TEMPLATE.to_string(), template_uid.to_string()),
    ])
}

/// Container resource limits and requests (`cpu`, `memory` quantities).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResources {
    pub limits: BTreeMap<String, String>,
    pub requests: BTreeMap<String, String>,
}

impl ContainerResources {
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// A single-container workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    /// Container image reference.
    pub image: String,
    pub port: u16,
    pub labels: BTreeMap<String, String>,
    pub resources: Option<ContainerResources>,
}

/// A network endpoint exposing a workload inside the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    pub target_port: u16,
    /// Must match the workload's labels.
    pub selector: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// An ingress route binding an external host to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressSpec {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub path: String,
    pub service_name: String,
    pub service_port: u16,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterObject {
    Workload(WorkloadSpec),
    Service(ServiceSpec),
    Ingress(IngressSpec),
}

impl ClusterObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ClusterObject::Workload(_) => ObjectKind::Workload,
            ClusterObject::Service(_) => ObjectKind::Service,
            ClusterObject::Ingress(_) => ObjectKind::Ingress,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ClusterObject::Workload(spec) => &spec.name,
            ClusterObject::Service(spec) => &spec.name,
            ClusterObject::Ingress(spec) => &spec.name,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            ClusterObject::Workload(spec) => &spec.namespace,
            ClusterObject::Service(spec) => &spec.namespace,
            ClusterObject::Ingress(spec) => &spec.namespace,
        }
    }

    /// Render the Kubernetes manifest for this object.
    pub fn to_manifest(&self) -> Value {
        match self {
            ClusterObject::Workload(spec) => workload_manifest(spec),
            ClusterObject::Service(spec) => service_manifest(spec),
            ClusterObject::Ingress(spec) => ingress_manifest(spec),
        }
    }
}

fn workload_manifest(spec: &WorkloadSpec) -> Value {
    let mut container = json!({
        "name": spec.name,
        "image": spec.image,
        "ports": [{ "containerPort": spec.port }],
    });
    if let Some(resources) = spec.resources.as_ref().filter(|r| !r.is_empty()) {
        container["resources"] = json!({
            "limits": resources.limits,
            "requests": resources.requests,
        });
    }

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": spec.labels,
        },
        "spec": {
            "containers": [container],
        },
    })
}

fn service_manifest(spec: &ServiceSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": spec.labels,
        },
        "spec": {
            "selector": spec.selector,
            "ports": [{
                "protocol": "TCP",
                "port": spec.port,
                "targetPort": spec.target_port,
            }],
        },
    })
}

fn ingress_manifest(spec: &IngressSpec) -> Value {
    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": spec.labels,
        },
        "spec": {
            "rules": [{
                "host": spec.host,
                "http": {
                    "paths": [{
                        "path": spec.path,
                        "pathType": "Prefix",
                        "backend": {
                            "service": {
                                "name": spec.service_name,
                                "port": { "number": spec.service_port },
                            },
                        },
                    }],
                },
            }],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> WorkloadSpec {
        WorkloadSpec {
            name: "gamebox-ns1-abcd1234".to_string(),
            namespace: "ns1".to_string(),
            image: "nginx:1.27".to_string(),
            port: 8080,
            labels: owner_labels("abcd1234", "img-1"),
            resources: None,
        }
    }

    #[test]
    fn paths_per_kind() {
        assert_eq!(
            ObjectKind::Workload.object_path("ns1", "p"),
            "/api/v1/namespaces/ns1/pods/p"
        );
        assert_eq!(
            ObjectKind::Service.collection_path("ns1"),
            "/api/v1/namespaces/ns1/services"
        );
        assert_eq!(
            ObjectKind::Ingress.collection_path("ns1"),
            "/apis/networking.k8s.io/v1/namespaces/ns1/ingresses"
        );
    }

    #[test]
    fn workload_manifest_shape() {
        let manifest = ClusterObject::Workload(workload()).to_manifest();
        assert_eq!(manifest["kind"], "Pod");
        assert_eq!(manifest["metadata"]["namespace"], "ns1");
        assert_eq!(manifest["metadata"]["labels"][LABEL_ACCOUNT], "abcd1234");
        let container = &manifest["spec"]["containers"][0];
        assert_eq!(container["image"], "nginx:1.27");
        assert_eq!(container["ports"][0]["containerPort"], 8080);
        assert!(container.get("resources").is_none());
    }

    #[test]
    fn workload_manifest_with_resources() {
        let mut spec = workload();
        spec.resources = Some(ContainerResources {
            limits: BTreeMap::from([("memory".to_string(), "256Mi".to_string())]),
            requests: BTreeMap::new(),
        });
        let manifest = ClusterObject::Workload(spec).to_manifest();
        assert_eq!(
            manifest["spec"]["containers"][0]["resources"]["limits"]["memory"],
            "256Mi"
        );
    }

    #[test]
    fn ingress_manifest_routes_host_to_service() {
        let spec = IngressSpec {
            name: "gamebox-ns1-abcd1234".to_string(),
            namespace: "ns1".to_string(),
            host: "abcd1234.example.com".to_string(),
            path: "/".to_string(),
            service_name: "gamebox-ns1-abcd1234".to_string(),
            service_port: 8080,
            labels: BTreeMap::new(),
        };
        let manifest = ClusterObject::Ingress(spec).to_manifest();
        let rule = &manifest["spec"]["rules"][0];
        assert_eq!(rule["host"], "abcd1234.example.com");
        let backend = &rule["http"]["paths"][0]["backend"]["service"];
        assert_eq!(backend["name"], "gamebox-ns1-abcd1234");
        assert_eq!(backend["port"]["number"], 8080);
    }

    #[test]
    fn object_accessors() {
        let object = ClusterObject::Workload(workload());
        assert_eq!(object.kind(), ObjectKind::Workload);
        assert_eq!(object.name(), "gamebox-ns1-abcd1234");
        assert_eq!(object.namespace(), "ns1");
    }
}
