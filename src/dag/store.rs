//! Flat keyed object sets the builder reads from.

use std::collections::BTreeMap;

use crate::objects::{HostRoute, Ingress, KubeObject, ObjectKey, Secret, Service, TlsCertificateDelegation};

/// Every object that can influence the DAG, keyed by `namespace/name`.
#[derive(Debug, Clone, Default)]
pub struct ObjectSet {
    pub ingresses: BTreeMap<ObjectKey, Ingress>,
    pub host_routes: BTreeMap<ObjectKey, HostRoute>,
    pub services: BTreeMap<ObjectKey, Service>,
    pub secrets: BTreeMap<ObjectKey, Secret>,
    pub delegations: BTreeMap<ObjectKey, TlsCertificateDelegation>,
}

impl ObjectSet {
    pub fn from_objects(objects: impl IntoIterator<Item = KubeObject>) -> Self {
        let mut set = Self::default();
        for object in objects {
            set.insert(object);
        }
        set
    }

    /// Insert or replace an object. Returns false for objects the DAG does
    /// not track (endpoints, secrets without certificate material).
    pub fn insert(&mut self, object: KubeObject) -> bool {
        let key = object.key();
        match object {
            KubeObject::Ingress(ingress) => {
                self.ingresses.insert(key, ingress);
            }
            KubeObject::HostRoute(route) => {
                self.host_routes.insert(key, route);
            }
            KubeObject::Service(service) => {
                self.services.insert(key, service);
            }
            KubeObject::Secret(secret) if secret.is_tracked() => {
                self.secrets.insert(key, secret);
            }
            KubeObject::TlsCertificateDelegation(delegation) => {
                self.delegations.insert(key, delegation);
            }
            KubeObject::Secret(_) | KubeObject::Endpoints(_) => return false,
        }
        true
    }

    /// Remove an object. Returns false for kinds the DAG does not track; an
    /// absent object of a tracked kind still returns true.
    pub fn remove(&mut self, object: &KubeObject) -> bool {
        let key = object.key();
        match object {
            KubeObject::Ingress(_) => {
                self.ingresses.remove(&key);
            }
            KubeObject::HostRoute(_) => {
                self.host_routes.remove(&key);
            }
            KubeObject::Service(_) => {
                self.services.remove(&key);
            }
            KubeObject::Secret(secret) if secret.is_tracked() => {
                self.secrets.remove(&key);
            }
            KubeObject::TlsCertificateDelegation(_) => {
                self.delegations.remove(&key);
            }
            KubeObject::Secret(_) | KubeObject::Endpoints(_) => return false,
        }
        true
    }

    pub fn service(&self, key: &ObjectKey) -> Option<&Service> {
        self.services.get(key)
    }

    pub fn secret(&self, key: &ObjectKey) -> Option<&Secret> {
        self.secrets.get(key)
    }

    /// Whether some delegation in the secret's namespace lets `namespace`
    /// use it.
    pub fn is_delegated(&self, secret: &ObjectKey, namespace: &str) -> bool {
        self.delegations
            .values()
            .filter(|delegation| delegation.metadata.namespace == secret.namespace)
            .any(|delegation| delegation.permits(&secret.name, namespace))
    }

    pub fn len(&self) -> usize {
        self.ingresses.len()
            + self.host_routes.len()
            + self.services.len()
            + self.secrets.len()
            + self.delegations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
