//! Object events in, cache snapshots out.
//!
//! [`EventHandler`] owns the flat object sets. Every relevant event mutates
//! them, rebuilds the DAG from scratch and republishes clusters, routes and
//! listeners, in that order, all under one lock so cache versions follow event
//! order. Endpoints bypass the DAG and only republish the endpoint type.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::cache::ResourceCache;
use super::resources::ResourceType;
use super::translate;
use crate::config::{AppConfig, ListenerConfig, TranslatorConfig};
use crate::dag::{self, annotations, Dag, ObjectSet};
use crate::objects::{Endpoints, KubeObject, ObjectKey};
use crate::observability::metrics;

#[derive(Debug, Default)]
struct ObjectState {
    objects: ObjectSet,
    endpoints: BTreeMap<ObjectKey, Endpoints>,
}

impl ObjectState {
    /// Apply a removal and/or an insertion. Returns which outputs went stale:
    /// `(dag, endpoints)`.
    fn apply(&mut self, remove: Option<&KubeObject>, insert: Option<KubeObject>) -> (bool, bool) {
        let mut dag = false;
        let mut endpoints = false;

        if let Some(object) = remove {
            match object {
                KubeObject::Endpoints(_) => {
                    self.endpoints.remove(&object.key());
                    endpoints = true;
                }
                other => dag |= self.objects.remove(other),
            }
        }

        if let Some(object) = insert {
            match object {
                KubeObject::Endpoints(e) => {
                    self.endpoints.insert(e.metadata.key(), e);
                    endpoints = true;
                }
                other => dag |= self.objects.insert(other),
            }
        }

        (dag, endpoints)
    }
}

/// Entry point for the watch layer.
///
/// Adding an existing object replaces it and deleting an absent one rebuilds
/// an unchanged set, so replays are harmless.
#[derive(Debug)]
pub struct EventHandler {
    cache: Arc<ResourceCache>,
    translator: TranslatorConfig,
    listeners: ListenerConfig,
    state: Mutex<ObjectState>,
}

impl EventHandler {
    /// Create a handler and publish the empty configuration, so every resource
    /// type is at version 1 before the first client connects.
    pub fn new(cache: Arc<ResourceCache>, translator: TranslatorConfig, listeners: ListenerConfig) -> Self {
        let handler = Self { cache, translator, listeners, state: Mutex::new(ObjectState::default()) };

        let empty = ObjectState::default();
        handler.rebuild(&empty, "startup");
        handler.publish_endpoints(&empty);
        handler
    }

    pub fn from_config(cache: Arc<ResourceCache>, config: &AppConfig) -> Self {
        Self::new(cache, config.translator.clone(), config.listeners.clone())
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub async fn on_add(&self, object: KubeObject) {
        if !self.is_relevant(&object) {
            debug!(kind = object.kind(), object = %object.key(), "Ignoring added object");
            return;
        }

        let trigger = object.kind();
        let mut state = self.state.lock().await;
        let stale = state.apply(None, Some(object));
        self.refresh(&state, stale, trigger);
    }

    pub async fn on_update(&self, old: KubeObject, new: KubeObject) {
        let was_relevant = self.is_relevant(&old);
        let is_relevant = self.is_relevant(&new);
        if !was_relevant && !is_relevant {
            debug!(kind = new.kind(), object = %new.key(), "Ignoring updated object");
            return;
        }

        let trigger = new.kind();
        let mut state = self.state.lock().await;
        let stale = state.apply(Some(&old), is_relevant.then_some(new));
        self.refresh(&state, stale, trigger);
    }

    pub async fn on_delete(&self, object: KubeObject) {
        if !self.is_relevant(&object) {
            debug!(kind = object.kind(), object = %object.key(), "Ignoring deleted object");
            return;
        }

        let mut state = self.state.lock().await;
        let stale = state.apply(Some(&object), None);
        self.refresh(&state, stale, object.kind());
    }

    /// Build the DAG for the current object set without publishing it.
    pub async fn dag(&self) -> Dag {
        let state = self.state.lock().await;
        dag::build(&state.objects, &self.translator)
    }

    fn is_relevant(&self, object: &KubeObject) -> bool {
        match object {
            KubeObject::Ingress(_) | KubeObject::HostRoute(_) => {
                annotations::matches_ingress_class(object.metadata(), &self.translator)
            }
            KubeObject::Secret(secret) => secret.is_tracked(),
            KubeObject::Service(_) | KubeObject::Endpoints(_) | KubeObject::TlsCertificateDelegation(_) => true,
        }
    }

    fn refresh(&self, state: &ObjectState, (dag, endpoints): (bool, bool), trigger: &str) {
        if dag {
            self.rebuild(state, trigger);
        }
        if endpoints {
            self.publish_endpoints(state);
        }
    }

    fn rebuild(&self, state: &ObjectState, trigger: &str) {
        let span = crate::rebuild_span!(trigger);
        let _entered = span.enter();
        let started = Instant::now();

        let dag = dag::build(&state.objects, &self.translator);
        let clusters = translate::clusters(&dag);
        let routes = translate::route_configurations(&dag);
        let listeners = translate::listeners(&dag, &self.listeners);

        // Clusters before routes so a route never names a cluster the proxy
        // has not been offered yet.
        let cluster_version = self.cache.update(ResourceType::Cluster, clusters);
        let route_version = self.cache.update(ResourceType::Route, routes);
        let listener_version = self.cache.update(ResourceType::Listener, listeners);

        let elapsed = started.elapsed();
        metrics().record_rebuild(trigger, elapsed.as_secs_f64(), dag.virtual_hosts.len());

        info!(
            phase = "rebuild",
            trigger,
            virtual_hosts = dag.virtual_hosts.len(),
            clusters = dag.clusters.len(),
            cluster_version,
            route_version,
            listener_version,
            elapsed_ms = elapsed.as_millis() as u64,
            "Published routing configuration"
        );
    }

    fn publish_endpoints(&self, state: &ObjectState) {
        let assignments = translate::cluster_load_assignments(state.endpoints.values());
        let total_resources = assignments.len();
        let version = self.cache.update(ResourceType::Endpoint, assignments);
        debug!(phase = "endpoints", version, total_resources, "Published endpoints");
    }
}
