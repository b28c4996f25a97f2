//! # Resource Cache
//!
//! One versioned snapshot per resource type. Writers replace a whole snapshot
//! and readers always see a complete one. Each write bumps that type's version
//! by one and wakes every watcher of the type.
//!
//! Watchers are bounded to a single pending notification. A slow stream never
//! blocks a writer; it just sees the newest snapshot when it gets around to
//! reading, which is all a state-of-the-world client needs.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use envoy_types::pb::google::protobuf::Any;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::resources::{BuiltResource, ResourceType};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// Immutable contents of one resource type at one version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSnapshot {
    version: u64,
    /// Sorted by name, names unique
    resources: Vec<BuiltResource>,
}

impl ResourceSnapshot {
    /// Zero until the first write.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The version as sent in `version_info`.
    pub fn version_info(&self) -> String {
        self.version.to_string()
    }

    pub fn resources(&self) -> &[BuiltResource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&BuiltResource> {
        self.resources
            .binary_search_by(|resource| resource.name.as_str().cmp(name))
            .ok()
            .map(|index| &self.resources[index])
    }

    /// Resources named in `names`, or all of them when `names` is empty.
    /// Unknown names are skipped.
    pub fn filtered(&self, names: &[String]) -> Vec<Any> {
        if names.is_empty() {
            return self.resources.iter().map(|r| r.resource.clone()).collect();
        }
        self.resources
            .iter()
            .filter(|r| names.iter().any(|name| name == &r.name))
            .map(|r| r.resource.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct TypeSlot {
    snapshot: RwLock<Arc<ResourceSnapshot>>,
    watchers: Mutex<HashMap<WatchId, mpsc::Sender<u64>>>,
}

impl TypeSlot {
    fn notify(&self, resource_type: ResourceType, version: u64) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|id, sender| match sender.try_send(version) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(watch_id = %id, %resource_type, "watcher already has a pending notification");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(watch_id = %id, %resource_type, "removing closed watcher");
                false
            }
        });
    }
}

/// Versioned per-type snapshots shared by the event handler and every stream.
#[derive(Debug, Default)]
pub struct ResourceCache {
    slots: [Arc<TypeSlot>; 4],
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, resource_type: ResourceType) -> &Arc<TypeSlot> {
        &self.slots[resource_type as usize]
    }

    /// Replace the snapshot for `resource_type` and wake its watchers.
    /// Returns the new version.
    pub fn update(&self, resource_type: ResourceType, mut resources: Vec<BuiltResource>) -> u64 {
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        resources.dedup_by(|next, first| next.name == first.name);
        let count = resources.len();

        let slot = self.slot(resource_type);
        let version = {
            let mut current = slot.snapshot.write();
            let version = current.version + 1;
            *current = Arc::new(ResourceSnapshot { version, resources });
            version
        };

        debug!(%resource_type, version, resources = count, "published snapshot");
        metrics().record_cache_version(resource_type.type_url(), version, count);
        slot.notify(resource_type, version);
        version
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn get(&self, resource_type: ResourceType) -> Arc<ResourceSnapshot> {
        Arc::clone(&self.slot(resource_type).snapshot.read())
    }

    pub fn version(&self, resource_type: ResourceType) -> u64 {
        self.slot(resource_type).snapshot.read().version
    }

    /// Subscribe to version changes of `resource_type`. Dropping the returned
    /// [`Watcher`] unsubscribes.
    pub fn watch(&self, resource_type: ResourceType) -> Watcher {
        let id = WatchId::next();
        let (sender, receiver) = mpsc::channel(1);
        let slot = Arc::clone(self.slot(resource_type));
        slot.watchers.lock().insert(id, sender);
        trace!(watch_id = %id, %resource_type, "registered watcher");

        Watcher { id, resource_type, receiver, slot }
    }

    pub fn watch_count(&self, resource_type: ResourceType) -> usize {
        self.slot(resource_type).watchers.lock().len()
    }
}

/// Stream of version notifications for one resource type.
///
/// Notifications coalesce: after several writes a watcher yields once, with
/// whichever version it was first told about. Readers should always fetch the
/// current snapshot instead of trusting the yielded number.
#[derive(Debug)]
pub struct Watcher {
    id: WatchId,
    resource_type: ResourceType,
    receiver: mpsc::Receiver<u64>,
    slot: Arc<TypeSlot>,
}

impl Watcher {
    pub fn id(&self) -> WatchId {
        self.id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }
}

impl Stream for Watcher {
    type Item = u64;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<u64>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.slot.watchers.lock().remove(&self.id);
    }
}
