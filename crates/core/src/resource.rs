// Revocable handles for loaded audio payloads
//
// A `ResourceRegistry` plays the role of an object-URL table: every payload
// handed to the media element is registered under a fresh id, and the id
// stays resolvable until its `ResourceHandle` is released or dropped.

use crate::model::AudioPayload;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "resource:{}", self.0)
    }
}

/// What the media element loads: payload bytes plus where they sit on the
/// book timeline.
#[derive(Debug, Clone)]
pub struct MediaResource {
    pub id: ResourceId,
    pub payload: AudioPayload,
    /// Book time (seconds) of the first sample in the payload
    pub origin: f64,
}

#[derive(Default)]
struct RegistryInner {
    live: Mutex<HashMap<ResourceId, MediaResource>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct ResourceRegistry {
    inner: Arc<RegistryInner>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, payload: AudioPayload, origin: f64) -> ResourceHandle {
        let id = ResourceId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let resource = MediaResource {
            id,
            payload,
            origin,
        };
        self.inner.live.lock().insert(id, resource.clone());
        log::debug!("Created {} ({} bytes at {:.2}s)", id, resource.payload.len(), origin);
        ResourceHandle {
            resource,
            registry: self.clone(),
            revoked: false,
        }
    }

    pub fn resolve(&self, id: ResourceId) -> Option<MediaResource> {
        self.inner.live.lock().get(&id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    fn revoke(&self, id: ResourceId) {
        if self.inner.live.lock().remove(&id).is_some() {
            log::debug!("Revoked {}", id);
        }
    }
}

/// Owning handle; revokes its registry entry on release or drop
pub struct ResourceHandle {
    resource: MediaResource,
    registry: ResourceRegistry,
    revoked: bool,
}

impl ResourceHandle {
    pub fn id(&self) -> ResourceId {
        self.resource.id
    }

    pub fn resource(&self) -> &MediaResource {
        &self.resource
    }

    pub fn release(mut self) {
        self.revoke();
    }

    fn revoke(&mut self) {
        if !self.revoked {
            self.revoked = true;
            self.registry.revoke(self.resource.id);
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.resource.id)
            .field("origin", &self.resource.origin)
            .finish()
    }
}

/// The single installed-resource slot of a playback session
#[derive(Debug, Default)]
pub struct ResourceSlot {
    current: Option<ResourceHandle>,
}

impl ResourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle`, releasing the one it supersedes.
    pub fn install(&mut self, handle: ResourceHandle) {
        if let Some(previous) = self.current.replace(handle) {
            previous.release();
        }
    }

    pub fn release(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.release();
        }
    }

    pub fn current(&self) -> Option<&ResourceHandle> {
        self.current.as_ref()
    }

    pub fn is_installed(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> AudioPayload {
        AudioPayload::new(vec![0u8; len], None)
    }

    #[test]
    fn test_handle_drop_revokes() {
        let registry = ResourceRegistry::new();
        let handle = registry.create(payload(4), 0.0);
        let id = handle.id();
        assert!(registry.resolve(id).is_some());
        drop(handle);
        assert!(registry.resolve(id).is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_slot_keeps_one_live_handle() {
        let registry = ResourceRegistry::new();
        let mut slot = ResourceSlot::new();

        slot.install(registry.create(payload(8), 0.0));
        let first = slot.current().unwrap().id();
        slot.install(registry.create(payload(8), 30.0));

        assert_eq!(registry.live_count(), 1);
        assert!(registry.resolve(first).is_none());
        assert_eq!(slot.current().unwrap().resource().origin, 30.0);

        slot.release();
        assert_eq!(registry.live_count(), 0);
        assert!(!slot.is_installed());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ResourceRegistry::new();
        let a = registry.create(payload(1), 0.0);
        let b = registry.create(payload(1), 0.0);
        assert_ne!(a.id(), b.id());
    }
}
