use crate::events::DriverEvent;
use crate::storage::{CacheBackend, cache_keys};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use zwh_core::prelude::*;

pub type SharedCacheBackend = Arc<Mutex<Box<dyn CacheBackend>>>;

/// The authoritative store for everything nodes have reported. Values and
/// their metadata live in separate maps so that removing a value keeps its
/// schema around. Writes that do not change anything emit no event.
pub struct ValueDb {
    home_id: u32,
    values: HashMap<EndpointValueId, CacheValue>,
    metadata: HashMap<EndpointValueId, ValueMetadata>,
    event_tx: mpsc::UnboundedSender<DriverEvent>,
    backend: SharedCacheBackend,
}

impl ValueDb {
    pub fn new(event_tx: mpsc::UnboundedSender<DriverEvent>, backend: SharedCacheBackend) -> Self {
        Self {
            home_id: 0,
            values: HashMap::new(),
            metadata: HashMap::new(),
            event_tx,
            backend,
        }
    }

    pub fn set_home_id(&mut self, home_id: u32) {
        self.home_id = home_id;
    }

    pub fn get(&self, id: &EndpointValueId) -> Option<&CacheValue> {
        self.values.get(id)
    }

    pub fn has(&self, id: &EndpointValueId) -> bool {
        self.values.contains_key(id)
    }

    pub fn get_metadata(&self, id: &EndpointValueId) -> Option<&ValueMetadata> {
        self.metadata.get(id)
    }

    /// Whether the value behind this id should be persisted across sessions.
    /// Without metadata we assume it is.
    fn is_stateful(&self, id: &EndpointValueId) -> bool {
        self.metadata.get(id).map(|m| m.stateful).unwrap_or(true)
    }

    pub fn set(&mut self, id: EndpointValueId, value: CacheValue) {
        let prev = self.values.insert(id, value.clone());
        match prev {
            Some(prev) if prev == value => {
                // Unchanged - no event, no write-through
            }
            Some(prev) => {
                self.persist(&id, &value);
                let _ = self.event_tx.send(DriverEvent::ValueUpdated {
                    value_id: id,
                    prev_value: prev,
                    value,
                });
            }
            None => {
                self.persist(&id, &value);
                let _ = self
                    .event_tx
                    .send(DriverEvent::ValueAdded { value_id: id, value });
            }
        }
    }

    /// Writes a value without emitting events or touching the backend.
    /// Used to restore cached state at startup.
    pub fn set_silent(&mut self, id: EndpointValueId, value: CacheValue) {
        self.values.insert(id, value);
    }

    pub fn remove(&mut self, id: &EndpointValueId) {
        if let Some(prev) = self.values.remove(id) {
            let mut backend = self.lock_backend();
            backend.remove(&cache_keys::value(self.home_id, id));
            drop(backend);
            let _ = self.event_tx.send(DriverEvent::ValueRemoved {
                value_id: *id,
                prev_value: prev,
            });
        }
    }

    /// Reports an event-like value that is not stored
    pub fn notify(&self, id: EndpointValueId, value: CacheValue) {
        let _ = self.event_tx.send(DriverEvent::ValueNotification {
            value_id: id,
            value,
        });
    }

    pub fn set_metadata(&mut self, id: EndpointValueId, metadata: ValueMetadata) {
        let prev = self.metadata.insert(id, metadata.clone());
        if prev.as_ref() != Some(&metadata) {
            let _ = self.event_tx.send(DriverEvent::MetadataUpdated {
                value_id: id,
                metadata,
            });
        }
    }

    /// All value ids currently known for the given node
    pub fn value_ids_for_node(&self, node_id: NodeId) -> Vec<EndpointValueId> {
        self.values
            .keys()
            .filter(|id| id.node_id() == node_id)
            .copied()
            .collect()
    }

    fn persist(&self, id: &EndpointValueId, value: &CacheValue) {
        if !self.is_stateful(id) {
            return;
        }
        let mut backend = self.lock_backend();
        backend.set(&cache_keys::value(self.home_id, id), value.clone());
    }

    fn lock_backend(&self) -> std::sync::MutexGuard<'_, Box<dyn CacheBackend>> {
        self.backend.lock().expect("cache backend lock poisoned")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::MemoryCacheBackend;

    fn value_db() -> (ValueDb, mpsc::UnboundedReceiver<DriverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend: SharedCacheBackend =
            Arc::new(Mutex::new(Box::new(MemoryCacheBackend::new())));
        (ValueDb::new(tx, backend), rx)
    }

    fn some_id() -> EndpointValueId {
        EndpointValueId::new(
            NodeId::new(5),
            EndpointIndex::Root,
            ValueId::new(CommandClasses::BinarySwitch, 0u32, None),
        )
    }

    #[test]
    fn test_set_emits_once_for_equal_values() {
        let (mut db, mut rx) = value_db();
        let id = some_id();

        db.set(id, CacheValue::Bool(true));
        db.set(id, CacheValue::Bool(true));

        assert!(matches!(rx.try_recv(), Ok(DriverEvent::ValueAdded { .. })));
        assert!(rx.try_recv().is_err());

        db.set(id, CacheValue::Bool(false));
        assert!(matches!(
            rx.try_recv(),
            Ok(DriverEvent::ValueUpdated { .. })
        ));
    }

    #[test]
    fn test_remove_preserves_metadata() {
        let (mut db, _rx) = value_db();
        let id = some_id();

        db.set_metadata(id, ValueMetadata::readonly_boolean("Current value"));
        db.set(id, CacheValue::Bool(true));
        db.remove(&id);

        assert!(!db.has(&id));
        assert!(db.get_metadata(&id).is_some());
    }
}
