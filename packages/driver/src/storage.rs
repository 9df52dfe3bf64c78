use std::collections::BTreeMap;
use zwh_core::prelude::*;

/// The persistent keyed store the driver saves interview results and
/// stateful values into. Keys are partitioned by home id; the format behind
/// the store is opaque to the driver. `flush` must provide at-least-once
/// durability.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheValue>;
    fn set(&mut self, key: &str, value: CacheValue);
    fn remove(&mut self, key: &str);
    /// Enumerates the stored keys below a prefix, e.g. all cached values of
    /// one node
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
    fn flush(&mut self);
}

/// The in-memory backend used in tests and as a default
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: BTreeMap<String, CacheValue>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds the store, e.g. with state from a previous session
    pub fn with_entries(entries: impl IntoIterator<Item = (String, CacheValue)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn entries(&self) -> &BTreeMap<String, CacheValue> {
        &self.entries
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Option<CacheValue> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: CacheValue) {
        self.entries.insert(key.to_owned(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn flush(&mut self) {
        // Nothing to do for the in-memory store
    }
}

/// Key layout for the persistent store
pub mod cache_keys {
    use super::*;

    pub fn node_field(home_id: u32, node_id: NodeId, field: &str) -> String {
        format!("{:08x}.node.{}.{}", home_id, u8::from(node_id), field)
    }

    pub fn endpoint_field(
        home_id: u32,
        node_id: NodeId,
        endpoint: EndpointIndex,
        field: &str,
    ) -> String {
        format!(
            "{:08x}.node.{}.endpoint.{}.{}",
            home_id,
            u8::from(node_id),
            u8::from(endpoint),
            field
        )
    }

    /// Parses a key produced by [value] back into its id
    pub fn parse_value_key(home_id: u32, key: &str) -> Option<EndpointValueId> {
        let prefix = format!("{:08x}.node.", home_id);
        let rest = key.strip_prefix(prefix.as_str())?;
        let mut parts = rest.split('.');
        let node_id: u8 = parts.next()?.parse().ok()?;
        if parts.next()? != "value" {
            return None;
        }
        let endpoint: u8 = parts.next()?.parse().ok()?;
        let cc = CommandClasses::try_from(parts.next()?.parse::<u8>().ok()?).ok()?;
        let property: u32 = parts.next()?.parse().ok()?;
        let property_key: Option<u32> = parts.next().and_then(|p| p.parse().ok());
        Some(EndpointValueId::new(
            NodeId::new(node_id),
            EndpointIndex::new(endpoint),
            ValueId::new(cc, property, property_key),
        ))
    }

    pub fn value(home_id: u32, id: &EndpointValueId) -> String {
        let mut key = format!(
            "{:08x}.node.{}.value.{}.{}.{}",
            home_id,
            u8::from(id.node_id()),
            u8::from(id.endpoint()),
            id.command_class() as u8,
            id.property(),
        );
        if let Some(property_key) = id.property_key() {
            key.push_str(&format!(".{}", property_key));
        }
        key
    }
}
