//! Cached view of the live sink list.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::node::SinkInfo;

/// Sinks currently known to PipeWire, shared between the PipeWire thread
/// and the daemon.
#[derive(Clone, Default)]
pub struct SinkRegistry {
    sinks: Arc<RwLock<HashMap<u32, SinkInfo>>>,
}

impl SinkRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to the cache.
    pub fn add(&self, sink: SinkInfo) {
        debug!(id = sink.id, name = %sink.name, "Sink added to registry");
        self.sinks.write().insert(sink.id, sink);
    }

    /// Remove a sink from the cache, returning it if it was known.
    pub fn remove(&self, id: u32) -> Option<SinkInfo> {
        let removed = self.sinks.write().remove(&id);
        if let Some(sink) = &removed {
            debug!(id, name = %sink.name, "Sink removed from registry");
        }
        removed
    }

    /// Get a sink by ID.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<SinkInfo> {
        self.sinks.read().get(&id).cloned()
    }

    /// Get a sink by node name.
    ///
    /// If several nodes share a name the newest (highest id) wins.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<SinkInfo> {
        self.sinks.read().values().filter(|s| s.name == name).max_by_key(|s| s.id).cloned()
    }

    /// Forget every sink, e.g. after losing the PipeWire connection.
    pub fn clear(&self) {
        self.sinks.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(id: u32, name: &str) -> SinkInfo {
        SinkInfo { id, name: name.to_string(), description: None, channels: 2 }
    }

    #[test]
    fn test_find_by_name() {
        let registry = SinkRegistry::new();
        registry.add(sink(10, "input.NovaGame"));
        registry.add(sink(11, "input.NovaChat"));

        assert_eq!(registry.find_by_name("input.NovaChat").map(|s| s.id), Some(11));
        assert!(registry.find_by_name("input.Missing").is_none());
    }

    #[test]
    fn test_find_by_name_prefers_newest() {
        let registry = SinkRegistry::new();
        registry.add(sink(10, "input.NovaGame"));
        registry.add(sink(57, "input.NovaGame"));

        assert_eq!(registry.find_by_name("input.NovaGame").map(|s| s.id), Some(57));
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = SinkRegistry::new();
        registry.add(sink(1, "a"));
        registry.add(sink(2, "b"));

        assert_eq!(registry.remove(1).map(|s| s.name), Some("a".to_string()));
        assert!(registry.remove(1).is_none());
        assert!(registry.get(2).is_some());

        registry.clear();
        assert!(registry.get(2).is_none());
        assert!(registry.find_by_name("b").is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SinkRegistry::new();
        let clone = registry.clone();
        clone.add(sink(3, "c"));

        assert!(registry.get(3).is_some());
    }
}
