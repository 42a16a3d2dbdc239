// ── Live value store ──
//
// Latest value, bounded history, display config and last read error per
// attribute. Entries are created by the first event that mentions an id,
// whether or not the catalog knows it yet.

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

use crate::model::{AttributeConfig, AttributeHistory, AttributeValue, ModelId};

/// Per-attribute live state, shared between the engine task (the only
/// writer) and readers at the rendering boundary.
pub struct LiveValueStore {
    values: DashMap<ModelId, AttributeValue>,
    history: DashMap<ModelId, AttributeHistory>,
    configs: DashMap<ModelId, AttributeConfig>,
    errors: DashMap<ModelId, String>,
    version: watch::Sender<u64>,
}

impl LiveValueStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            values: DashMap::new(),
            history: DashMap::new(),
            configs: DashMap::new(),
            errors: DashMap::new(),
            version,
        }
    }

    /// Overwrite the latest value per id and append numeric samples to its
    /// history, in iteration order. A value clears any recorded read error.
    pub fn apply_value_update(
        &self,
        updates: impl IntoIterator<Item = (ModelId, AttributeValue)>,
    ) -> usize {
        let mut applied = 0;
        for (id, value) in updates {
            trace!(model = %id, quality = %value.quality, "value update");
            if let Some(sample) = value.numeric() {
                self.history
                    .entry(id.clone())
                    .or_default()
                    .push(value.timestamp, sample);
            }
            self.errors.remove(&id);
            self.values.insert(id, value);
            applied += 1;
        }
        self.bump(applied);
        applied
    }

    /// Shallow-merge display config per id.
    pub fn apply_config_update(
        &self,
        updates: impl IntoIterator<Item = (ModelId, AttributeConfig)>,
    ) -> usize {
        let mut applied = 0;
        for (id, config) in updates {
            self.configs.entry(id).or_default().merge(config);
            applied += 1;
        }
        self.bump(applied);
        applied
    }

    /// Record the server's last read error per id.
    pub fn apply_error_update(
        &self,
        errors: impl IntoIterator<Item = (ModelId, String)>,
    ) -> usize {
        let mut applied = 0;
        for (id, message) in errors {
            self.errors.insert(id, message);
            applied += 1;
        }
        self.bump(applied);
        applied
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn value(&self, id: &ModelId) -> Option<AttributeValue> {
        self.values.get(id).map(|r| r.value().clone())
    }

    pub fn history(&self, id: &ModelId) -> Option<AttributeHistory> {
        self.history.get(id).map(|r| r.value().clone())
    }

    pub fn config(&self, id: &ModelId) -> Option<AttributeConfig> {
        self.configs.get(id).map(|r| r.value().clone())
    }

    pub fn error(&self, id: &ModelId) -> Option<String> {
        self.errors.get(id).map(|r| r.value().clone())
    }

    /// Every id with a latest value, sorted.
    pub fn ids(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self.values.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Mutation counter; bumps once per non-empty update batch.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self, applied: usize) {
        if applied > 0 {
            self.version.send_modify(|v| *v += 1);
        }
    }
}

impl Default for LiveValueStore {
    fn default() -> Self {
        Self::new()
    }
}
