// ── Reactive entity table ──
//
// Concurrent storage with O(1) lookups and push-based change notification
// via `watch` channels. One table per catalog entity kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use telewatch_api::wire::Record;

/// Id-ordered view of a whole table.
pub type TableSnapshot = BTreeMap<String, Arc<Record>>;

/// A reactive id → record table for a single entity kind.
///
/// Uses `DashMap` for concurrent lookups and `watch` channels for
/// push-based change notification. Every mutation bumps a version counter
/// and rebuilds the snapshot that subscribers receive. Records are never
/// removed.
pub(crate) struct EntityTable {
    by_id: DashMap<String, Arc<Record>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<TableSnapshot>>,
}

impl EntityTable {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(TableSnapshot::new()));

        Self {
            by_id: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Shallow-merge one record. Returns `true` if the id was new.
    pub(crate) fn merge(&self, id: String, incoming: Record) -> bool {
        let is_new = self.merge_one(id, incoming);
        self.publish();
        is_new
    }

    /// Shallow-merge a batch, publishing a single snapshot at the end.
    /// Returns how many ids were new.
    pub(crate) fn merge_many(&self, records: impl IntoIterator<Item = (String, Record)>) -> usize {
        let mut inserted = 0;
        let mut touched = false;
        for (id, record) in records {
            touched = true;
            if self.merge_one(id, record) {
                inserted += 1;
            }
        }
        if touched {
            self.publish();
        }
        inserted
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<Record>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<TableSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<TableSnapshot>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Incoming fields replace existing ones; fields it lacks survive.
    fn merge_one(&self, id: String, incoming: Record) -> bool {
        let mut is_new = false;
        let mut slot = self.by_id.entry(id).or_insert_with(|| {
            is_new = true;
            Arc::new(Record::new())
        });
        Arc::make_mut(slot.value_mut()).extend(incoming);
        is_new
    }

    fn publish(&self) {
        let values: TableSnapshot = self
            .by_id
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn merge_returns_true_for_new_id() {
        let table = EntityTable::new();
        assert!(table.merge("a".into(), record(json!({"name": "a"}))));
        assert!(!table.merge("a".into(), record(json!({"name": "a"}))));
    }

    #[test]
    fn merge_is_shallow_per_field() {
        let table = EntityTable::new();
        table.merge("d/x".into(), record(json!({"label": "Old", "unit": "V"})));
        table.merge("d/x".into(), record(json!({"label": "New"})));

        let merged = table.get("d/x").unwrap();
        assert_eq!(merged["label"], json!("New"));
        assert_eq!(merged["unit"], json!("V"));
    }

    #[test]
    fn nested_objects_are_replaced_not_merged() {
        let table = EntityTable::new();
        table.merge("p".into(), record(json!({"value": {"a": 1, "b": 2}})));
        table.merge("p".into(), record(json!({"value": {"a": 3}})));
        assert_eq!(table.get("p").unwrap()["value"], json!({"a": 3}));
    }

    #[test]
    fn merge_many_publishes_once() {
        let table = EntityTable::new();
        let inserted = table.merge_many([
            ("a".to_owned(), record(json!({"n": 1}))),
            ("b".to_owned(), record(json!({"n": 2}))),
            ("a".to_owned(), record(json!({"m": 3}))),
        ]);
        assert_eq!(inserted, 2);
        assert_eq!(table.version(), 1);
        assert_eq!(table.len(), 2);

        let snap = table.snapshot();
        assert_eq!(snap.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(snap["a"]["n"], json!(1));
        assert_eq!(snap["a"]["m"], json!(3));
    }

    #[test]
    fn empty_batch_does_not_bump_version() {
        let table = EntityTable::new();
        assert_eq!(table.merge_many(Vec::new()), 0);
        assert_eq!(table.version(), 0);
    }

    #[test]
    fn subscribers_see_new_snapshots() {
        let table = EntityTable::new();
        let mut rx = table.subscribe();
        table.merge("a".into(), record(json!({})));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().contains_key("a"));
    }
}
