// ── Normalized entity cache ──
//
// One flat, reactive table per catalog kind. Catalog responses and entity
// push events are merged in; nothing is ever evicted.

mod collection;
pub mod normalize;
pub mod schema;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use telewatch_api::wire::Record;

pub use collection::TableSnapshot;
pub use normalize::{Normalized, normalize};
pub use schema::{ChildRelation, EntityDescriptor, EntitySchema, Inherit};

use crate::error::CoreError;
use crate::model::{Attribute, CatalogEntity, EntityKind, ModelId};
use crate::stream::SnapshotStream;
use collection::EntityTable;

/// Per-kind counts from one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records merged per kind (new and updated).
    pub merged: BTreeMap<EntityKind, usize>,
    /// How many of those ids were new to the cache.
    pub inserted: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.merged.values().sum()
    }
}

/// Flat id-keyed tables for every catalog entity kind.
pub struct EntityCache {
    domains: EntityTable,
    families: EntityTable,
    members: EntityTable,
    devices: EntityTable,
    attributes: EntityTable,
    properties: EntityTable,
}

impl EntityCache {
    pub fn new() -> Self {
        Self {
            domains: EntityTable::new(),
            families: EntityTable::new(),
            members: EntityTable::new(),
            devices: EntityTable::new(),
            attributes: EntityTable::new(),
            properties: EntityTable::new(),
        }
    }

    fn table(&self, kind: EntityKind) -> &EntityTable {
        match kind {
            EntityKind::Domain => &self.domains,
            EntityKind::Family => &self.families,
            EntityKind::Member => &self.members,
            EntityKind::Device => &self.devices,
            EntityKind::Attribute => &self.attributes,
            EntityKind::Property => &self.properties,
        }
    }

    // ── Merging ──────────────────────────────────────────────────────

    /// Normalize a raw catalog response and merge it in.
    pub fn merge_response(&self, response: &Value, schema: &EntitySchema) -> MergeSummary {
        self.merge_normalized(normalize(response, schema))
    }

    pub fn merge_normalized(&self, normalized: Normalized) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for (kind, records) in normalized.into_tables() {
            let count = records.len();
            summary.inserted += self.merge_records(kind, records);
            summary.merged.insert(kind, count);
        }
        debug!(
            records = summary.total(),
            inserted = summary.inserted,
            "merged catalog records"
        );
        summary
    }

    /// Merge records already keyed by id. Returns how many ids were new.
    pub fn merge_records(
        &self,
        kind: EntityKind,
        records: impl IntoIterator<Item = (String, Record)>,
    ) -> usize {
        self.table(kind).merge_many(records)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Raw record for `id`.
    pub fn record(&self, kind: EntityKind, id: &str) -> Option<Arc<Record>> {
        self.table(kind).get(id)
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.table(kind).contains(id)
    }

    /// Typed record for `id`; `None` when absent or not decodable as `T`.
    pub fn get<T: CatalogEntity>(&self, id: &str) -> Option<T> {
        let record = self.record(T::KIND, id)?;
        match serde_json::from_value(Value::Object((*record).clone())) {
            Ok(entity) => Some(entity),
            Err(e) => {
                debug!(kind = %T::KIND, id, error = %e, "cached record does not decode");
                None
            }
        }
    }

    /// Like [`get`](Self::get), failing with `UnknownEntityReference`.
    pub fn require<T: CatalogEntity>(&self, id: &str) -> Result<T, CoreError> {
        self.get(id).ok_or_else(|| CoreError::UnknownEntityReference {
            kind: T::KIND.to_string(),
            id: id.to_owned(),
        })
    }

    pub fn attribute(&self, model: &ModelId) -> Option<Attribute> {
        self.get(model.as_str())
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.table(kind).len()
    }

    pub fn snapshot(&self, kind: EntityKind) -> Arc<TableSnapshot> {
        self.table(kind).snapshot()
    }

    pub fn subscribe(&self, kind: EntityKind) -> SnapshotStream<TableSnapshot> {
        SnapshotStream::new(self.table(kind).subscribe())
    }

    /// Mutation counter for one table.
    pub fn version(&self, kind: EntityKind) -> u64 {
        self.table(kind).version()
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attribute_response(extra: Value) -> Value {
        let mut attr = json!({"device": "dev", "name": "attr"});
        attr.as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        json!({"attributes": [attr]})
    }

    #[test]
    fn partial_metadata_keeps_earlier_fields() {
        let cache = EntityCache::new();
        let schema = EntitySchema::catalog();

        cache.merge_response(&attribute_response(json!({"label": "Old", "unit": "mA"})), &schema);
        let summary = cache.merge_response(&attribute_response(json!({"label": "New"})), &schema);
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.merged[&EntityKind::Attribute], 1);

        let attr = cache.attribute(&ModelId::from("dev/attr")).unwrap();
        assert_eq!(attr.label.as_deref(), Some("New"));
        assert_eq!(attr.unit.as_deref(), Some("mA"));
    }

    #[test]
    fn re_receiving_an_entity_never_duplicates() {
        let cache = EntityCache::new();
        let schema = EntitySchema::catalog();
        let response = json!({"domains": [{"name": "sys"}, {"name": "sys"}]});
        cache.merge_response(&response, &schema);
        cache.merge_response(&response, &schema);
        assert_eq!(cache.len(EntityKind::Domain), 1);
    }

    #[test]
    fn require_reports_unknown_reference() {
        let cache = EntityCache::new();
        let err = cache.require::<Attribute>("dev/missing").unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownEntityReference { ref kind, ref id } if kind == "attribute" && id == "dev/missing"
        ));
    }

    #[test]
    fn undecodable_record_reads_as_absent() {
        let cache = EntityCache::new();
        cache.merge_records(
            EntityKind::Attribute,
            [("d/x".to_owned(), json!({"label": 5}).as_object().unwrap().clone())],
        );
        assert!(cache.contains(EntityKind::Attribute, "d/x"));
        assert!(cache.get::<Attribute>("d/x").is_none());
    }

    #[tokio::test]
    async fn subscribers_observe_merges() {
        let cache = EntityCache::new();
        let mut stream = cache.subscribe(EntityKind::Domain);
        assert!(stream.current().is_empty());

        cache.merge_response(&json!({"domains": [{"name": "sys"}]}), &EntitySchema::catalog());
        let snap = stream.changed().await.unwrap();
        assert!(snap.contains_key("sys"));
    }
}
