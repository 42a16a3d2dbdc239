// ── Catalog response normalization ──
//
// Flattens a nested catalog response into one id → record table per
// entity kind. Nested child lists are replaced by lists of child ids, so
// a child reached through two parents collapses into one record.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, trace};

use telewatch_api::wire::Record;

use super::schema::{EntityDescriptor, EntitySchema, Inherit};
use crate::model::EntityKind;

/// Flat tables produced by one normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    tables: BTreeMap<EntityKind, BTreeMap<String, Record>>,
}

impl Normalized {
    pub fn table(&self, kind: EntityKind) -> Option<&BTreeMap<String, Record>> {
        self.tables.get(&kind)
    }

    /// Total records across every kind.
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(BTreeMap::is_empty)
    }

    pub fn into_tables(self) -> BTreeMap<EntityKind, BTreeMap<String, Record>> {
        self.tables
    }

    /// The same entity seen twice in one response merges like it would
    /// across responses.
    fn insert(&mut self, kind: EntityKind, id: String, record: Record) {
        self.tables
            .entry(kind)
            .or_default()
            .entry(id)
            .or_default()
            .extend(record);
    }
}

/// Normalize a raw catalog response.
///
/// Keys matching a kind's collection name (`"devices"`) or singular name
/// (`"device"`) are read as records of that kind; any other object-valued
/// key is searched recursively. Records whose id cannot be derived are
/// skipped.
pub fn normalize(response: &Value, schema: &EntitySchema) -> Normalized {
    let mut out = Normalized::default();
    walk(response, schema, &mut out);
    out
}

fn walk(value: &Value, schema: &EntitySchema, out: &mut Normalized) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, child) in map {
        match schema.for_key(key) {
            Some(descriptor) => match child {
                Value::Array(items) => {
                    for item in items {
                        normalize_entity(schema, descriptor, item, None, &[], out);
                    }
                }
                Value::Object(_) => {
                    normalize_entity(schema, descriptor, child, None, &[], out);
                }
                _ => trace!(key = %key, "ignoring non-record catalog value"),
            },
            None => walk(child, schema, out),
        }
    }
}

/// Store one entity (and, recursively, its children); returns its id.
fn normalize_entity(
    schema: &EntitySchema,
    descriptor: &EntityDescriptor,
    item: &Value,
    parent: Option<(&Record, &str)>,
    inherit: &[(&'static str, Inherit)],
    out: &mut Normalized,
) -> Option<String> {
    let mut record = match item {
        Value::Object(obj) => obj.clone(),
        // Already normalized: a bare id.
        Value::String(id) => return Some(id.clone()),
        _ => {
            debug!(kind = %descriptor.kind, "skipping non-object catalog record");
            return None;
        }
    };

    if let Some((parent_record, parent_id)) = parent {
        for (field, source) in inherit {
            if record.contains_key(*field) {
                continue;
            }
            let value = match source {
                Inherit::Field(name) => parent_record.get(*name).cloned(),
                Inherit::ParentId => Some(Value::String(parent_id.to_owned())),
            };
            if let Some(value) = value {
                record.insert((*field).to_owned(), value);
            }
        }
    }

    let Some(id) = descriptor.derive_id(&record) else {
        debug!(kind = %descriptor.kind, "skipping catalog record without id fields");
        return None;
    };

    let mut child_ids = Vec::new();
    for relation in descriptor.children {
        let Some(nested) = record.get(relation.field) else {
            continue;
        };
        let Some(child_descriptor) = schema.descriptor(relation.kind) else {
            continue;
        };
        let ids: Vec<Value> = match nested {
            Value::Array(items) => items
                .iter()
                .filter_map(|child| {
                    normalize_entity(
                        schema,
                        child_descriptor,
                        child,
                        Some((&record, &id)),
                        relation.inherit,
                        out,
                    )
                })
                .map(Value::String)
                .collect(),
            Value::Object(_) => normalize_entity(
                schema,
                child_descriptor,
                nested,
                Some((&record, &id)),
                relation.inherit,
                out,
            )
            .map(Value::String)
            .into_iter()
            .collect(),
            _ => continue,
        };
        child_ids.push((relation.field, ids));
    }
    for (field, ids) in child_ids {
        record.insert(field.to_owned(), Value::Array(ids));
    }

    out.insert(descriptor.kind, id.clone(), record);
    Some(id)
}
