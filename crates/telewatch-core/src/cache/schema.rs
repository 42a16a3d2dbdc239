// ── Entity-kind descriptors ──
//
// How each catalog kind derives its id and which of its fields hold
// nested children to be split out into their own tables.

use serde_json::Value;

use telewatch_api::wire::Record;

use crate::model::EntityKind;

/// Where a nested child takes a missing key field from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inherit {
    /// A field of the parent record.
    Field(&'static str),
    /// The parent's derived id.
    ParentId,
}

/// A field of a parent record that holds nested children.
#[derive(Debug, Clone, Copy)]
pub struct ChildRelation {
    pub field: &'static str,
    pub kind: EntityKind,
    /// Key fields filled in from the parent when the child omits them.
    pub inherit: &'static [(&'static str, Inherit)],
}

/// Id derivation and child layout for one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Fields joined with `/` to form the id.
    pub id_fields: &'static [&'static str],
    pub children: &'static [ChildRelation],
}

impl EntityDescriptor {
    /// Derive the id from the key fields; `None` if any is missing or not
    /// a string/number.
    pub fn derive_id(&self, record: &Record) -> Option<String> {
        let mut parts = Vec::with_capacity(self.id_fields.len());
        for field in self.id_fields {
            match record.get(*field)? {
                Value::String(s) => parts.push(s.clone()),
                Value::Number(n) => parts.push(n.to_string()),
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }
}

const DEVICE_CHILD: &[(&str, Inherit)] = &[("device", Inherit::ParentId)];

const DEVICE_CHILDREN: &[ChildRelation] = &[
    ChildRelation {
        field: "attributes",
        kind: EntityKind::Attribute,
        inherit: DEVICE_CHILD,
    },
    ChildRelation {
        field: "properties",
        kind: EntityKind::Property,
        inherit: DEVICE_CHILD,
    },
];

const CATALOG: &[EntityDescriptor] = &[
    EntityDescriptor {
        kind: EntityKind::Domain,
        id_fields: &["name"],
        children: &[ChildRelation {
            field: "families",
            kind: EntityKind::Family,
            inherit: &[("domain", Inherit::ParentId)],
        }],
    },
    EntityDescriptor {
        kind: EntityKind::Family,
        id_fields: &["domain", "name"],
        children: &[ChildRelation {
            field: "members",
            kind: EntityKind::Member,
            inherit: &[
                ("domain", Inherit::Field("domain")),
                ("family", Inherit::Field("name")),
            ],
        }],
    },
    EntityDescriptor {
        kind: EntityKind::Member,
        id_fields: &["domain", "family", "name"],
        children: DEVICE_CHILDREN,
    },
    EntityDescriptor {
        kind: EntityKind::Device,
        id_fields: &["name"],
        children: DEVICE_CHILDREN,
    },
    EntityDescriptor {
        kind: EntityKind::Attribute,
        id_fields: &["device", "name"],
        children: &[],
    },
    EntityDescriptor {
        kind: EntityKind::Property,
        id_fields: &["device", "name"],
        children: &[],
    },
];

/// The set of descriptors a normalization pass works with.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    descriptors: Vec<EntityDescriptor>,
}

impl EntitySchema {
    pub fn new(descriptors: Vec<EntityDescriptor>) -> Self {
        Self { descriptors }
    }

    /// The telemetry catalog hierarchy.
    pub fn catalog() -> Self {
        Self::new(CATALOG.to_vec())
    }

    pub fn descriptor(&self, kind: EntityKind) -> Option<&EntityDescriptor> {
        self.descriptors.iter().find(|d| d.kind == kind)
    }

    /// Match a response key: plural (`"devices"`) for lists, singular
    /// (`"device"`) for a single record.
    pub fn for_key(&self, key: &str) -> Option<&EntityDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.kind.collection_key() == key || d.kind.as_ref() == key)
    }
}

impl Default for EntitySchema {
    fn default() -> Self {
        Self::catalog()
    }
}
