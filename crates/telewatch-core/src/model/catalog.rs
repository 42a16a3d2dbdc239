// ── Catalog domain types ──
//
// The catalog hierarchy: domain → family → member (= device) → attributes
// and properties. Records live in the cache as flat JSON objects; these
// typed views are decoded on read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Every catalog entity kind the cache keeps a table for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Domain,
    Family,
    Member,
    Device,
    Attribute,
    Property,
}

impl EntityKind {
    /// Plural key the catalog uses for lists of this kind (`"families"`).
    pub fn collection_key(self) -> &'static str {
        match self {
            Self::Domain => "domains",
            Self::Family => "families",
            Self::Member => "members",
            Self::Device => "devices",
            Self::Attribute => "attributes",
            Self::Property => "properties",
        }
    }
}

/// A typed catalog record that can be read back out of the cache.
pub trait CatalogEntity: DeserializeOwned {
    const KIND: EntityKind;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    /// Child family ids (`domain/family`).
    #[serde(default)]
    pub families: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    pub domain: String,
    pub name: String,
    /// Child member ids (`domain/family/member`).
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub domain: String,
    pub family: String,
    pub name: String,
    #[serde(default)]
    pub exported: bool,
}

impl Member {
    /// The device name this member stands for.
    pub fn device_name(&self) -> String {
        format!("{}/{}/{}", self.domain, self.family, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Property ids (`device/name`).
    #[serde(default)]
    pub properties: Vec<String>,
    /// Attribute ids (`device/name`).
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub device: String,
    pub name: String,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub dataformat: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub device: String,
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl CatalogEntity for Domain {
    const KIND: EntityKind = EntityKind::Domain;
}

impl CatalogEntity for Family {
    const KIND: EntityKind = EntityKind::Family;
}

impl CatalogEntity for Member {
    const KIND: EntityKind = EntityKind::Member;
}

impl CatalogEntity for Device {
    const KIND: EntityKind = EntityKind::Device;
}

impl CatalogEntity for Attribute {
    const KIND: EntityKind = EntityKind::Attribute;
}

impl CatalogEntity for Property {
    const KIND: EntityKind = EntityKind::Property;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_names_round_trip_through_strum() {
        assert_eq!(EntityKind::Attribute.to_string(), "attribute");
        assert_eq!(EntityKind::from_str("family").unwrap(), EntityKind::Family);
        assert_eq!(EntityKind::Property.collection_key(), "properties");
    }

    #[test]
    fn member_maps_to_device_name() {
        let member = Member {
            domain: "sys".into(),
            family: "tg_test".into(),
            name: "1".into(),
            exported: true,
        };
        assert_eq!(member.device_name(), "sys/tg_test/1");
    }
}
