// ── Domain model ──
//
// Catalog entities, live values, dashboard cards and the ids tying them
// together.

pub mod card;
pub mod catalog;
pub mod ids;
pub mod value;

pub use card::{CardType, LayoutItem};
pub use catalog::{Attribute, CatalogEntity, Device, Domain, EntityKind, Family, Member, Property};
pub use ids::{CardIndex, ModelId};
pub use value::{AttributeConfig, AttributeHistory, AttributeValue, HISTORY_CAPACITY, Quality};
