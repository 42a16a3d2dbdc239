//! State-synchronization engine between `telewatch-api` and dashboard
//! consumers (CLI / UI).
//!
//! - **[`Engine`]**: cloneable handle owning one telemetry session. It
//!   opens the push channel, applies every [`Action`] on a single task and
//!   publishes snapshots of the dashboard and the listener set.
//!
//! - **[`Session`]**: the synchronous core the engine drives. It applies
//!   one action at a time and returns outbound frames and notifications,
//!   so its behaviour is testable without a runtime.
//!
//! - **[`EntityCache`]**: normalized catalog records (domains, families,
//!   members, devices, attributes, properties) keyed by canonical id and
//!   shallow-merged on every response.
//!
//! - **[`LiveValueStore`]**: latest value, bounded history, display config
//!   and last read error per attribute.
//!
//! - **[`DashboardState`]** / **[`SubscriptionManager`]**: cards and their
//!   content, and the attribute set that must be streamed for them.
//!
//! - **[`persistence`]**: the compact view token, debounced writes and the
//!   guard against reading our own writes back.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod convert;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod live;
pub mod model;
pub mod notification;
pub mod persistence;
pub mod session;
pub mod stream;
pub mod subscription;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{EventBridge, FrameSummary};
pub use cache::{EntityCache, EntitySchema, MergeSummary, TableSnapshot};
pub use config::{EngineConfig, ReconnectPolicy, SessionToken, TlsVerification};
pub use dashboard::{DashboardAction, DashboardChange, DashboardState, ViewState};
pub use engine::{Engine, PushLink};
pub use error::CoreError;
pub use live::LiveValueStore;
pub use notification::{Notification, NotificationLevel};
pub use persistence::{MemoryTokenSink, TokenSink, ViewPersistence};
pub use session::{Action, Effects, Session};
pub use stream::SnapshotStream;
pub use subscription::{SubscriptionIntent, SubscriptionManager};
pub use view::{AttributeDisplay, CardView};

pub use telewatch_api::{ChannelState, ChannelStatus};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Attribute, AttributeConfig, AttributeHistory, AttributeValue, CardIndex, CardType, Device,
    Domain, EntityKind, Family, LayoutItem, Member, ModelId, Property, Quality,
};
