//! Async transport for live-telemetry servers.
//!
//! - [`push`]: a WebSocket carrying subscription
//!   requests out and value/config/catalog events in, with reconnect and
//!   exponential backoff.
//! - [`wire`]: the push-channel frame format and its tolerant parser.
//! - [`catalog`]: the catalog query endpoint (opaque query in, JSON out).
//! - [`transport`]: shared TLS / timeout / session-cookie settings.

pub mod catalog;
pub mod error;
pub mod push;
pub mod transport;
pub mod wire;

pub use catalog::CatalogClient;
pub use error::Error;
pub use push::{ChannelState, ChannelStatus, FrameSink, InboundFrames, PushChannel, ReconnectConfig};
pub use transport::{SessionCookie, TlsMode, TransportConfig};
pub use wire::{ChangePayload, ConfigPayload, OutboundFrame, ParsedFrame, PushEvent, SubscriptionKind};
