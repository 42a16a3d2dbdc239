// ── Serialized action point ──
//
// `Session` owns the dashboard, the listener set and the persistence
// timer, and applies one `Action` at a time. It performs no I/O: outbound
// frames, notifications and token writes are returned to the caller.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use telewatch_api::{ChannelState, ChannelStatus, OutboundFrame};

use crate::bridge::EventBridge;
use crate::cache::{EntityCache, EntitySchema};
use crate::dashboard::{DashboardAction, DashboardChange, DashboardState, ViewState};
use crate::error::CoreError;
use crate::live::LiveValueStore;
use crate::model::ModelId;
use crate::notification::Notification;
use crate::persistence::{self, ViewPersistence};
use crate::subscription::{SubscriptionIntent, SubscriptionManager};

/// Every input the engine reacts to.
#[derive(Debug, Clone)]
pub enum Action {
    Dashboard(DashboardAction),
    /// Subscribe an attribute directly (e.g. clicked in the catalog tree).
    AddListener(ModelId),
    /// Drop a direct subscription; kept while a card still shows it.
    RemoveListener(ModelId),
    /// A raw catalog response to normalize into the cache.
    CatalogResponse(Value),
    /// One inbound push-channel text frame.
    PushFrame(String),
    /// The external view token changed (or was read at startup).
    ExternalToken(String),
    /// The push channel's latest status.
    Channel(ChannelStatus),
}

/// Side effects of one applied action.
#[derive(Debug, Default)]
pub struct Effects {
    pub frames: Vec<OutboundFrame>,
    pub notifications: Vec<Notification>,
    pub dashboard_changed: bool,
    pub listeners_changed: bool,
}

pub struct Session {
    cache: Arc<EntityCache>,
    schema: EntitySchema,
    bridge: EventBridge,
    dashboard: DashboardState,
    subscriptions: SubscriptionManager,
    persistence: ViewPersistence,
    channel: ChannelStatus,
}

impl Session {
    pub fn new(cache: Arc<EntityCache>, live: Arc<LiveValueStore>, debounce: Duration) -> Self {
        Self {
            bridge: EventBridge::new(Arc::clone(&cache), live),
            cache,
            schema: EntitySchema::catalog(),
            dashboard: DashboardState::new(),
            subscriptions: SubscriptionManager::new(),
            persistence: ViewPersistence::new(debounce),
            channel: ChannelStatus::default(),
        }
    }

    pub fn dashboard(&self) -> &DashboardState {
        &self.dashboard
    }

    pub fn listeners(&self) -> &BTreeSet<ModelId> {
        self.subscriptions.listeners()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state
    }

    /// When the pending view write is due, if one is pending.
    pub fn persistence_deadline(&self) -> Option<Instant> {
        self.persistence.deadline()
    }

    /// The token to write, if the debounce window has elapsed.
    pub fn poll_persistence(&mut self, now: Instant) -> Option<String> {
        self.persistence.poll(now, self.dashboard.view())
    }

    /// The token to write right away (shutdown), if anything is pending.
    pub fn flush_persistence(&mut self) -> Option<String> {
        if self.persistence.is_pending() {
            self.persistence.flush(self.dashboard.view())
        } else {
            None
        }
    }

    /// Apply one action to completion.
    pub fn apply(&mut self, action: Action, now: Instant) -> Effects {
        let mut effects = Effects::default();
        let intents = match action {
            Action::Dashboard(action) => self.apply_dashboard(action, now, &mut effects),
            Action::AddListener(id) => self.subscriptions.add_listener(id).into_iter().collect(),
            Action::RemoveListener(id) => self
                .subscriptions
                .remove_listener(&id, &self.dashboard, None)
                .into_iter()
                .collect(),
            Action::CatalogResponse(response) => {
                self.cache.merge_response(&response, &self.schema);
                Vec::new()
            }
            Action::PushFrame(text) => {
                self.apply_frame(&text, &mut effects);
                Vec::new()
            }
            Action::ExternalToken(token) => self.apply_external_token(&token, &mut effects),
            Action::Channel(status) => {
                self.apply_channel(status, &mut effects);
                Vec::new()
            }
        };

        if !intents.is_empty() {
            effects.listeners_changed = true;
            if self.channel.is_open() {
                effects.frames.extend(EventBridge::outbound(&intents));
            } else {
                debug!(
                    intents = intents.len(),
                    error = %CoreError::ChannelUnavailable,
                    "listener set will be sent when the channel opens"
                );
            }
        }
        effects
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn apply_dashboard(
        &mut self,
        action: DashboardAction,
        now: Instant,
        effects: &mut Effects,
    ) -> Vec<SubscriptionIntent> {
        let change = self.dashboard.apply(action);
        if change.is_changed() {
            effects.dashboard_changed = true;
            self.persistence.note_change(now);
        }
        self.reconcile(change)
    }

    /// Subscription work implied by a dashboard change. The dashboard
    /// already holds the new state.
    fn reconcile(&mut self, change: DashboardChange) -> Vec<SubscriptionIntent> {
        match change {
            DashboardChange::CardRemoved { index, content } => {
                let removed: BTreeSet<ModelId> = content.into_iter().collect();
                removed
                    .iter()
                    .filter_map(|id| {
                        self.subscriptions
                            .remove_listener(id, &self.dashboard, Some(&index))
                    })
                    .collect()
            }
            DashboardChange::ContentReplaced { index, old, new } => {
                self.subscriptions
                    .reconcile_content(&index, &old, &new, &self.dashboard)
            }
            DashboardChange::Restored { old, new } => {
                self.subscriptions.reconcile_view(&old, &new, &self.dashboard)
            }
            DashboardChange::Layout { content, .. } => content
                .iter()
                .filter_map(|id| self.subscriptions.remove_listener(id, &self.dashboard, None))
                .collect(),
            DashboardChange::Unchanged
            | DashboardChange::CardAdded(_)
            | DashboardChange::Metadata => Vec::new(),
        }
    }

    fn apply_frame(&self, text: &str, effects: &mut Effects) {
        match self.bridge.handle_frame(text) {
            Ok(summary) => {
                if summary.skipped > 0 {
                    effects.notifications.push(Notification::warning(format!(
                        "skipped {} undecodable push event(s)",
                        summary.skipped
                    )));
                }
                for (model, message) in summary.errors {
                    effects
                        .notifications
                        .push(Notification::warning(message).for_model(model));
                }
            }
            Err(e) => {
                warn!(error = %e, "dropping push frame");
                effects.notifications.push(Notification::from(&e));
            }
        }
    }

    fn apply_external_token(
        &mut self,
        token: &str,
        effects: &mut Effects,
    ) -> Vec<SubscriptionIntent> {
        if self.persistence.is_own(token) {
            debug!("external token is our own write, ignoring");
            return Vec::new();
        }
        let view: ViewState = match persistence::decode(token) {
            Ok(view) => view,
            Err(e) => {
                warn!(error = %e, "ignoring external view token");
                effects.notifications.push(Notification::from(&e));
                return Vec::new();
            }
        };

        info!(cards = view.layout.len(), "restoring dashboard from view token");
        self.persistence.accept_external(token);
        let change = self.dashboard.apply(DashboardAction::Restore(view));
        effects.dashboard_changed = change.is_changed();
        self.reconcile(change)
    }

    /// The listener set goes out on every new connection, including one
    /// whose `Error`/`Connecting` states were never observed here.
    fn apply_channel(&mut self, status: ChannelStatus, effects: &mut Effects) {
        let previous = self.channel;
        self.channel = status;
        let reopened = status.is_open()
            && (!previous.is_open() || status.connection != previous.connection);
        if reopened {
            info!(
                connection = status.connection,
                listeners = self.subscriptions.len(),
                "push channel open, sending listener set"
            );
            effects
                .frames
                .extend(EventBridge::resubscribe(self.subscriptions.listeners()));
            effects.notifications.push(Notification::info(format!(
                "Push channel open, {} attribute(s) subscribed",
                self.subscriptions.len()
            )));
        } else if previous.is_open() && !status.is_open() {
            info!(state = ?status.state, "push channel left open state");
        }
    }
}
