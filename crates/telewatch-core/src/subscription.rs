// ── Subscription manager ──
//
// Tracks which attributes must be streamed. Removal is always checked
// against the dashboard's current content, so an id still shown on some
// card stays subscribed.

use std::collections::BTreeSet;

use tracing::debug;

use crate::dashboard::DashboardState;
use crate::model::{CardIndex, ModelId};

/// A change to the server-side subscription set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionIntent {
    Subscribe(ModelId),
    Unsubscribe(ModelId),
}

/// The listener set: every attribute id currently subscribed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionManager {
    listeners: BTreeSet<ModelId>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listeners(&self) -> &BTreeSet<ModelId> {
        &self.listeners
    }

    pub fn is_subscribed(&self, id: &ModelId) -> bool {
        self.listeners.contains(id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Subscribe `id` unless it already is.
    pub fn add_listener(&mut self, id: ModelId) -> Option<SubscriptionIntent> {
        if self.listeners.contains(&id) {
            return None;
        }
        debug!(model = %id, "adding listener");
        self.listeners.insert(id.clone());
        Some(SubscriptionIntent::Subscribe(id))
    }

    /// Unsubscribe `id` unless a card other than `editing` still shows it.
    pub fn remove_listener(
        &mut self,
        id: &ModelId,
        dashboard: &DashboardState,
        editing: Option<&CardIndex>,
    ) -> Option<SubscriptionIntent> {
        if !self.listeners.contains(id) {
            return None;
        }
        if dashboard.is_used(id, editing) {
            debug!(model = %id, "listener still referenced, keeping it");
            return None;
        }
        debug!(model = %id, "removing listener");
        self.listeners.remove(id);
        Some(SubscriptionIntent::Unsubscribe(id.clone()))
    }

    /// Reconcile one card's content change. `dashboard` must already hold
    /// the new content. Additions come first.
    pub fn reconcile_content(
        &mut self,
        index: &CardIndex,
        old: &[ModelId],
        new: &[ModelId],
        dashboard: &DashboardState,
    ) -> Vec<SubscriptionIntent> {
        let old: BTreeSet<&ModelId> = old.iter().collect();
        let new: BTreeSet<&ModelId> = new.iter().collect();

        let mut intents: Vec<SubscriptionIntent> = new
            .difference(&old)
            .filter_map(|id| self.add_listener((*id).clone()))
            .collect();
        intents.extend(
            old.difference(&new)
                .filter_map(|id| self.remove_listener(id, dashboard, Some(index))),
        );
        intents
    }

    /// Reconcile a whole-dashboard replacement. `dashboard` must already be
    /// the replacement.
    pub fn reconcile_view(
        &mut self,
        old: &BTreeSet<ModelId>,
        new: &BTreeSet<ModelId>,
        dashboard: &DashboardState,
    ) -> Vec<SubscriptionIntent> {
        let mut intents: Vec<SubscriptionIntent> = new
            .difference(old)
            .filter_map(|id| self.add_listener(id.clone()))
            .collect();
        intents.extend(
            old.difference(new)
                .filter_map(|id| self.remove_listener(id, dashboard, None)),
        );
        intents
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dashboard::DashboardAction;
    use crate::model::CardType;
    use pretty_assertions::assert_eq;

    fn ids(models: &[&str]) -> Vec<ModelId> {
        models.iter().map(|m| ModelId::from(*m)).collect()
    }

    /// Apply `SetContent` and reconcile, the way the session does.
    fn set_content(
        subs: &mut SubscriptionManager,
        dash: &mut DashboardState,
        index: &str,
        models: &[&str],
    ) -> Vec<SubscriptionIntent> {
        let index = CardIndex::from(index);
        let old = dash.content(&index).to_vec();
        let new = ids(models);
        dash.apply(DashboardAction::SetContent {
            index: index.clone(),
            models: new.clone(),
        });
        subs.reconcile_content(&index, &old, &new, dash)
    }

    fn two_cards() -> DashboardState {
        let mut dash = DashboardState::new();
        dash.apply(DashboardAction::AddCard(CardType::List));
        dash.apply(DashboardAction::AddCard(CardType::Trend));
        dash
    }

    #[test]
    fn add_listener_is_idempotent() {
        let mut subs = SubscriptionManager::new();
        let id = ModelId::from("sys/tg/1/ampli");
        assert_eq!(
            subs.add_listener(id.clone()),
            Some(SubscriptionIntent::Subscribe(id.clone()))
        );
        assert_eq!(subs.add_listener(id), None);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn shared_attribute_unsubscribes_only_when_unused() {
        let mut subs = SubscriptionManager::new();
        let mut dash = two_cards();
        let a = ModelId::from("dev/A");

        assert_eq!(
            set_content(&mut subs, &mut dash, "0", &["dev/A"]),
            vec![SubscriptionIntent::Subscribe(a.clone())]
        );
        assert!(set_content(&mut subs, &mut dash, "1", &["dev/A"]).is_empty());

        // Still on card 1.
        assert!(set_content(&mut subs, &mut dash, "0", &[]).is_empty());
        assert!(subs.is_subscribed(&a));

        assert_eq!(
            set_content(&mut subs, &mut dash, "1", &[]),
            vec![SubscriptionIntent::Unsubscribe(a.clone())]
        );
        assert!(subs.is_empty());
    }

    #[test]
    fn moving_between_cards_produces_no_traffic() {
        let mut subs = SubscriptionManager::new();
        let mut dash = two_cards();
        set_content(&mut subs, &mut dash, "0", &["dev/A", "dev/B"]);

        // Add to the destination first, then drop from the source.
        assert!(set_content(&mut subs, &mut dash, "1", &["dev/A"]).is_empty());
        assert!(set_content(&mut subs, &mut dash, "0", &["dev/B"]).is_empty());
        assert!(subs.is_subscribed(&ModelId::from("dev/A")));
    }

    #[test]
    fn reconcile_adds_before_removing() {
        let mut subs = SubscriptionManager::new();
        let mut dash = two_cards();
        set_content(&mut subs, &mut dash, "0", &["dev/A"]);
        assert_eq!(
            set_content(&mut subs, &mut dash, "0", &["dev/B"]),
            vec![
                SubscriptionIntent::Subscribe(ModelId::from("dev/B")),
                SubscriptionIntent::Unsubscribe(ModelId::from("dev/A")),
            ]
        );
    }

    #[test]
    fn direct_removal_respects_card_usage() {
        let mut subs = SubscriptionManager::new();
        let mut dash = two_cards();
        set_content(&mut subs, &mut dash, "0", &["dev/A"]);
        subs.add_listener(ModelId::from("dev/free"));

        assert_eq!(subs.remove_listener(&ModelId::from("dev/A"), &dash, None), None);
        assert_eq!(
            subs.remove_listener(&ModelId::from("dev/free"), &dash, None),
            Some(SubscriptionIntent::Unsubscribe(ModelId::from("dev/free")))
        );
        assert_eq!(subs.remove_listener(&ModelId::from("dev/never"), &dash, None), None);
    }

    #[test]
    fn reconcile_view_diffs_referenced_sets() {
        let mut subs = SubscriptionManager::new();
        let dash = DashboardState::new();
        subs.add_listener(ModelId::from("dev/old"));

        let old = ids(&["dev/old", "dev/kept"]).into_iter().collect();
        let new = ids(&["dev/kept", "dev/new"]).into_iter().collect();
        subs.add_listener(ModelId::from("dev/kept"));

        assert_eq!(
            subs.reconcile_view(&old, &new, &dash),
            vec![
                SubscriptionIntent::Subscribe(ModelId::from("dev/new")),
                SubscriptionIntent::Unsubscribe(ModelId::from("dev/old")),
            ]
        );
    }
}
