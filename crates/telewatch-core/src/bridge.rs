// ── Event bridge ──
//
// Inbound: parse push frames and apply their events, in order, to the
// live store and the entity cache. Outbound: turn subscription intents
// into wire frames.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tracing::{debug, trace, warn};

use telewatch_api::wire::{self, OutboundFrame, PushEvent, Record};

use crate::cache::EntityCache;
use crate::convert::now_millis;
use crate::error::CoreError;
use crate::live::LiveValueStore;
use crate::model::{AttributeConfig, AttributeValue, EntityKind, ModelId};
use crate::subscription::SubscriptionIntent;

/// What one frame did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub values: usize,
    pub configs: usize,
    pub entities: usize,
    /// Read errors reported by the server, per attribute.
    pub errors: Vec<(ModelId, String)>,
    /// Events (or entity groups) that could not be applied.
    pub skipped: usize,
}

/// Routes push events into the stores.
pub struct EventBridge {
    cache: Arc<EntityCache>,
    live: Arc<LiveValueStore>,
}

impl EventBridge {
    pub fn new(cache: Arc<EntityCache>, live: Arc<LiveValueStore>) -> Self {
        Self { cache, live }
    }

    /// Parse a text frame and apply every decodable event in frame order.
    ///
    /// A frame with nothing decodable fails with `MalformedFrame` and
    /// changes nothing.
    pub fn handle_frame(&self, text: &str) -> Result<FrameSummary, CoreError> {
        let parsed = wire::parse_frame(text)?;
        let received_at = now_millis();

        let mut summary = FrameSummary {
            skipped: parsed.skipped,
            ..FrameSummary::default()
        };
        for event in parsed.events {
            self.apply_event(event, received_at, &mut summary);
        }
        trace!(
            values = summary.values,
            configs = summary.configs,
            entities = summary.entities,
            skipped = summary.skipped,
            "push frame applied"
        );
        Ok(summary)
    }

    /// Apply one event. `received_at` (epoch ms) stands in for missing
    /// sample times.
    pub fn apply_event(&self, event: PushEvent, received_at: f64, summary: &mut FrameSummary) {
        match event {
            PushEvent::Change(changes) => {
                summary.values += self.live.apply_value_update(changes.into_iter().map(
                    |(id, payload)| {
                        (
                            ModelId::from(id),
                            AttributeValue::from_change(payload, received_at),
                        )
                    },
                ));
            }
            PushEvent::Config(configs) => {
                summary.configs += self.live.apply_config_update(
                    configs
                        .into_iter()
                        .map(|(id, payload)| (ModelId::from(id), AttributeConfig::from(payload))),
                );
            }
            PushEvent::Error(errors) => {
                let errors: Vec<(ModelId, String)> = errors
                    .into_iter()
                    .map(|(id, message)| (ModelId::from(id), message))
                    .collect();
                self.live.apply_error_update(errors.iter().cloned());
                summary.errors.extend(errors);
            }
            PushEvent::Entities { kind, records } => match EntityKind::from_str(kind) {
                Ok(kind) => summary.entities += self.merge_entities(kind, records),
                Err(_) => {
                    debug!(kind, "no table for entity kind");
                    summary.skipped += 1;
                }
            },
            PushEvent::Receive(tables) => {
                for (name, records) in tables {
                    match kind_for_table(&name) {
                        Some(kind) => summary.entities += self.merge_entities(kind, records),
                        None => {
                            warn!(table = %name, "skipping unknown entity table");
                            summary.skipped += 1;
                        }
                    }
                }
            }
        }
    }

    fn merge_entities(&self, kind: EntityKind, records: BTreeMap<String, Record>) -> usize {
        let count = records.len();
        self.cache.merge_records(kind, records);
        count
    }

    /// Wire frames for a batch of intents: at most one `SUBSCRIBE` then at
    /// most one `UNSUBSCRIBE`.
    pub fn outbound(intents: &[SubscriptionIntent]) -> Vec<OutboundFrame> {
        let mut subscribe = Vec::new();
        let mut unsubscribe = Vec::new();
        for intent in intents {
            match intent {
                SubscriptionIntent::Subscribe(id) => subscribe.push(id.to_string()),
                SubscriptionIntent::Unsubscribe(id) => unsubscribe.push(id.to_string()),
            }
        }

        let mut frames = Vec::with_capacity(2);
        if !subscribe.is_empty() {
            frames.push(OutboundFrame::subscribe(subscribe));
        }
        if !unsubscribe.is_empty() {
            frames.push(OutboundFrame::unsubscribe(unsubscribe));
        }
        frames
    }

    /// One `SUBSCRIBE` for the whole listener set, sent when the channel
    /// (re)opens.
    pub fn resubscribe<'a>(listeners: impl IntoIterator<Item = &'a ModelId>) -> Option<OutboundFrame> {
        let models: Vec<String> = listeners.into_iter().map(ToString::to_string).collect();
        (!models.is_empty()).then(|| OutboundFrame::subscribe(models))
    }
}

/// `RECEIVE` tables may be keyed by singular or plural kind names.
fn kind_for_table(name: &str) -> Option<EntityKind> {
    EntityKind::from_str(name)
        .ok()
        .or_else(|| EntityKind::iter().find(|kind| kind.collection_key() == name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Attribute, Quality};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use telewatch_api::SubscriptionKind;

    fn bridge() -> (EventBridge, Arc<EntityCache>, Arc<LiveValueStore>) {
        let cache = Arc::new(EntityCache::new());
        let live = Arc::new(LiveValueStore::new());
        (
            EventBridge::new(Arc::clone(&cache), Arc::clone(&live)),
            cache,
            live,
        )
    }

    #[test]
    fn change_for_unknown_attribute_is_kept() {
        let (bridge, cache, live) = bridge();
        let frame = json!([{"type": "CHANGE", "data": {"nowhere/x": {"value": 7, "time": 1.0}}}]);

        let summary = bridge.handle_frame(&frame.to_string()).unwrap();
        assert_eq!(summary.values, 1);

        let id = ModelId::from("nowhere/x");
        assert!(cache.attribute(&id).is_none());
        assert_eq!(live.value(&id).unwrap().value, json!(7));
        assert_eq!(live.history(&id).unwrap().len(), 1);
    }

    #[test]
    fn events_apply_in_frame_order() {
        let (bridge, _, live) = bridge();
        let frame = json!([
            {"type": "CHANGE", "data": {"d/x": {"value": 1, "time": 1.0}}},
            {"type": "CHANGE", "data": {"d/x": {"value": 2, "time": 2.0}}},
            {"type": "CONFIG", "data": {"d/x": {"unit": "A"}}}
        ]);
        bridge.handle_frame(&frame.to_string()).unwrap();

        let id = ModelId::from("d/x");
        assert_eq!(live.value(&id).unwrap().value, json!(2));
        assert_eq!(live.history(&id).unwrap().values().collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert_eq!(live.config(&id).unwrap().unit.as_deref(), Some("A"));
    }

    #[test]
    fn entity_events_reach_the_cache() {
        let (bridge, cache, _) = bridge();
        let frame = json!([
            {"type": "ATTRIBUTE", "data": {"d/x": {"device": "d", "name": "x", "unit": "V"}}},
            {"type": "RECEIVE", "data": {
                "attributes": {"d/x": {"label": "X"}},
                "gizmos": {"g": {}}
            }}
        ]);
        let summary = bridge.handle_frame(&frame.to_string()).unwrap();
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.skipped, 1);

        let attr: Attribute = cache.get("d/x").unwrap();
        assert_eq!(attr.unit.as_deref(), Some("V"));
        assert_eq!(attr.label.as_deref(), Some("X"));
    }

    #[test]
    fn error_events_are_recorded_and_reported() {
        let (bridge, _, live) = bridge();
        let frame = json!({"type": "ERROR", "data": {"d/x": "device timed out"}});
        let summary = bridge.handle_frame(&frame.to_string()).unwrap();
        assert_eq!(
            summary.errors,
            vec![(ModelId::from("d/x"), "device timed out".to_owned())]
        );
        assert_eq!(live.error(&ModelId::from("d/x")).as_deref(), Some("device timed out"));
    }

    #[test]
    fn malformed_frame_changes_nothing_and_later_frames_still_apply() {
        let (bridge, _, live) = bridge();
        assert!(matches!(
            bridge.handle_frame("{{{"),
            Err(CoreError::MalformedFrame { .. })
        ));
        assert!(matches!(
            bridge.handle_frame(r#"{"data": {}}"#),
            Err(CoreError::MalformedFrame { .. })
        ));
        assert_eq!(live.version(), 0);

        let ok = json!({"type": "CHANGE", "data": {"d/x": {"value": 1}}});
        bridge.handle_frame(&ok.to_string()).unwrap();
        assert_eq!(live.value(&ModelId::from("d/x")).unwrap().quality, Quality::Unknown);
    }

    #[test]
    fn outbound_batches_by_direction() {
        let frames = EventBridge::outbound(&[
            SubscriptionIntent::Subscribe(ModelId::from("a/x")),
            SubscriptionIntent::Unsubscribe(ModelId::from("a/y")),
            SubscriptionIntent::Subscribe(ModelId::from("a/z")),
        ]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind, SubscriptionKind::Subscribe);
        assert_eq!(frames[0].models, vec!["a/x", "a/z"]);
        assert_eq!(frames[1].kind, SubscriptionKind::Unsubscribe);
        assert!(EventBridge::outbound(&[]).is_empty());
    }

    #[test]
    fn resubscribe_skips_empty_sets() {
        assert!(EventBridge::resubscribe(std::iter::empty()).is_none());
        let ids = [ModelId::from("a/x"), ModelId::from("a/y")];
        let frame = EventBridge::resubscribe(&ids).unwrap();
        assert_eq!(frame.models, vec!["a/x", "a/y"]);
    }
}
