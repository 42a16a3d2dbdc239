// ── Rendering-boundary views ──
//
// Read-only projections combining catalog records and live values into
// rows a renderer can show as-is. Nothing here fails: missing catalog
// records, values or configs degrade to placeholders.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::cache::EntityCache;
use crate::dashboard::DashboardState;
use crate::live::LiveValueStore;
use crate::model::{Attribute, CardIndex, CardType, LayoutItem, ModelId, Quality};

/// Shown where a value is missing.
pub const PLACEHOLDER: &str = "-";

/// One attribute, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDisplay {
    pub id: ModelId,
    pub label: String,
    pub value: Option<Value>,
    /// `value` rendered with the attribute's format, or [`PLACEHOLDER`].
    pub formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub quality: Quality,
    /// Sample time, epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the catalog knows this attribute.
    pub known: bool,
    pub samples: usize,
}

impl AttributeDisplay {
    pub fn resolve(id: &ModelId, cache: &EntityCache, live: &LiveValueStore) -> Self {
        let attribute = match cache.require::<Attribute>(id.as_str()) {
            Ok(attribute) => Some(attribute),
            Err(e) => {
                trace!(error = %e, "rendering placeholder");
                None
            }
        };
        let config = live.config(id).unwrap_or_default();
        let latest = live.value(id);

        let label = config
            .label
            .clone()
            .or_else(|| attribute.as_ref().and_then(|a| a.label.clone()))
            .filter(|l| !l.is_empty())
            .or_else(|| attribute.as_ref().map(|a| a.name.clone()))
            .unwrap_or_else(|| id.name().to_owned());
        let unit = config
            .unit
            .clone()
            .or_else(|| attribute.as_ref().and_then(|a| a.unit.clone()))
            .filter(|u| !u.is_empty());
        let format = config.format.as_deref();

        Self {
            id: id.clone(),
            label,
            formatted: latest
                .as_ref()
                .map_or_else(|| PLACEHOLDER.to_owned(), |v| format_value(&v.value, format)),
            value: latest.as_ref().map(|v| v.value.clone()),
            write_value: latest.as_ref().and_then(|v| v.write_value.clone()),
            unit,
            quality: latest
                .as_ref()
                .map_or(Quality::Unknown, |v| v.quality.clone()),
            timestamp: latest.as_ref().map(|v| v.timestamp),
            error: live.error(id),
            known: attribute.is_some(),
            samples: live.history(id).map_or(0, |h| h.len()),
        }
    }

    /// Sample time as UTC, when there is one.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        // Sub-millisecond precision is not carried.
        #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
        let millis = self.timestamp?.round() as i64;
        DateTime::from_timestamp_millis(millis)
    }
}

/// One card, its rows resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub index: CardIndex,
    pub card_type: CardType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub geometry: LayoutItem,
    pub rows: Vec<AttributeDisplay>,
}

/// Every card, in layout order.
pub fn card_views(
    dashboard: &DashboardState,
    cache: &EntityCache,
    live: &LiveValueStore,
) -> Vec<CardView> {
    dashboard
        .layout()
        .iter()
        .map(|item| CardView {
            index: item.index.clone(),
            card_type: dashboard.card_type(&item.index),
            title: dashboard.card_title(&item.index).map(str::to_owned),
            geometry: item.clone(),
            rows: dashboard
                .content(&item.index)
                .iter()
                .map(|id| AttributeDisplay::resolve(id, cache, live))
                .collect(),
        })
        .collect()
}

/// Render a value with a printf-style attribute format (`%6.3f`, `%d`,
/// `%e`). Non-numeric values and unknown formats render plainly.
pub fn format_value(value: &Value, format: Option<&str>) -> String {
    match value {
        Value::Null => PLACEHOLDER.to_owned(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_f64(), format.and_then(NumberFormat::parse)) {
            (Some(x), Some(spec)) => spec.render(x),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Digits past the point an `f64` can carry; larger precisions are clamped.
const MAX_PRECISION: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberFormat {
    Fixed(Option<usize>),
    Exponent(Option<usize>),
    Integer,
}

impl NumberFormat {
    fn parse(format: &str) -> Option<Self> {
        let body = format.trim().strip_prefix('%')?;
        let conversion = body.chars().next_back()?;
        let flags = &body[..body.len() - conversion.len_utf8()];
        let precision = flags
            .split_once('.')
            .and_then(|(_, p)| p.parse::<usize>().ok())
            .map(|p| p.min(MAX_PRECISION));
        match conversion {
            'f' | 'F' => Some(Self::Fixed(precision)),
            'e' | 'E' => Some(Self::Exponent(precision)),
            'd' | 'i' => Some(Self::Integer),
            _ => None,
        }
    }

    fn render(self, x: f64) -> String {
        match self {
            Self::Fixed(Some(p)) => format!("{x:.p$}"),
            Self::Fixed(None) => format!("{x:.6}"),
            Self::Exponent(Some(p)) => format!("{x:.p$e}"),
            Self::Exponent(None) => format!("{x:e}"),
            Self::Integer => format!("{:.0}", x.trunc()),
        }
    }
}
