// ── Live value types ──

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum samples kept per attribute history.
pub const HISTORY_CAPACITY: usize = 1000;

/// Read quality reported with every value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Quality {
    Valid,
    Invalid,
    Alarm,
    Changing,
    Warning,
    #[default]
    Unknown,
    /// Anything the server sends that we don't recognize, kept verbatim.
    Other(String),
}

impl Quality {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid => "ATTR_VALID",
            Self::Invalid => "ATTR_INVALID",
            Self::Alarm => "ATTR_ALARM",
            Self::Changing => "ATTR_CHANGING",
            Self::Warning => "ATTR_WARNING",
            Self::Unknown => "UNKNOWN",
            Self::Other(s) => s,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl From<&str> for Quality {
    fn from(s: &str) -> Self {
        match s {
            "ATTR_VALID" | "VALID" => Self::Valid,
            "ATTR_INVALID" | "INVALID" => Self::Invalid,
            "ATTR_ALARM" | "ALARM" => Self::Alarm,
            "ATTR_CHANGING" | "CHANGING" => Self::Changing,
            "ATTR_WARNING" | "WARNING" => Self::Warning,
            "" | "UNKNOWN" => Self::Unknown,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for Quality {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Quality> for String {
    fn from(q: Quality) -> Self {
        q.as_str().to_owned()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest sample for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: Value,
    /// Set-point, for writable attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_value: Option<Value>,
    pub quality: Quality,
    /// Milliseconds since the Unix epoch.
    pub timestamp: f64,
}

impl AttributeValue {
    /// The value as a history sample: numbers as-is, booleans as 0/1.
    pub fn numeric(&self) -> Option<f64> {
        match &self.value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Bounded FIFO of `(time, value)` samples.
///
/// `times` and `values` always have the same length, at most
/// [`HISTORY_CAPACITY`]; the oldest sample is evicted first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeHistory {
    times: VecDeque<f64>,
    values: VecDeque<f64>,
}

impl AttributeHistory {
    pub fn push(&mut self, time: f64, value: f64) {
        self.times.push_back(time);
        self.values.push_back(value);
        while self.times.len() > HISTORY_CAPACITY {
            self.times.pop_front();
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.times.iter().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Samples oldest-first.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times().zip(self.values())
    }

    pub fn last(&self) -> Option<(f64, f64)> {
        Some((*self.times.back()?, *self.values.back()?))
    }
}

/// Static display metadata for one attribute. Every field is optional and
/// merged field-by-field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl AttributeConfig {
    /// Overwrite every field present in `incoming`; keep the rest.
    pub fn merge(&mut self, incoming: Self) {
        fn take(slot: &mut Option<String>, incoming: Option<String>) {
            if incoming.is_some() {
                *slot = incoming;
            }
        }
        take(&mut self.label, incoming.label);
        take(&mut self.unit, incoming.unit);
        take(&mut self.format, incoming.format);
        take(&mut self.description, incoming.description);
        take(&mut self.data_format, incoming.data_format);
        take(&mut self.data_type, incoming.data_type);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quality_parses_wire_strings() {
        assert_eq!(Quality::from("ATTR_VALID"), Quality::Valid);
        assert_eq!(Quality::from("ATTR_ALARM"), Quality::Alarm);
        assert_eq!(Quality::from(""), Quality::Unknown);
        assert_eq!(Quality::from("ATTR_ODD").as_str(), "ATTR_ODD");
        assert_eq!(serde_json::to_value(Quality::Warning).unwrap(), json!("ATTR_WARNING"));
    }

    #[test]
    fn numeric_samples() {
        let mut v = AttributeValue {
            value: json!(2.5),
            write_value: None,
            quality: Quality::Valid,
            timestamp: 0.0,
        };
        assert_eq!(v.numeric(), Some(2.5));
        v.value = json!(true);
        assert_eq!(v.numeric(), Some(1.0));
        v.value = json!("ON");
        assert_eq!(v.numeric(), None);
    }

    #[test]
    fn history_evicts_oldest() {
        let mut history = AttributeHistory::default();
        for i in 0..(HISTORY_CAPACITY + 5) {
            let t = f64::from(u32::try_from(i).unwrap());
            history.push(t, t * 2.0);
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.samples().next(), Some((5.0, 10.0)));
        assert_eq!(history.last(), Some((1004.0, 2008.0)));
    }

    #[test]
    fn config_merge_keeps_absent_fields() {
        let mut config = AttributeConfig {
            label: Some("Old".into()),
            unit: Some("V".into()),
            ..AttributeConfig::default()
        };
        config.merge(AttributeConfig {
            label: Some("New".into()),
            ..AttributeConfig::default()
        });
        assert_eq!(config.label.as_deref(), Some("New"));
        assert_eq!(config.unit.as_deref(), Some("V"));
    }
}
