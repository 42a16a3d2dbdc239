// ── Wire-to-domain type conversions ──
//
// Bridges raw `telewatch_api::wire` payloads into canonical
// `telewatch_core::model` types, filling defaults for missing data.

use chrono::Utc;

use telewatch_api::wire::{ChangePayload, ConfigPayload};
use telewatch_api::{ReconnectConfig, SessionCookie, TlsMode, TransportConfig};

use crate::config::{EngineConfig, ReconnectPolicy, SessionToken, TlsVerification};
use crate::model::{AttributeConfig, AttributeValue, Quality};

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_millis() -> f64 {
    // Millisecond epoch values stay well inside f64's exact-integer range.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let millis = Utc::now().timestamp_millis() as f64;
    millis
}

impl AttributeValue {
    /// Build from a `CHANGE` payload. Wire time is epoch seconds; a missing
    /// time means "as of receipt" and takes `received_at` (epoch ms).
    pub fn from_change(payload: ChangePayload, received_at: f64) -> Self {
        Self {
            value: payload.value,
            write_value: payload.w_value,
            quality: payload
                .quality
                .map_or(Quality::Unknown, Quality::from),
            timestamp: payload.time.map_or(received_at, |secs| secs * 1000.0),
        }
    }
}

impl From<ConfigPayload> for AttributeConfig {
    fn from(p: ConfigPayload) -> Self {
        Self {
            label: p.label,
            unit: p.unit,
            format: p.format,
            description: p.description,
            data_format: p.data_format,
            data_type: p.data_type,
        }
    }
}

// ── Engine config → transport config ─────────────────────────────────

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

impl From<&SessionToken> for SessionCookie {
    fn from(session: &SessionToken) -> Self {
        Self {
            name: session.cookie_name.clone(),
            value: session.token.clone(),
        }
    }
}

impl From<&EngineConfig> for TransportConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tls: TlsMode::from(&config.tls),
            timeout: config.timeout,
            session: config.session.as_ref().map(SessionCookie::from),
        }
    }
}

impl From<&ReconnectPolicy> for ReconnectConfig {
    fn from(policy: &ReconnectPolicy) -> Self {
        Self {
            initial_delay: policy.initial_delay,
            max_delay: policy.max_delay,
            max_retries: policy.max_retries,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_time_becomes_milliseconds() {
        let payload: ChangePayload =
            serde_json::from_value(json!({"value": 1, "quality": "ATTR_VALID", "time": 12.5}))
                .unwrap();
        let value = AttributeValue::from_change(payload, 0.0);
        assert!((value.timestamp - 12_500.0).abs() < f64::EPSILON);
        assert_eq!(value.quality, Quality::Valid);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let payload: ChangePayload = serde_json::from_value(json!({"value": "ON"})).unwrap();
        let value = AttributeValue::from_change(payload, 99.0);
        assert_eq!(value.quality, Quality::Unknown);
        assert!((value.timestamp - 99.0).abs() < f64::EPSILON);
        assert!(value.write_value.is_none());
    }

    #[test]
    fn engine_config_maps_to_transport() {
        let mut config = EngineConfig::new("https://tm.example.org".parse().unwrap());
        config.tls = TlsVerification::DangerAcceptInvalid;
        config.session = Some(SessionToken::new("abc".to_owned().into()));

        let transport = TransportConfig::from(&config);
        assert!(matches!(transport.tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(transport.session.unwrap().header_value(), "session_jwt=abc");
        assert_eq!(ReconnectConfig::from(&config.reconnect).max_retries, None);
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000.0);
    }
}
