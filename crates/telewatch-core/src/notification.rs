// ── Non-blocking notifications ──
//
// Recoverable problems the engine reports to the UI layer instead of
// failing: dropped frames, bad view tokens, server read errors.

use serde::Serialize;
use strum::Display;

use crate::error::CoreError;
use crate::model::ModelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    /// The attribute concerned, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelId>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
            model: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
            model: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
            model: None,
        }
    }

    pub fn for_model(mut self, model: ModelId) -> Self {
        self.model = Some(model);
        self
    }
}

impl From<&CoreError> for Notification {
    fn from(err: &CoreError) -> Self {
        let level = match err {
            CoreError::MalformedToken { .. }
            | CoreError::MalformedFrame { .. }
            | CoreError::UnknownEntityReference { .. }
            | CoreError::ChannelUnavailable => NotificationLevel::Warning,
            _ => NotificationLevel::Error,
        };
        Self {
            level,
            message: err.to_string(),
            model: None,
        }
    }
}
