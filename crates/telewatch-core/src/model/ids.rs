// ── Core identity types ──
//
// ModelId and CardIndex are the two keys everything else hangs off:
// attribute references (`device/name`) and dashboard card slots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── ModelId ─────────────────────────────────────────────────────────

/// Canonical attribute reference, `device/attributeName`.
///
/// The device part itself contains slashes (`domain/family/member`), so the
/// attribute name is everything after the *last* slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(device: &str, name: &str) -> Self {
        Self(format!("{device}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The device part, or `""` when the id has no slash.
    pub fn device(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(device, _)| device)
    }

    /// The attribute-name part (the whole id when it has no slash).
    pub fn name(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── CardIndex ───────────────────────────────────────────────────────

/// Dashboard card slot. Issued as decimal strings (`"0"`, `"1"`, ...);
/// tokens from elsewhere may carry arbitrary strings, which are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardIndex(String);

impl CardIndex {
    pub fn from_number(n: u64) -> Self {
        Self(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, if the index is a plain decimal.
    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for CardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CardIndex {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<&str> for CardIndex {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<u64> for CardIndex {
    fn from(n: u64) -> Self {
        Self::from_number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_id_splits_on_last_slash() {
        let id = ModelId::from("sys/tg_test/1/ampli");
        assert_eq!(id.device(), "sys/tg_test/1");
        assert_eq!(id.name(), "ampli");
        assert_eq!(ModelId::new("sys/tg_test/1", "ampli"), id);
    }

    #[test]
    fn model_id_without_slash() {
        let id = ModelId::from("ampli");
        assert_eq!(id.device(), "");
        assert_eq!(id.name(), "ampli");
    }

    #[test]
    fn card_index_numbers() {
        assert_eq!(CardIndex::from_number(7).as_str(), "7");
        assert_eq!(CardIndex::from("12").as_number(), Some(12));
        assert_eq!(CardIndex::from("main").as_number(), None);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&(ModelId::from("a/b"), CardIndex::from(3))).ok();
        assert_eq!(json.as_deref(), Some(r#"["a/b","3"]"#));
    }
}
