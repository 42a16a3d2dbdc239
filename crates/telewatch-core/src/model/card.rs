// ── Dashboard card types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ids::CardIndex;

/// How a card presents its attributes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum CardType {
    /// Label / value / unit rows.
    #[default]
    #[serde(rename = "LIST")]
    #[strum(to_string = "LIST")]
    List,
    /// Time-series plot of the attribute histories.
    #[serde(rename = "TREND", alias = "PLOT")]
    #[strum(to_string = "TREND", serialize = "PLOT")]
    Trend,
}

impl CardType {
    /// Default `(w, h)` grid footprint for a new card.
    pub fn default_size(self) -> (u32, u32) {
        match self {
            Self::List => (3, 2),
            Self::Trend => (6, 5),
        }
    }
}

/// Grid column of a freshly added card.
pub const NEW_CARD_X: u32 = 0;
/// Grid row of a freshly added card (below everything, the grid compacts it).
pub const NEW_CARD_Y: u32 = 100;

/// Geometry of one card on the dashboard grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutItem {
    #[serde(rename = "i")]
    pub index: CardIndex,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    #[serde(default = "one")]
    pub w: u32,
    #[serde(default = "one")]
    pub h: u32,
}

fn one() -> u32 {
    1
}

impl LayoutItem {
    /// Default placement for a new card of `card_type`.
    pub fn new_card(index: CardIndex, card_type: CardType) -> Self {
        let (w, h) = card_type.default_size();
        Self {
            index,
            x: NEW_CARD_X,
            y: NEW_CARD_Y,
            w,
            h,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn card_type_accepts_plot_alias() {
        let ty: CardType = serde_json::from_value(json!("PLOT")).unwrap();
        assert_eq!(ty, CardType::Trend);
        assert_eq!(serde_json::to_value(ty).unwrap(), json!("TREND"));
        assert_eq!(CardType::from_str("plot").unwrap(), CardType::Trend);
        assert_eq!(CardType::from_str("list").unwrap(), CardType::List);
        assert_eq!(CardType::Trend.to_string(), "TREND");
    }

    #[test]
    fn list_cards_are_smaller_than_trends() {
        let (lw, lh) = CardType::List.default_size();
        let (tw, th) = CardType::Trend.default_size();
        assert!(lw * lh < tw * th);
    }

    #[test]
    fn layout_item_uses_short_index_key() {
        let item = LayoutItem::new_card(CardIndex::from(4), CardType::List);
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"i": "4", "x": 0, "y": 100, "w": 3, "h": 2})
        );
    }
}
