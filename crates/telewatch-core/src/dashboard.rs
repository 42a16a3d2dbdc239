// ── Dashboard state ──
//
// Card layout, per-card content, type and title. Every mutation is a
// `DashboardAction` applied by `DashboardState::apply`, which reports what
// changed so the caller can derive subscription work from it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{CardIndex, CardType, LayoutItem, ModelId};

// ── ViewState ────────────────────────────────────────────────────────

/// The persisted part of a dashboard: exactly what a view token carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub layout: Vec<LayoutItem>,
    pub content: BTreeMap<CardIndex, Vec<ModelId>>,
    #[serde(rename = "cardType")]
    pub card_type: BTreeMap<CardIndex, CardType>,
    #[serde(rename = "cardTitle")]
    pub card_title: BTreeMap<CardIndex, String>,
}

impl ViewState {
    /// Drop duplicate layout entries (first wins) and any content, type or
    /// title whose index has no layout entry.
    pub fn normalized(mut self) -> Self {
        let mut seen = BTreeSet::new();
        self.layout.retain(|item| seen.insert(item.index.clone()));
        self.content.retain(|index, _| seen.contains(index));
        self.card_type.retain(|index, _| seen.contains(index));
        self.card_title.retain(|index, _| seen.contains(index));
        self
    }

    pub fn contains(&self, index: &CardIndex) -> bool {
        self.layout.iter().any(|item| &item.index == index)
    }

    /// Card type, `LIST` when none is recorded.
    pub fn card_type(&self, index: &CardIndex) -> CardType {
        self.card_type.get(index).copied().unwrap_or_default()
    }

    pub fn content(&self, index: &CardIndex) -> &[ModelId] {
        self.content.get(index).map_or(&[], Vec::as_slice)
    }

    /// Every model id referenced by any card.
    pub fn referenced_models(&self) -> BTreeSet<ModelId> {
        self.content.values().flatten().cloned().collect()
    }

    /// Whether any card other than `except` references `id`.
    pub fn is_used(&self, id: &ModelId, except: Option<&CardIndex>) -> bool {
        self.content
            .iter()
            .filter(|(index, _)| Some(*index) != except)
            .any(|(_, models)| models.contains(id))
    }

    /// Largest numeric card index.
    pub fn max_index(&self) -> Option<u64> {
        self.layout.iter().filter_map(|item| item.index.as_number()).max()
    }
}

// ── Actions and changes ──────────────────────────────────────────────

/// Every dashboard mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardAction {
    /// Replace the layout wholesale. Cards it omits are dropped with
    /// their content, type and title.
    SetLayout(Vec<LayoutItem>),
    AddCard(CardType),
    RemoveCard(CardIndex),
    SetContent {
        index: CardIndex,
        models: Vec<ModelId>,
    },
    SetCardType {
        index: CardIndex,
        card_type: CardType,
    },
    /// `None` (or an empty title) clears it.
    SetCardTitle {
        index: CardIndex,
        title: Option<String>,
    },
    /// Replace the whole dashboard, e.g. from a decoded view token.
    Restore(ViewState),
}

/// What an applied action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardChange {
    /// No-op: unknown index or identical state.
    Unchanged,
    /// The layout was replaced; `content` is what the `dropped` cards showed.
    Layout {
        dropped: Vec<CardIndex>,
        content: BTreeSet<ModelId>,
    },
    CardAdded(CardIndex),
    CardRemoved {
        index: CardIndex,
        content: Vec<ModelId>,
    },
    ContentReplaced {
        index: CardIndex,
        old: Vec<ModelId>,
        new: Vec<ModelId>,
    },
    Metadata,
    Restored {
        old: BTreeSet<ModelId>,
        new: BTreeSet<ModelId>,
    },
}

impl DashboardChange {
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

// ── DashboardState ───────────────────────────────────────────────────

/// The live dashboard: a [`ViewState`] plus the session's card-index
/// high-water mark, so a removed index is never issued again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardState {
    view: ViewState,
    next_index: u64,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_view(view: ViewState) -> Self {
        let view = view.normalized();
        let next_index = view.max_index().map_or(0, |max| max.saturating_add(1));
        Self { view, next_index }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// The index the next `AddCard` will receive.
    pub fn next_index(&self) -> CardIndex {
        CardIndex::from_number(self.next_index)
    }

    pub fn layout(&self) -> &[LayoutItem] {
        &self.view.layout
    }

    pub fn content(&self, index: &CardIndex) -> &[ModelId] {
        self.view.content(index)
    }

    pub fn card_type(&self, index: &CardIndex) -> CardType {
        self.view.card_type(index)
    }

    pub fn card_title(&self, index: &CardIndex) -> Option<&str> {
        self.view.card_title.get(index).map(String::as_str)
    }

    pub fn is_used(&self, id: &ModelId, except: Option<&CardIndex>) -> bool {
        self.view.is_used(id, except)
    }

    /// Apply one action. Actions naming an index that has no card are
    /// no-ops.
    pub fn apply(&mut self, action: DashboardAction) -> DashboardChange {
        match action {
            DashboardAction::SetLayout(layout) => self.set_layout(layout),
            DashboardAction::AddCard(card_type) => self.add_card(card_type),
            DashboardAction::RemoveCard(index) => self.remove_card(&index),
            DashboardAction::SetContent { index, models } => self.set_content(index, models),
            DashboardAction::SetCardType { index, card_type } => {
                if !self.view.contains(&index) || self.view.card_type.get(&index) == Some(&card_type)
                {
                    return DashboardChange::Unchanged;
                }
                self.view.card_type.insert(index, card_type);
                DashboardChange::Metadata
            }
            DashboardAction::SetCardTitle { index, title } => self.set_card_title(index, title),
            DashboardAction::Restore(view) => self.restore(view),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn set_layout(&mut self, layout: Vec<LayoutItem>) -> DashboardChange {
        let mut placed = BTreeSet::new();
        let layout: Vec<LayoutItem> = layout
            .into_iter()
            .filter(|item| placed.insert(item.index.clone()))
            .collect();
        if layout == self.view.layout {
            return DashboardChange::Unchanged;
        }

        let dropped: Vec<CardIndex> = self
            .view
            .layout
            .iter()
            .map(|item| item.index.clone())
            .filter(|index| !placed.contains(index))
            .collect();
        let mut content = BTreeSet::new();
        for index in &dropped {
            self.view.card_type.remove(index);
            self.view.card_title.remove(index);
            content.extend(self.view.content.remove(index).unwrap_or_default());
        }
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "layout dropped cards");
        }

        self.view.layout = layout;
        if let Some(max) = self.view.max_index() {
            self.next_index = self.next_index.max(max.saturating_add(1));
        }
        DashboardChange::Layout { dropped, content }
    }

    fn add_card(&mut self, card_type: CardType) -> DashboardChange {
        let index = CardIndex::from_number(self.next_index);
        self.next_index = self.next_index.saturating_add(1);

        self.view.layout.push(LayoutItem::new_card(index.clone(), card_type));
        self.view.card_type.insert(index.clone(), card_type);
        DashboardChange::CardAdded(index)
    }

    fn remove_card(&mut self, index: &CardIndex) -> DashboardChange {
        let Some(position) = self.view.layout.iter().position(|item| &item.index == index) else {
            return DashboardChange::Unchanged;
        };
        self.view.layout.remove(position);
        self.view.card_type.remove(index);
        self.view.card_title.remove(index);
        let content = self.view.content.remove(index).unwrap_or_default();
        DashboardChange::CardRemoved {
            index: index.clone(),
            content,
        }
    }

    fn set_content(&mut self, index: CardIndex, models: Vec<ModelId>) -> DashboardChange {
        if !self.view.contains(&index) {
            return DashboardChange::Unchanged;
        }
        let old = self.view.content.insert(index.clone(), models.clone()).unwrap_or_default();
        if old == models {
            return DashboardChange::Unchanged;
        }
        DashboardChange::ContentReplaced {
            index,
            old,
            new: models,
        }
    }

    fn set_card_title(&mut self, index: CardIndex, title: Option<String>) -> DashboardChange {
        if !self.view.contains(&index) {
            return DashboardChange::Unchanged;
        }
        let title = title.filter(|t| !t.is_empty());
        if self.view.card_title.get(&index) == title.as_ref() {
            return DashboardChange::Unchanged;
        }
        match title {
            Some(title) => {
                self.view.card_title.insert(index, title);
            }
            None => {
                self.view.card_title.remove(&index);
            }
        }
        DashboardChange::Metadata
    }

    fn restore(&mut self, view: ViewState) -> DashboardChange {
        let view = view.normalized();
        if view == self.view {
            return DashboardChange::Unchanged;
        }
        let old = self.view.referenced_models();
        let new = view.referenced_models();
        let restored_next = view.max_index().map_or(0, |max| max.saturating_add(1));
        self.next_index = self.next_index.max(restored_next);
        self.view = view;
        DashboardChange::Restored { old, new }
    }
}
