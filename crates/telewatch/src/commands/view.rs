//! View token subcommands. Entirely offline.

use serde::Serialize;
use tabled::Tabled;

use telewatch_core::persistence;
use telewatch_core::{
    CardIndex, CardType, DashboardAction, DashboardChange, DashboardState, ModelId, ViewState,
};

use crate::cli::{CardSpec, GlobalOpts, TitleSpec, ViewArgs, ViewCommand};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct TokenOutput {
    token: String,
}

#[derive(Serialize)]
struct CardSummary {
    index: CardIndex,
    #[serde(rename = "type")]
    card_type: CardType,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    models: Vec<ModelId>,
}

#[derive(Tabled)]
struct CardRow {
    #[tabled(rename = "Card")]
    index: String,
    #[tabled(rename = "Type")]
    card_type: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Position")]
    position: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Attributes")]
    models: String,
}

fn card_row(c: &CardSummary) -> CardRow {
    CardRow {
        index: c.index.to_string(),
        card_type: c.card_type.to_string(),
        title: c.title.clone().unwrap_or_default(),
        position: format!("{},{}", c.x, c.y),
        size: format!("{}x{}", c.w, c.h),
        models: c
            .models
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn summarize(dashboard: &DashboardState) -> Vec<CardSummary> {
    dashboard
        .layout()
        .iter()
        .map(|item| CardSummary {
            index: item.index.clone(),
            card_type: dashboard.card_type(&item.index),
            title: dashboard.card_title(&item.index).map(str::to_owned),
            x: item.x,
            y: item.y,
            w: item.w,
            h: item.h,
            models: dashboard.content(&item.index).to_vec(),
        })
        .collect()
}

/// Add a card with content and title; returns its index.
fn add_card(
    dashboard: &mut DashboardState,
    card_type: CardType,
    models: Vec<ModelId>,
    title: Option<String>,
) -> CardIndex {
    let index = dashboard.next_index();
    dashboard.apply(DashboardAction::AddCard(card_type));
    if !models.is_empty() {
        dashboard.apply(DashboardAction::SetContent {
            index: index.clone(),
            models,
        });
    }
    if title.is_some() {
        dashboard.apply(DashboardAction::SetCardTitle {
            index: index.clone(),
            title,
        });
    }
    index
}

fn encode_cards(cards: Vec<CardSpec>, titles: Vec<TitleSpec>) -> Result<String, CliError> {
    let mut dashboard = DashboardState::new();
    for card in cards {
        add_card(&mut dashboard, card.card_type, card.models, None);
    }
    for TitleSpec { index, title } in titles {
        if !dashboard.view().contains(&index) {
            return Err(CliError::Validation {
                field: "title".into(),
                reason: format!("no card {index} (cards are numbered from 0)"),
            });
        }
        dashboard.apply(DashboardAction::SetCardTitle {
            index,
            title: Some(title),
        });
    }
    Ok(persistence::encode(dashboard.view())?)
}

fn load(token: &str) -> Result<DashboardState, CliError> {
    let view: ViewState = persistence::decode(token)?;
    Ok(DashboardState::from_view(view))
}

fn print_token(token: String, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(global.output, &TokenOutput { token }, |t| t.token.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub fn handle(args: ViewArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ViewCommand::Encode { cards, titles } => print_token(encode_cards(cards, titles)?, global),

        ViewCommand::Decode { token } => {
            let dashboard = load(&token)?;
            let cards = summarize(&dashboard);
            let out = output::render_list(global.output, &cards, card_row, |c| {
                let models: Vec<String> = c.models.iter().map(ToString::to_string).collect();
                format!("{} {} {}", c.index, c.card_type, models.join(","))
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ViewCommand::AddCard {
            token,
            card_type,
            models,
            title,
        } => {
            let mut dashboard = load(&token)?;
            let index = add_card(&mut dashboard, card_type, models, title);
            tracing::debug!(%index, "card added");
            print_token(persistence::encode(dashboard.view())?, global)
        }

        ViewCommand::RemoveCard { token, index } => {
            let mut dashboard = load(&token)?;
            match dashboard.apply(DashboardAction::RemoveCard(index.clone())) {
                DashboardChange::CardRemoved { .. } => {
                    print_token(persistence::encode(dashboard.view())?, global)
                }
                _ => Err(CliError::NotFound {
                    resource_type: "card".into(),
                    identifier: index.to_string(),
                }),
            }
        }
    }
}
