//! `watch`: run the engine and print live values until interrupted.

use std::collections::HashMap;
use std::future;
use std::sync::Arc;
use std::time::Duration;

use owo_colors::Style;
use tabled::Tabled;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use telewatch_core::view::{AttributeDisplay, PLACEHOLDER, card_views};
use telewatch_core::{
    Action, Engine, MemoryTokenSink, ModelId, Notification, NotificationLevel, TokenSink,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::commands::catalog::read_query;
use crate::config::Resolved;
use crate::error::CliError;
use crate::output::{self, paint, quality_style};
use crate::view_file::FileTokenSink;

pub async fn handle(
    args: WatchArgs,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);

    let file_sink = match (&args.view, args.view_file.clone().or(resolved.view_file)) {
        (None, Some(path)) => Some(FileTokenSink::new(path)),
        _ => None,
    };
    let token_sink: Option<Arc<dyn TokenSink>> = match (&args.view, &file_sink) {
        (Some(token), _) => Some(Arc::new(MemoryTokenSink::with_token(token.clone()))),
        (None, Some(file)) => Some(Arc::new(file.clone())),
        (None, None) => None,
    };

    let engine = Engine::new(resolved.engine);
    engine.connect(token_sink).await?;

    for model in args.model {
        engine.dispatch(Action::AddListener(model))?;
    }
    if let Some(ref raw) = args.catalog {
        let query = read_query(raw)?;
        // Rows still render with raw ids when this fails.
        if let Err(e) = engine.fetch_catalog(&query).await {
            warn!(error = %e, "catalog query failed");
        }
    }

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    background.push(tokio::spawn(report_notifications(
        engine.notifications(),
        color,
    )));
    if let Some(file) = file_sink {
        info!(path = %file.path().display(), "following view file");
        background.push(tokio::spawn(follow_view_file(
            engine.clone(),
            file,
            args.poll,
        )));
    }

    let mut printer = Printer::new(global.output, color, args.table);
    let mut values = engine.live().subscribe();
    let mut channel = engine.channel_state();

    let stop_after = async {
        match args.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => future::pending().await,
        }
    };
    tokio::pin!(stop_after);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
            () = &mut stop_after => break,
            changed = values.changed() => {
                if changed.is_err() {
                    break;
                }
                printer.render(&engine)?;
            }
            changed = channel.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *channel.borrow_and_update();
                if !global.quiet {
                    let status = format!("channel {state:?}");
                    eprintln!("{}", paint(&status, Style::new().dimmed(), color));
                }
            }
        }
    }

    for task in background {
        task.abort();
    }
    engine.shutdown().await;
    Ok(())
}

// ── Background tasks ─────────────────────────────────────────────────

async fn report_notifications(mut rx: broadcast::Receiver<Notification>, color: bool) {
    loop {
        match rx.recv().await {
            Ok(n) => {
                let style = match n.level {
                    NotificationLevel::Error => Style::new().red(),
                    NotificationLevel::Warning => Style::new().yellow(),
                    NotificationLevel::Info => Style::new().dimmed(),
                };
                let subject = n.model.as_ref().map(|m| format!(" {m}:")).unwrap_or_default();
                eprintln!(
                    "{}{subject} {}",
                    paint(&n.level.to_string(), style, color),
                    n.message
                );
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "notifications dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Poll the view file and hand edits to the engine. The engine ignores
/// the tokens it wrote itself.
async fn follow_view_file(engine: Engine, file: FileTokenSink, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = file.read().ok().flatten();
    loop {
        ticker.tick().await;
        match file.read() {
            Ok(Some(token)) if last.as_deref() != Some(token.as_str()) => {
                last = Some(token.clone());
                if engine.dispatch(Action::ExternalToken(token)).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "view file unreadable"),
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ValueRow {
    #[tabled(rename = "Attribute")]
    label: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Quality")]
    quality: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "ID")]
    id: String,
}

fn clock(row: &AttributeDisplay) -> String {
    row.time()
        .map_or_else(|| PLACEHOLDER.to_owned(), |t| t.format("%H:%M:%S%.3f").to_string())
}

fn with_unit(row: &AttributeDisplay) -> String {
    match row.unit {
        Some(ref unit) if row.value.is_some() => format!("{} {unit}", row.formatted),
        _ => row.formatted.clone(),
    }
}

fn value_row(row: &AttributeDisplay) -> ValueRow {
    ValueRow {
        label: row.label.clone(),
        value: row.error.clone().unwrap_or_else(|| with_unit(row)),
        quality: row.quality.as_str().to_owned(),
        time: clock(row),
        id: row.id.to_string(),
    }
}

/// What a printed line depends on; a line is printed when it changes.
#[derive(PartialEq)]
struct Seen {
    timestamp: Option<f64>,
    formatted: String,
    error: Option<String>,
}

struct Printer {
    format: OutputFormat,
    color: bool,
    table: bool,
    seen: HashMap<ModelId, Seen>,
}

impl Printer {
    fn new(format: OutputFormat, color: bool, table: bool) -> Self {
        Self {
            format,
            color,
            table,
            seen: HashMap::new(),
        }
    }

    fn render(&mut self, engine: &Engine) -> Result<(), CliError> {
        if self.table {
            self.render_cards(engine)
        } else {
            self.render_changes(engine)
        }
    }

    /// One line per attribute whose value, time or error moved.
    fn render_changes(&mut self, engine: &Engine) -> Result<(), CliError> {
        let listeners = engine.listeners();
        for id in &*listeners {
            let row = AttributeDisplay::resolve(id, engine.cache(), engine.live());
            let seen = Seen {
                timestamp: row.timestamp,
                formatted: row.formatted.clone(),
                error: row.error.clone(),
            };
            if self.seen.get(id) == Some(&seen) {
                continue;
            }
            self.seen.insert(id.clone(), seen);
            println!("{}", self.line(&row)?);
        }
        Ok(())
    }

    fn line(&self, row: &AttributeDisplay) -> Result<String, CliError> {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
                output::render_single(OutputFormat::JsonCompact, row, |_| String::new())
            }
            OutputFormat::Plain => Ok(format!("{} {} {}", clock(row), row.id, row.formatted)),
            OutputFormat::Table => {
                let value = match row.error {
                    Some(ref e) => paint(e, Style::new().red(), self.color),
                    None => paint(&with_unit(row), quality_style(&row.quality), self.color),
                };
                Ok(format!(
                    "{} {} {value}",
                    paint(&clock(row), Style::new().dimmed(), self.color),
                    row.label
                ))
            }
        }
    }

    /// Redraw every card.
    fn render_cards(&self, engine: &Engine) -> Result<(), CliError> {
        let cards = card_views(&engine.dashboard(), engine.cache(), engine.live());
        match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
                println!(
                    "{}",
                    output::render_single(OutputFormat::JsonCompact, &cards, |_| String::new())?
                );
            }
            OutputFormat::Table | OutputFormat::Plain => {
                for card in &cards {
                    let heading = format!(
                        "[{}] {}",
                        card.index,
                        card.title.clone().unwrap_or_else(|| card.card_type.to_string())
                    );
                    println!("{}", paint(&heading, Style::new().bold(), self.color));
                    println!(
                        "{}",
                        output::render_list(self.format, &card.rows, value_row, |r| {
                            format!("{} {}", r.id, r.formatted)
                        })?
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use telewatch_core::{AttributeValue, EntityCache, LiveValueStore, Quality};

    fn display(value: serde_json::Value, unit: Option<&str>) -> AttributeDisplay {
        let cache = EntityCache::new();
        let live = LiveValueStore::new();
        let id = ModelId::from("sys/tg/1/ampliquad");
        live.apply_value_update([(
            id.clone(),
            AttributeValue {
                value,
                write_value: None,
                quality: Quality::Valid,
                timestamp: 1_700_000_000_000.0,
            },
        )]);
        let mut row = AttributeDisplay::resolve(&id, &cache, &live);
        row.unit = unit.map(str::to_owned);
        row
    }

    #[test]
    fn unit_follows_present_values_only() {
        assert_eq!(with_unit(&display(json!(4.5), Some("V"))), "4.5 V");
        let mut empty = display(json!(4.5), Some("V"));
        empty.value = None;
        empty.formatted = PLACEHOLDER.to_owned();
        assert_eq!(with_unit(&empty), "-");
    }

    #[test]
    fn plain_line_carries_id_and_value() {
        let printer = Printer::new(OutputFormat::Plain, false, false);
        let line = printer.line(&display(json!(7), None)).unwrap();
        assert!(line.ends_with("sys/tg/1/ampliquad 7"), "{line}");
    }

    #[test]
    fn json_line_is_single_line() {
        let printer = Printer::new(OutputFormat::Json, false, false);
        let line = printer.line(&display(json!(7), None)).unwrap();
        assert!(!line.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["id"], "sys/tg/1/ampliquad");
    }
}
