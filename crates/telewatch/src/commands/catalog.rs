//! Catalog query: run it, normalize the response, list the tables.

use std::io::Read;

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use telewatch_api::{CatalogClient, TransportConfig};
use telewatch_core::{EntityCache, EntityKind, EntitySchema};

use crate::cli::{CatalogArgs, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

/// Scalar fields shown in the table view.
const SUMMARY_FIELDS: usize = 4;

#[derive(Serialize)]
struct EntityEntry {
    kind: EntityKind,
    id: String,
    record: Value,
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

fn entity_row(e: &EntityEntry) -> EntityRow {
    let fields = e
        .record
        .as_object()
        .map(|record| {
            record
                .iter()
                .filter_map(|(key, value)| match value {
                    Value::String(s) => Some(format!("{key}={s}")),
                    Value::Number(_) | Value::Bool(_) => Some(format!("{key}={value}")),
                    Value::Array(items) => Some(format!("{key}=[{}]", items.len())),
                    Value::Null | Value::Object(_) => None,
                })
                .take(SUMMARY_FIELDS)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    EntityRow {
        kind: e.kind.to_string(),
        id: e.id.clone(),
        fields,
    }
}

/// The query text: inline, `@FILE`, or `-` for stdin.
pub(crate) fn read_query(raw: &str) -> Result<String, CliError> {
    if raw == "-" {
        let mut query = String::new();
        std::io::stdin().read_to_string(&mut query)?;
        Ok(query)
    } else if let Some(path) = raw.strip_prefix('@') {
        Ok(std::fs::read_to_string(path)?)
    } else {
        Ok(raw.to_owned())
    }
}

pub async fn handle(
    args: CatalogArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let schema = EntitySchema::catalog();
    let only = args
        .kind
        .as_deref()
        .map(|k| {
            schema
                .for_key(&k.to_ascii_lowercase())
                .map(|d| d.kind)
                .ok_or_else(|| CliError::Validation {
                    field: "kind".into(),
                    reason: format!(
                        "unknown entity kind '{k}' (domain, family, member, device, attribute, property)"
                    ),
                })
        })
        .transpose()?;

    let query = read_query(&args.query)?;
    let config = &resolved.engine;
    let client = CatalogClient::new(config.catalog_url()?, &TransportConfig::from(config))?;
    tracing::debug!(endpoint = %client.endpoint(), "running catalog query");
    let response = client.query(&query).await?;

    let cache = EntityCache::new();
    let summary = cache.merge_response(&response, &schema);
    tracing::info!(records = summary.total(), "catalog normalized");

    let entries: Vec<EntityEntry> = summary
        .merged
        .keys()
        .filter(|kind| only.is_none_or(|only| only == **kind))
        .flat_map(|&kind| {
            cache
                .snapshot(kind)
                .iter()
                .map(|(id, record)| EntityEntry {
                    kind,
                    id: id.clone(),
                    record: Value::Object((**record).clone()),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let out = output::render_list(global.output, &entries, entity_row, |e| e.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
