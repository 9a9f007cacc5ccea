//! Output formatting utilities

use crate::error::CtlResult;
use crate::host::{ResourceOutcome, Status};
use colored::*;
use registry_token::TokenInventoryEntry;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "KIND")]
    kind: &'static str,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ACTION")]
    action: String,
    #[tabled(rename = "CHANGED")]
    changed: String,
    #[tabled(rename = "STATUS")]
    status: Status,
    #[tabled(rename = "DETAIL")]
    detail: String,
}

impl From<&ResourceOutcome> for OutcomeRow {
    fn from(outcome: &ResourceOutcome) -> Self {
        Self {
            kind: outcome.kind,
            name: outcome.name.clone(),
            action: outcome.action.clone(),
            changed: outcome.changed.join(","),
            status: outcome.status.clone(),
            detail: outcome.detail.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct InventoryRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SUBJECT")]
    subject: String,
    #[tabled(rename = "EXPIRES")]
    expire_time: String,
    #[tabled(rename = "REMAINING")]
    remaining: String,
    #[tabled(rename = "ACCESS")]
    access: String,
}

impl From<&TokenInventoryEntry> for InventoryRow {
    fn from(entry: &TokenInventoryEntry) -> Self {
        Self {
            name: entry.name.clone(),
            subject: entry.subject.clone(),
            expire_time: entry.expire_time.to_rfc3339(),
            remaining: format!("{}s", entry.ttl_remaining),
            access: entry.access.join(","),
        }
    }
}

/// Render outcomes of an apply or plan run.
pub fn render_outcomes(outcomes: &[ResourceOutcome], format: OutputFormat) -> CtlResult<String> {
    match format {
        OutputFormat::Table => Ok(table(outcomes.iter().map(OutcomeRow::from).collect())),
        OutputFormat::Json => json(outcomes),
    }
}

pub fn render_inventory(entries: &[TokenInventoryEntry], format: OutputFormat) -> CtlResult<String> {
    match format {
        OutputFormat::Table => Ok(table(entries.iter().map(InventoryRow::from).collect())),
        OutputFormat::Json => json(entries),
    }
}

fn table<T: Tabled>(rows: Vec<T>) -> String {
    if rows.is_empty() {
        "No resources".dimmed().to_string()
    } else {
        Table::new(rows).to_string()
    }
}

fn json<T: Serialize + ?Sized>(data: &T) -> CtlResult<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}
