//! Output formatting for CLI commands.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use warden_reconcile::{Attributes, Diagnostics, Schema, Severity};

/// Placeholder shown instead of a sensitive value.
pub const SENSITIVE: &str = "(sensitive)";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", to_json(&data)),
    }
}

/// Print a single value as JSON.
pub fn print_json<T: Serialize + ?Sized>(data: &T) {
    println!("{}", to_json(data));
}

fn to_json<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print diagnostics to stderr, colored by severity.
pub fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        let label = match diagnostic.severity {
            Severity::Warning => "Warning:".yellow().bold(),
            Severity::Error => "Error:".red().bold(),
        };
        let subject = match &diagnostic.attribute {
            Some(attribute) => format!("{} ({attribute})", diagnostic.summary),
            None => diagnostic.summary.clone(),
        };
        eprintln!("{label} {subject}");
        if !diagnostic.detail.is_empty() {
            eprintln!("  {}", diagnostic.detail.dimmed());
        }
    }
}

/// One attribute of a record.
#[derive(Debug, Serialize, Tabled)]
pub struct AttributeRow {
    #[tabled(rename = "Attribute")]
    pub name: String,

    #[tabled(rename = "Value")]
    pub value: String,
}

/// Copy of `attributes` with non-empty sensitive values replaced.
pub fn mask_sensitive(schema: &Schema, attributes: &Attributes) -> Attributes {
    attributes
        .iter()
        .map(|(name, value)| {
            let sensitive = schema.attribute(name).is_some_and(|spec| spec.sensitive);
            if sensitive && !value.is_empty() {
                (name, SENSITIVE)
            } else {
                (name, value)
            }
        })
        .collect()
}

pub fn attribute_rows(attributes: &Attributes) -> Vec<AttributeRow> {
    attributes
        .iter()
        .map(|(name, value)| AttributeRow {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}
