//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::Table;
use docshift_core::migration::{ChangeEntry, IndexStatus};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Lock and ledger summary shown by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub database: String,
    pub lock_collection: String,
    pub lock_held: bool,
    pub installed: usize,
    pub failed: usize,
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format change log entries.
    fn format_entries(&self, entries: &[ChangeEntry]) -> String;

    /// Format the status summary.
    fn format_status(&self, status: &StatusSummary) -> String;

    /// Format the outcome of index repair for each collection.
    fn format_indexes(&self, indexes: &[(String, IndexStatus)]) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

const ENTRY_COLUMNS: [&str; 7] = [
    "changeId",
    "author",
    "timestamp",
    "changeLogClass",
    "changeSetMethod",
    "status",
    "error",
];

fn entry_row(entry: &ChangeEntry) -> Vec<String> {
    vec![
        entry.change_id.clone(),
        entry.author.clone(),
        entry.timestamp.to_rfc3339(),
        entry.change_log.clone(),
        entry.method.clone(),
        entry.status.to_string(),
        entry.error.clone().unwrap_or_default(),
    ]
}

fn index_status_name(status: IndexStatus) -> &'static str {
    match status {
        IndexStatus::Present => "present",
        IndexStatus::Created => "created",
        IndexStatus::Recreated => "recreated",
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_entries(&self, entries: &[ChangeEntry]) -> String {
        if entries.is_empty() {
            return "No change log entries".to_string();
        }

        let mut table = Table::new();
        table.set_header(ENTRY_COLUMNS.to_vec());
        for entry in entries {
            table.add_row(entry_row(entry));
        }
        table.to_string()
    }

    fn format_status(&self, status: &StatusSummary) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Property", "Value"]);
        table.add_row(vec!["database".to_string(), status.database.clone()]);
        table.add_row(vec![
            "lock".to_string(),
            if status.lock_held { "held" } else { "free" }.to_string(),
        ]);
        table.add_row(vec![
            "lock collection".to_string(),
            status.lock_collection.clone(),
        ]);
        table.add_row(vec!["installed".to_string(), status.installed.to_string()]);
        table.add_row(vec!["failed".to_string(), status.failed.to_string()]);
        table.to_string()
    }

    fn format_indexes(&self, indexes: &[(String, IndexStatus)]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Collection", "Index"]);
        for (collection, status) in indexes {
            table.add_row(vec![collection.as_str(), index_status_name(*status)]);
        }
        table.to_string()
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_entries(&self, entries: &[ChangeEntry]) -> String {
        serde_json::to_string_pretty(entries).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_status(&self, status: &StatusSummary) -> String {
        serde_json::json!({
            "database": status.database,
            "lockCollection": status.lock_collection,
            "lockHeld": status.lock_held,
            "installed": status.installed,
            "failed": status.failed,
        })
        .to_string()
    }

    fn format_indexes(&self, indexes: &[(String, IndexStatus)]) -> String {
        let obj: serde_json::Map<String, serde_json::Value> = indexes
            .iter()
            .map(|(collection, status)| {
                (
                    collection.clone(),
                    serde_json::Value::from(index_status_name(*status)),
                )
            })
            .collect();
        serde_json::Value::Object(obj).to_string()
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_entries(&self, entries: &[ChangeEntry]) -> String {
        let mut lines = vec![ENTRY_COLUMNS.join(",")];
        for entry in entries {
            let cells: Vec<String> = entry_row(entry)
                .iter()
                .map(|cell| format!("\"{}\"", escape_csv(cell)))
                .collect();
            lines.push(cells.join(","));
        }
        lines.join("\n")
    }

    fn format_status(&self, status: &StatusSummary) -> String {
        format!(
            "database,lock_collection,lock_held,installed,failed\n\"{}\",\"{}\",{},{},{}",
            escape_csv(&status.database),
            escape_csv(&status.lock_collection),
            status.lock_held,
            status.installed,
            status.failed
        )
    }

    fn format_indexes(&self, indexes: &[(String, IndexStatus)]) -> String {
        let mut lines = vec!["collection,index".to_string()];
        for (collection, status) in indexes {
            lines.push(format!(
                "\"{}\",{}",
                escape_csv(collection),
                index_status_name(*status)
            ));
        }
        lines.join("\n")
    }

    fn format_message(&self, message: &str) -> String {
        format!("message\n\"{}\"", escape_csv(message))
    }
}

fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}
