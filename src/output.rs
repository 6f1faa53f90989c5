// Output rendering: aligned table, JSON array or CSV file.
//
// Records are turned into JSON objects first so every format sees the same
// field names in the same order.

use crate::error::{BwmError, Result};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

/// A fully resolved row handed to the renderer.
pub trait Record: Serialize {
    /// Columns used when there are no rows to derive them from.
    const COLUMNS: &'static [&'static str];
}

/// Render `records` and return the text to print on stdout.
pub fn render<R: Record>(
    records: &[R],
    format: OutputFormat,
    csv_path: Option<&Path>,
) -> Result<String> {
    let rows = to_rows(records)?;
    let columns = columns_for(&rows, R::COLUMNS);
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&rows)
            .map_err(|e| BwmError::validation(format!("Failed to encode JSON output: {e}"))),
        OutputFormat::Table => Ok(render_table(&columns, &rows)),
        OutputFormat::Csv => {
            let path = csv_path.ok_or_else(|| {
                BwmError::validation("--csv-path is required when --output=csv")
            })?;
            fs::write(path, render_csv(&columns, &rows)).map_err(|e| {
                BwmError::validation(format!("Cannot write CSV to {}: {e}", path.display()))
            })?;
            info!(path = %path.display(), rows = rows.len(), "wrote CSV");
            Ok(format!("Wrote {} row(s) to {}", rows.len(), path.display()))
        }
    }
}

fn to_rows<R: Serialize>(records: &[R]) -> Result<Vec<Map<String, Value>>> {
    records
        .iter()
        .map(|r| match serde_json::to_value(r) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Ok(map)
            }
            Err(e) => Err(BwmError::validation(format!("Failed to encode record: {e}"))),
        })
        .collect()
}

/// Union of row keys in first-seen order, or `defaults` when there are no rows.
fn columns_for(rows: &[Map<String, Value>], defaults: &[&str]) -> Vec<String> {
    if rows.is_empty() {
        return defaults.iter().map(|c| c.to_string()).collect();
    }
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn render_table(columns: &[String], rows: &[Map<String, Value>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| cell(row.get(c))).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let pad = |value: &str, width: usize| {
        let fill = width.saturating_sub(value.chars().count());
        format!("{value}{}", " ".repeat(fill))
    };
    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| pad(v.as_str(), *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![
        line(columns),
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    ];
    lines.extend(cells.iter().map(|row| line(row.as_slice())));
    lines.join("\n")
}

fn render_csv(columns: &[String], rows: &[Map<String, Value>]) -> String {
    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    out.push_str(&header.join(","));
    out.push_str("\r\n");
    for row in rows {
        let fields: Vec<String> = columns.iter().map(|c| csv_field(&cell(row.get(c)))).collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Row {
        site_url: String,
        clicks: Option<u32>,
    }

    impl Record for Row {
        const COLUMNS: &'static [&'static str] = &["siteUrl", "clicks"];
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                site_url: "https://example.com".into(),
                clicks: Some(10),
            },
            Row {
                site_url: "https://b.example".into(),
                clicks: None,
            },
        ]
    }

    #[test]
    fn table_is_aligned() {
        let text = render(&rows(), OutputFormat::Table, None).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "siteUrl             | clicks");
        assert_eq!(lines[1], "--------------------+-------");
        assert_eq!(lines[2], "https://example.com | 10");
        assert_eq!(lines[3], "https://b.example   |");
    }

    #[test]
    fn empty_records_render_headers_or_empty_array() {
        let empty: Vec<Row> = Vec::new();
        let table = render(&empty, OutputFormat::Table, None).unwrap();
        assert_eq!(table.lines().count(), 2);
        assert!(table.starts_with("siteUrl | clicks"));

        assert_eq!(render(&empty, OutputFormat::Json, None).unwrap(), "[]");

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let msg = render(&empty, OutputFormat::Csv, Some(path.as_path())).unwrap();
        assert_eq!(msg, format!("Wrote 0 row(s) to {}", path.display()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "siteUrl,clicks\r\n");
    }

    #[test]
    fn json_keeps_field_names() {
        let text = render(&rows(), OutputFormat::Json, None).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["siteUrl"], "https://example.com");
        assert_eq!(parsed[1]["clicks"], Value::Null);
    }

    #[test]
    fn csv_requires_a_path() {
        let err = render(&rows(), OutputFormat::Csv, None).unwrap_err();
        assert!(matches!(err, BwmError::Validation(_)));
    }

    #[test]
    fn csv_escapes_special_characters() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }
}
