//! Output formatting: table, JSON, YAML.
//!
//! Panel views serialize as flat objects keyed by the wire field names,
//! so one generic row shape renders every list.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::{Map, Value};
use tabled::{Table, Tabled, settings::Style};

use lares_core::StreamUpdate;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

const DETAIL_WIDTH: usize = 60;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Details")]
    details: String,
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn row(mut map: Map<String, Value>) -> Row {
    let id = text(map.remove("ID").as_ref());
    let name = map
        .remove("DES")
        .or_else(|| map.remove("NM"))
        .map(|v| text(Some(&v)))
        .unwrap_or_default();
    let state = text(map.remove("STA").as_ref());
    let mut details: String = map
        .iter()
        .filter(|(_, v)| !v.is_object() && !v.is_array())
        .map(|(k, v)| format!("{k}={}", text(Some(v))))
        .collect::<Vec<_>>()
        .join(" ");
    if details.chars().count() > DETAIL_WIDTH {
        details = details.chars().take(DETAIL_WIDTH - 1).collect();
        details.push('…');
    }
    Row {
        id,
        name,
        state,
        details,
    }
}

fn rows(value: &Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => row(map.clone()),
                other => row(Map::from_iter([("ID".to_owned(), other.clone())])),
            })
            .collect(),
        Value::Object(map) => vec![row(map.clone())],
        _ => Vec::new(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of panel records in the chosen format.
pub fn render_list<T: Serialize>(format: OutputFormat, data: &[T]) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let value = serde_json::to_value(data)?;
            Ok(render_table(&rows(&value)))
        }
        _ => render_structured(format, data),
    }
}

/// Render named sections; tables get one block per section.
pub fn render_sections(format: OutputFormat, sections: &Map<String, Value>) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(sections
            .iter()
            .map(|(name, value)| format!("{name}\n{}", render_table(&rows(value))))
            .collect::<Vec<_>>()
            .join("\n\n")),
        _ => render_structured(format, sections),
    }
}

/// Key/value listing for a single object.
pub fn render_object(format: OutputFormat, data: &Map<String, Value>) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let width = data.keys().map(String::len).max().unwrap_or(0);
            Ok(data
                .iter()
                .map(|(k, v)| format!("{k:<width$}  {}", text(Some(v))))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        _ => render_structured(format, data),
    }
}

fn render_structured<T: Serialize + ?Sized>(format: OutputFormat, data: &T) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Json | OutputFormat::Table => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
    })
}

fn render_table(rows: &[Row]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Watch & command feedback ─────────────────────────────────────────

/// One line per stream update: time, stream name, compact records.
pub fn stream_line(update: &StreamUpdate, color: bool) -> Result<String, CliError> {
    let value = serde_json::to_value(update)?;
    let stream = text(value.get("stream"));
    let records = value.get("records").map(Value::to_string).unwrap_or_default();
    let time = chrono::Local::now().format("%H:%M:%S").to_string();
    Ok(if color {
        format!("{} {} {records}", time.dimmed(), stream.cyan().bold())
    } else {
        format!("{time} {stream} {records}")
    })
}

/// Confirmation printed after a command the panel accepted.
pub fn done(action: &str, color: bool) -> String {
    if color {
        format!("{} {action}", "✓".green().bold())
    } else {
        format!("ok: {action}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn row_picks_wire_fields() {
        let Value::Object(map) = json!({"ID": "3", "DES": "Hall", "STA": "on", "POS": 40, "WIN": {}}) else {
            unreachable!()
        };
        let r = row(map);
        assert_eq!(r.id, "3");
        assert_eq!(r.name, "Hall");
        assert_eq!(r.state, "on");
        assert_eq!(r.details, "POS=40");
    }

    #[test]
    fn stream_line_names_the_stream() {
        let line = stream_line(&StreamUpdate::Logs(Vec::new()), false).unwrap();
        assert!(line.ends_with("logs []"), "{line}");
    }
}
