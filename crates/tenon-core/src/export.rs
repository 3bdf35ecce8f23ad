use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::timesheet::TimeEntry;

/// One tab-separated line per (id1, id2) group for the given week, in the
/// fixed payroll import layout: group id, the 12-character timecode token,
/// three empty filler fields, then Monday..Friday hour sums. Generic
/// entries (no id2) and groups whose five sums are all zero are excluded.
/// Returns None when no group qualifies.
pub fn weekly_timesheet_block(entries: &[TimeEntry], week_start: NaiveDate) -> Option<String> {
    let mut groups: BTreeMap<(i64, i64), [f64; 5]> = BTreeMap::new();

    for entry in entries {
        if entry.week_start() != week_start {
            continue;
        }
        let Some(id2) = entry.id2 else {
            debug!(id1 = entry.id1, "skipping generic timecode in payroll export");
            continue;
        };
        let day = chrono::Datelike::weekday(&entry.date()).num_days_from_monday() as usize;
        if day > 4 {
            continue;
        }
        groups.entry((entry.id1, id2)).or_default()[day] += entry.hours();
    }

    let mut lines = Vec::with_capacity(groups.len());
    for ((id1, id2), days) in groups {
        if days.iter().all(|hours| *hours == 0.0) {
            continue;
        }
        let cells: Vec<String> = days.iter().map(|hours| format_hours(*hours)).collect();
        lines.push(format!(
            "{id1}\t{}\t\t\t\t{}",
            format_timecode(id2),
            cells.join("\t")
        ));
    }

    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

/// `V` + the numeric id zero-padded to ten digits + `S`. Ids that already
/// fill ten digits get no padding.
fn format_timecode(id2: i64) -> String {
    format!("V{id2:0>10}S")
}

/// Quarter-hour values print exactly, with trailing zeros trimmed: 2, 0,
/// 2.5, 2.25.
fn format_hours(hours: f64) -> String {
    format!("{hours}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
    Xml,
    Txt,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
            ExportFormat::Xml => "xml",
            ExportFormat::Txt => "txt",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "tsv" => Ok(ExportFormat::Tsv),
            "json" => Ok(ExportFormat::Json),
            "xml" => Ok(ExportFormat::Xml),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(anyhow::anyhow!("unknown export format: {other}")),
        }
    }
}

/// Renders an ordered field/value record in the requested flat format.
pub fn render_flat(fields: &[(String, String)], format: ExportFormat) -> anyhow::Result<String> {
    match format {
        ExportFormat::Csv => Ok(render_delimited(fields, ',')),
        ExportFormat::Tsv => Ok(render_delimited(fields, '\t')),
        ExportFormat::Json => render_json(fields),
        ExportFormat::Xml => Ok(render_xml(fields)),
        ExportFormat::Txt => Ok(render_txt(fields)),
    }
}

fn render_delimited(fields: &[(String, String)], delimiter: char) -> String {
    let header: Vec<String> = fields
        .iter()
        .map(|(name, _)| escape_delimited(name, delimiter))
        .collect();
    let record: Vec<String> = fields
        .iter()
        .map(|(_, value)| escape_delimited(value, delimiter))
        .collect();
    format!(
        "{}\n{}\n",
        header.join(&delimiter.to_string()),
        record.join(&delimiter.to_string())
    )
}

/// Quote a field when it contains the delimiter, a quote, or a line break;
/// embedded quotes double.
fn escape_delimited(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_json(fields: &[(String, String)]) -> anyhow::Result<String> {
    let mut out = String::from("{\n");
    for (idx, (name, value)) in fields.iter().enumerate() {
        out.push_str("  ");
        out.push_str(&serde_json::to_string(name)?);
        out.push_str(": ");
        out.push_str(&serde_json::to_string(value)?);
        if idx + 1 < fields.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str("}\n");
    Ok(out)
}

fn render_xml(fields: &[(String, String)]) -> String {
    let mut out = String::from("<record>\n");
    for (name, value) in fields {
        out.push_str(&format!(
            "  <field name=\"{}\">{}</field>\n",
            escape_xml(name),
            escape_xml(value)
        ));
    }
    out.push_str("</record>\n");
    out
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_txt(fields: &[(String, String)]) -> String {
    let width = fields
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for (name, value) in fields {
        let pad = width.saturating_sub(name.chars().count());
        out.push_str(&format!("{name}{}: {value}\n", " ".repeat(pad)));
    }
    out
}
