use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;
use uuid::Uuid;

use crate::config::Config;
use crate::task::{DisplayItem, TaskItem};
use crate::timesheet::TimeSheet;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// The forest as an indented outline. Collapsed nodes hide their
    /// subtree; the selection is painted inverse, overdue and
    /// high-priority-today tasks red.
    #[tracing::instrument(skip(self, forest, selected, today))]
    pub fn print_forest(
        &mut self,
        forest: &[TaskItem],
        selected: Option<Uuid>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if forest.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Task".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
        ];
        let mut rows = Vec::new();
        self.collect_forest_rows(forest, selected, today, 0, &mut rows);
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    fn collect_forest_rows(
        &self,
        nodes: &[TaskItem],
        selected: Option<Uuid>,
        today: NaiveDate,
        depth: usize,
        rows: &mut Vec<Vec<String>>,
    ) {
        for node in nodes {
            let marker = if node.children.is_empty() {
                ' '
            } else if node.is_expanded {
                '-'
            } else {
                '+'
            };

            let mut label = format!("{}{} {}", "  ".repeat(depth), marker, node.name);
            if node.is_in_edit_mode {
                label.push_str(" (edit)");
            }

            let id = node.reference();
            let due = node
                .due
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();

            let urgent = node.is_high_priority_today(today)
                || node.due.map(|date| date < today).unwrap_or(false);

            let mut cells = vec![id, label, node.priority.to_string(), due];
            if urgent {
                cells = cells.into_iter().map(|cell| self.paint(&cell, "31")).collect();
            }
            if selected == Some(node.uuid) {
                cells = cells.into_iter().map(|cell| self.paint(&cell, "7")).collect();
            }
            rows.push(cells);

            if node.is_expanded {
                self.collect_forest_rows(&node.children, selected, today, depth + 1, rows);
            }
        }
    }

    /// Generic outline over the display capability; used wherever task and
    /// data rows mix.
    #[tracing::instrument(skip(self, items))]
    pub fn print_outline(&mut self, items: &[&dyn DisplayItem]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        print_outline_level(&mut out, items, 0)?;
        Ok(())
    }

    /// The selected week: one row per entry, then day and week totals.
    #[tracing::instrument(skip(self, sheet))]
    pub fn print_week(&mut self, sheet: &TimeSheet) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let dates = sheet.week_dates();
        writeln!(
            out,
            "Week of {} to {}",
            dates[0].format("%Y-%m-%d"),
            dates[4].format("%Y-%m-%d")
        )?;

        let entries = sheet.current_week_entries();
        if entries.is_empty() {
            writeln!(out, "No entries this week.")?;
            return Ok(());
        }

        let headers = vec![
            "Date".to_string(),
            "Day".to_string(),
            "Code".to_string(),
            "Hours".to_string(),
            "Description".to_string(),
        ];
        let rows: Vec<Vec<String>> = entries
            .iter()
            .map(|entry| {
                let code = entry.project_reference();
                let code = if entry.id2.is_none() {
                    self.paint(&code, "2")
                } else {
                    code
                };
                vec![
                    entry.date().format("%Y-%m-%d").to_string(),
                    entry.date().format("%a").to_string(),
                    code,
                    format!("{}", entry.hours()),
                    entry.description.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;

        let totals: Vec<String> = dates
            .iter()
            .map(|date| format!("{} {}", date.format("%a"), sheet.day_total(*date)))
            .collect();
        writeln!(out, "Day totals: {}", totals.join("  "))?;
        writeln!(out, "Week total: {}", sheet.week_total())?;
        Ok(())
    }

    /// One day's entries and total, for the day views.
    #[tracing::instrument(skip(self, sheet))]
    pub fn print_day(&mut self, sheet: &TimeSheet, date: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{} ({})", date.format("%Y-%m-%d"), date.format("%A"))?;

        let mut any = false;
        for entry in sheet.current_week_entries() {
            if entry.date() != date {
                continue;
            }
            any = true;
            writeln!(
                out,
                "  {:<16} {:>5}  {}",
                entry.project_reference(),
                entry.hours(),
                entry.description
            )?;
        }
        if !any {
            writeln!(out, "  no entries")?;
        }
        writeln!(out, "Day total: {}", sheet.day_total(date))?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn print_outline_level<W: Write>(
    writer: &mut W,
    items: &[&dyn DisplayItem],
    depth: usize,
) -> anyhow::Result<()> {
    for item in items {
        let mut line = format!("{}{}", "  ".repeat(depth), item.display_name());
        if item.is_in_edit_mode() {
            line.push_str(" (edit)");
        }
        writeln!(writer, "{line}")?;

        if item.is_expanded() {
            print_outline_level(writer, &item.children(), depth + 1)?;
        }
    }
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
