use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_date;
use crate::selection::Selection;
use crate::session::Status;
use crate::task::{DeletedTask, Task};

const NOTES_MARKER: &str = "✎";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color").unwrap_or(true) && io::stdout().is_terminal();
        Ok(Self { color })
    }

    /// A renderer that never emits escape codes.
    pub fn plain() -> Self {
        Self { color: false }
    }

    /// The active list in display order. Row numbers are the positions
    /// other commands accept.
    #[tracing::instrument(skip_all, fields(count = tasks.len()))]
    pub fn print_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        selection: &Selection,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "".to_string(),
            "Due".to_string(),
            "Task".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let mut flags = String::new();
            if selection.is_active() {
                flags.push(if selection.contains(task.id) { '●' } else { '○' });
            }
            flags.push(if task.completed { '✓' } else { ' ' });
            flags.push(if task.is_important { '★' } else { ' ' });

            let due = task.due_date.map(format_date).unwrap_or_default();
            let due = if task.is_overdue(today) {
                self.paint(&due, "31")
            } else {
                due
            };

            let mut text = if task.completed {
                self.paint(&task.text, "2")
            } else {
                task.text.clone()
            };
            if !task.notes.trim().is_empty() {
                text.push(' ');
                text.push_str(NOTES_MARKER);
            }

            rows.push(vec![
                self.paint(&(idx + 1).to_string(), "33"),
                short_id(task),
                flags,
                due,
                text,
            ]);
        }

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_task_info<W: Write>(
        &self,
        out: &mut W,
        task: &Task,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(out, "id         {}", task.id)?;
        writeln!(out, "text       {}", task.text)?;
        writeln!(out, "completed  {}", yes_no(task.completed))?;
        writeln!(out, "important  {}", yes_no(task.is_important))?;
        if let Some(due) = task.due_date {
            let marker = if task.is_overdue(today) {
                self.paint(" (overdue)", "31")
            } else {
                String::new()
            };
            writeln!(out, "due        {}{marker}", format_date(due))?;
        }
        if !task.notes.is_empty() {
            writeln!(out, "notes")?;
            for line in task.notes.lines() {
                writeln!(out, "  {line}")?;
            }
        }
        Ok(())
    }

    /// Bin entries, newest deletion first, with the days left before
    /// each one expires.
    #[tracing::instrument(skip_all, fields(count = entries.len()))]
    pub fn print_bin_table<W: Write>(
        &self,
        out: &mut W,
        entries: &[&DeletedTask],
        now: DateTime<Utc>,
        retention: Duration,
    ) -> anyhow::Result<()> {
        if entries.is_empty() {
            writeln!(out, "Recycle bin is empty.")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "Deleted".to_string(),
            "Expires".to_string(),
            "Task".to_string(),
        ];

        let rows = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let deleted = entry
                    .deleted_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string();
                let expires = match entry.deleted_at.checked_add_signed(retention) {
                    Some(at) => match (at - now).num_days().max(0) {
                        0 => self.paint("today", "31"),
                        left => format!("{left}d"),
                    },
                    None => "never".to_string(),
                };
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    short_id(&entry.task),
                    deleted,
                    expires,
                    entry.task.text.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn print_status<W: Write>(&self, out: &mut W, status: &Status) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} task(s), {} completed. Sort: {}.",
            status.active,
            status.completed,
            status.policy.label()
        )?;
        writeln!(out, "Recycle bin: {} task(s).", status.bin)?;
        if status.selection_active {
            writeln!(out, "Selection: {} task(s).", status.selected)?;
        }
        self.print_undo_notice(out, status)
    }

    /// The undo toast, when a batch is still undoable.
    pub fn print_undo_notice<W: Write>(
        &self,
        out: &mut W,
        status: &Status,
    ) -> anyhow::Result<()> {
        if let Some(notice) = status.undo_notice() {
            let secs = status
                .undo_remaining
                .map(|left| (left.num_milliseconds() + 999) / 1000)
                .unwrap_or(0);
            writeln!(
                out,
                "{} Type `undo` within {secs}s.",
                self.paint(&notice, "36")
            )?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(task: &Task) -> String {
    task.id.simple().to_string()[..8].to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn write_table<W: Write>(
    writer: &mut W,
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

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
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
