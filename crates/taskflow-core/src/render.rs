use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_display_date;
use crate::state::{Settings, Theme};
use crate::task::{Priority, Task};
use crate::views::TaskStats;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color_enabled() && io::stdout().is_terminal(),
        }
    }

    /// Never emits ANSI codes.
    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks, now))]
    pub fn write_task_table<W: Write>(&self, mut out: W, tasks: &[&Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let headers = ["ID", "Done", "Priority", "Category", "Due", "Task", "Tags"];

        let rows = tasks
            .iter()
            .map(|task| {
                let due = task.due_date.map(format_display_date).unwrap_or_default();
                let due = if task.is_overdue(now) {
                    self.paint(&due, "31")
                } else {
                    due
                };
                let priority = match task.priority {
                    Priority::High | Priority::Urgent => self.paint(task.priority.as_str(), "1"),
                    _ => task.priority.to_string(),
                };

                vec![
                    self.paint(task.id.short(), "33"),
                    (if task.completed { "x" } else { "" }).to_string(),
                    priority,
                    task.category.to_string(),
                    due,
                    task.text.clone(),
                    task.tags.iter().map(|tag| format!("#{tag}")).collect::<Vec<_>>().join(" "),
                ]
            })
            .collect();

        write_table(&mut out, &headers, rows)?;
        Ok(())
    }

    /// One-line summary under a listing.
    pub fn write_list_footer<W: Write>(
        &self,
        mut out: W,
        shown: usize,
        total: usize,
        completed: usize,
        settings: &Settings,
    ) -> anyhow::Result<()> {
        write!(out, "{shown} of {total} task(s)")?;
        if settings.show_completed_count {
            write!(out, ", {completed} completed")?;
        }
        writeln!(out)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, task))]
    pub fn write_task_info<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id         {}", task.id)?;
        writeln!(out, "text       {}", task.text)?;
        writeln!(out, "completed  {}", task.completed)?;
        writeln!(out, "category   {}", task.category)?;
        writeln!(out, "priority   {}", task.priority)?;
        if let Some(due) = task.due_date {
            writeln!(out, "due        {}", format_display_date(due))?;
        }
        if !task.tags.is_empty() {
            writeln!(out, "tags       {}", task.tags.join(", "))?;
        }
        if !task.notes.is_empty() {
            writeln!(out, "notes      {}", task.notes)?;
        }
        if let Some(estimate) = &task.estimated_time {
            writeln!(out, "estimate   {estimate}")?;
        }
        if let Some(actual) = &task.actual_time {
            writeln!(out, "actual     {actual}")?;
        }
        if !task.subtasks.is_empty() {
            writeln!(out, "subtasks   {}", task.subtasks.len())?;
        }
        if !task.attachments.is_empty() {
            writeln!(out, "files      {}", task.attachments.len())?;
        }
        writeln!(out, "created    {}", task.created_at.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        writeln!(out, "updated    {}", task.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        Ok(())
    }

    pub fn write_stats<W: Write>(&self, mut out: W, stats: &TaskStats) -> anyhow::Result<()> {
        writeln!(out, "total       {}", stats.total)?;
        writeln!(out, "completed   {}", stats.completed)?;
        writeln!(out, "active      {}", stats.active)?;
        let overdue = stats.overdue.to_string();
        let overdue = if stats.overdue > 0 {
            self.paint(&overdue, "31")
        } else {
            overdue
        };
        writeln!(out, "overdue     {overdue}")?;
        writeln!(out, "completion  {}%", stats.completion_rate)?;

        if !stats.by_priority.is_empty() {
            writeln!(out)?;
            let rows = stats
                .by_priority
                .iter()
                .map(|(priority, count)| vec![priority.to_string(), count.to_string()])
                .collect();
            write_table(&mut out, &["Priority", "Count"], rows)?;
        }
        if !stats.by_category.is_empty() {
            writeln!(out)?;
            let rows = stats
                .by_category
                .iter()
                .map(|(category, count)| vec![category.to_string(), count.to_string()])
                .collect();
            write_table(&mut out, &["Category", "Count"], rows)?;
        }
        Ok(())
    }

    pub fn write_settings<W: Write>(&self, mut out: W, theme: Theme, settings: &Settings) -> anyhow::Result<()> {
        writeln!(out, "theme               {theme}")?;
        for (key, value) in settings.entries() {
            writeln!(out, "{key:<19} {}", if value { "on" } else { "off" })?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(mut writer: W, headers: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|header| UnicodeWidthStr::width(*header)).collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:width$}"))
        .collect();
    writeln!(writer, "{}", header_line.join(" ").trim_end())?;

    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    writeln!(writer, "{}", rule.join(" "))?;

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
            })
            .collect();
        writeln!(writer, "{}", cells.join(" ").trim_end())?;
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
