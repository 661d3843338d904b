use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::events::{CalendarTarget, FormEvent};
use crate::task::{Project, RepeatMode, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color() }
    }

    #[tracing::instrument(skip(self, projects))]
    pub fn print_projects(&mut self, projects: &[Project]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec!["ID".to_string(), "Project".to_string()];
        let rows = projects
            .iter()
            .map(|project| vec![self.paint(&project.id.to_string(), "33"), project.name.clone()])
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, project_name))]
    pub fn print_task_info(&mut self, task: &Task, project_name: Option<&str>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(
            out,
            "id        {}",
            task.id
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string())
        )?;
        writeln!(out, "name      {}", task.name)?;
        writeln!(out, "desc      {}", task.description)?;
        writeln!(out, "project   {}", project_name.unwrap_or_default())?;

        if task.is_regular_task {
            writeln!(out, "repeat    {}", repeat_label(task))?;
        } else {
            writeln!(out, "repeat    one-time")?;
        }
        if !task.estimate_date.is_empty() {
            writeln!(out, "until     {}", task.estimate_date)?;
        }
        writeln!(out, "estimate  {:.2}", task.estimate_time.unwrap_or_default())?;

        let active = if task.is_active {
            self.paint("yes", "32")
        } else {
            "no".to_string()
        };
        writeln!(out, "active    {active}")?;

        Ok(())
    }

    /// Prints drained form events; validation failures go to stderr.
    pub fn print_events(&mut self, events: &[FormEvent]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let mut err = io::stderr().lock();

        for event in events {
            let Some(message) = event_message(event) else {
                continue;
            };
            if is_error(event) {
                writeln!(err, "{}", self.paint(&message, "31"))?;
            } else {
                writeln!(out, "{message}")?;
            }
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn form_title(editing: bool) -> &'static str {
    if editing { "Edit task" } else { "New task" }
}

/// User-facing text for an event; `None` for events with nothing to say
/// on a terminal.
pub fn event_message(event: &FormEvent) -> Option<String> {
    match event {
        FormEvent::ValidationFailed(violation) => Some(violation.to_string()),
        FormEvent::PickedDateRejected(target) => Some(format!(
            "Wrong picked {} date: choose a day after today",
            calendar_label(*target)
        )),
        FormEvent::ProjectsLoadFailed(reason) => {
            Some(format!("Could not load projects: {reason}"))
        }
        FormEvent::CalendarRequested(target) => {
            Some(format!("Pick the {} date (dd.mm.yyyy)", calendar_label(*target)))
        }
        FormEvent::ProjectDialogRequested => Some("Choose a project".to_string()),
        FormEvent::Saved => Some("Task saved".to_string()),
        FormEvent::RegularTaskVisibility(_)
        | FormEvent::RepeatDetailVisibility(_)
        | FormEvent::EveryWeekSelection(_) => None,
    }
}

fn is_error(event: &FormEvent) -> bool {
    matches!(
        event,
        FormEvent::ValidationFailed(_)
            | FormEvent::PickedDateRejected(_)
            | FormEvent::ProjectsLoadFailed(_)
    )
}

fn calendar_label(target: CalendarTarget) -> &'static str {
    match target {
        CalendarTarget::EstimateDate => "estimate",
        CalendarTarget::RepeatDate => "repeat",
    }
}

fn repeat_label(task: &Task) -> String {
    match task.repeat_mode {
        RepeatMode::EveryDay => "every day".to_string(),
        RepeatMode::EveryWeek => format!("every week on {}", task.picked_days),
        RepeatMode::ExactDate => format!("on {}", task.repeat_date),
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Project".to_string()],
            vec![vec!["\x1b[33m12\x1b[0m".to_string(), "Café".to_string()]],
        )
        .expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Project ");
        assert_eq!(lines[1], "-- ------- ");
        assert_eq!(strip_ansi(lines[2]), "12 Café    ");
    }

    #[test]
    fn validation_messages_match_prompts() {
        assert_eq!(
            event_message(&FormEvent::ValidationFailed(ValidationError::NoProject)).as_deref(),
            Some("Choose project")
        );
        assert_eq!(event_message(&FormEvent::RegularTaskVisibility(true)), None);
        assert_eq!(form_title(true), "Edit task");
    }
}
