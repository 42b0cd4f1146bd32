use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{day_name, format_date, format_time, to_local_input};
use crate::model::{Priority, Project, Status, Task};
use crate::views::{DayCell, MonthGrid, WeekGrid};

pub const CONNECTED_TEXT: &str = "Connected to backend";
pub const OFFLINE_TEXT: &str = "Using local storage (backend not available)";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn print_connection_status(&mut self, online: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_connection_status(&mut out, online)
    }

    pub fn write_connection_status<W: Write>(&self, mut out: W, online: bool) -> anyhow::Result<()> {
        let line = if online {
            self.paint(CONNECTED_TEXT, "32")
        } else {
            self.paint(OFFLINE_TEXT, "33")
        };
        writeln!(out, "{line}")?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_project_table(&mut self, projects: &[Project]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_project_table(&mut out, projects)
    }

    pub fn write_project_table<W: Write>(
        &self,
        out: W,
        projects: &[Project],
    ) -> anyhow::Result<()> {
        let headers = ["ID", "Name", "Color", "Tasks", "Description"]
            .map(str::to_string)
            .to_vec();

        let rows = projects
            .iter()
            .map(|project| {
                vec![
                    self.paint(&project.id, "33"),
                    project.name.clone(),
                    project.color.clone(),
                    project
                        .task_count
                        .map(|count| count.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    project.description.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_task_table(
        &mut self,
        title: &str,
        tasks: &[&Task],
        projects: &[Project],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, title, tasks, projects, today)
    }

    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        title: &str,
        tasks: &[&Task],
        projects: &[Project],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(out, "{title}")?;
        if tasks.is_empty() {
            writeln!(out, "No tasks found")?;
            return Ok(());
        }

        let headers = ["ID", "Title", "Project", "Due", "Priority", "Status"]
            .map(str::to_string)
            .to_vec();

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let project = projects
                .iter()
                .find(|p| p.id == task.project_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| task.project_id.clone());

            let due = task
                .due_date
                .map(|due| format!("{} {}", format_date(due.date()), format_time(&due)))
                .unwrap_or_default();
            let overdue = task.status == Status::Pending
                && task.due_date.is_some_and(|due| due.date() < today);
            let due = if overdue { self.paint(&due, "31") } else { due };

            let title = if task.status == Status::Completed {
                self.paint(&task.title, "2")
            } else {
                task.title.clone()
            };

            rows.push(vec![
                self.paint(&task.id, "33"),
                title,
                project,
                due,
                self.paint_priority(task.priority),
                task.status.to_string(),
            ]);
        }

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "project   {}", task.project_id)?;
        writeln!(out, "title     {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "desc      {}", task.description)?;
        }
        writeln!(out, "status    {}", task.status)?;
        writeln!(out, "priority  {}", task.priority)?;
        writeln!(out, "order     {}", task.order)?;
        if let Some(due) = task.due_date {
            writeln!(out, "due       {}", to_local_input(&due))?;
        }
        if let Some(reminder) = task.reminder_date {
            writeln!(out, "reminder  {}", to_local_input(&reminder))?;
        }
        writeln!(out, "created   {}", task.created_at.format("%Y%m%dT%H%M%SZ"))?;
        writeln!(out, "updated   {}", task.updated_at.format("%Y%m%dT%H%M%SZ"))?;

        Ok(())
    }

    pub fn print_project_info(&mut self, project: &Project) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", project.id)?;
        writeln!(out, "name      {}", project.name)?;
        if !project.description.is_empty() {
            writeln!(out, "desc      {}", project.description)?;
        }
        writeln!(out, "color     {}", project.color)?;
        writeln!(out, "created   {}", project.created_at.format("%Y%m%dT%H%M%SZ"))?;

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_month_grid(&mut self, grid: &MonthGrid) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_month_grid(&mut out, grid)
    }

    /// Seven columns per row, one row per week. A cell shows the day number,
    /// brackets for today and the count of tasks due that day.
    pub fn write_month_grid<W: Write>(&self, mut out: W, grid: &MonthGrid) -> anyhow::Result<()> {
        writeln!(out, "{}", grid.title())?;

        let headers = grid
            .cells
            .iter()
            .take(7)
            .map(|cell| short_day_name(cell.date))
            .collect();

        let rows = grid
            .weeks()
            .map(|week| week.iter().map(|cell| self.month_cell(cell)).collect())
            .collect();

        write_table(&mut out, headers, rows)?;

        for cell in grid.cells.iter().filter(|cell| cell.in_month) {
            for task in &cell.tasks {
                writeln!(out, "{}", self.agenda_line(cell.date, task))?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_week_grid(&mut self, grid: &WeekGrid) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_week_grid(&mut out, grid)
    }

    pub fn write_week_grid<W: Write>(&self, mut out: W, grid: &WeekGrid) -> anyhow::Result<()> {
        writeln!(out, "{}", grid.title())?;

        for cell in &grid.cells {
            let heading = format!("{} {}", day_name(cell.date.weekday()), format_date(cell.date));
            let heading = if cell.is_today {
                self.paint(&heading, "1")
            } else {
                heading
            };
            writeln!(out, "{heading}")?;

            if cell.tasks.is_empty() {
                writeln!(out, "  -")?;
            }
            for task in &cell.tasks {
                let time = task.due_date.map(|due| format_time(&due)).unwrap_or_default();
                writeln!(
                    out,
                    "  {:>8}  {} [{}]",
                    time,
                    task.title,
                    self.paint_priority(task.priority)
                )?;
            }
        }

        Ok(())
    }

    fn month_cell(&self, cell: &DayCell) -> String {
        let day = cell.date.format("%-d").to_string();
        let day = if cell.is_today {
            format!("[{day}]")
        } else {
            day
        };
        let text = if cell.tasks.is_empty() {
            day
        } else {
            format!("{day} ({})", cell.tasks.len())
        };

        if !cell.in_month {
            self.paint(&text, "2")
        } else if cell.is_today {
            self.paint(&text, "1")
        } else {
            text
        }
    }

    fn agenda_line(&self, date: NaiveDate, task: &Task) -> String {
        let time = task.due_date.map(|due| format_time(&due)).unwrap_or_default();
        let title = if task.status == Status::Completed {
            self.paint(&task.title, "2")
        } else {
            task.title.clone()
        };
        format!("{} {:>8}  {}", format_date(date), time, title)
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "32",
        };
        self.paint(priority.as_str(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_day_name(date: NaiveDate) -> String {
    day_name(date.weekday()).chars().take(3).collect()
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
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
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
