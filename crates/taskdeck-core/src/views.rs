use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate
};

use crate::datetime::{
  add_days,
  first_day_of_month,
  format_date,
  is_today,
  is_upcoming,
  iso_week,
  month_name,
  start_of_week_sunday
};
use crate::model::{
  Priority,
  Status,
  Task
};

pub const MONTH_GRID_CELLS: usize = 42;
pub const WEEK_GRID_CELLS: usize = 7;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum FilterMode {
  #[default]
  All,
  Today,
  Upcoming,
  Completed
}

impl FilterMode {
  #[must_use]
  pub fn title(self) -> &'static str {
    match self {
      | FilterMode::All => "All Tasks",
      | FilterMode::Today => {
        "Today's Tasks"
      }
      | FilterMode::Upcoming => {
        "Upcoming Tasks"
      }
      | FilterMode::Completed => {
        "Completed Tasks"
      }
    }
  }
}

impl FromStr for FilterMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(FilterMode::All),
      | "today" => Ok(FilterMode::Today),
      | "upcoming" => {
        Ok(FilterMode::Upcoming)
      }
      | "completed" => {
        Ok(FilterMode::Completed)
      }
      | other => {
        Err(anyhow!(
          "unknown filter: {other}"
        ))
      }
    }
  }
}

/// List filter: a base mode narrowed by optional priority and status.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskFilter {
  pub mode:     FilterMode,
  pub priority: Option<Priority>,
  pub status:   Option<Status>
}

impl TaskFilter {
  #[must_use]
  pub fn matches(
    &self,
    task: &Task,
    today: NaiveDate
  ) -> bool {
    let base = match self.mode {
      | FilterMode::All => true,
      | FilterMode::Today => {
        task.due_date.is_some_and(|due| {
          is_today(&due, today)
        })
      }
      | FilterMode::Upcoming => {
        task.due_date.is_some_and(|due| {
          is_upcoming(&due, today)
        })
      }
      | FilterMode::Completed => {
        task.status == Status::Completed
      }
    };

    base
      && self
        .priority
        .is_none_or(|p| task.priority == p)
      && self
        .status
        .is_none_or(|s| task.status == s)
  }
}

/// Matching tasks in their original relative order.
#[tracing::instrument(skip(tasks, today))]
pub fn filter_tasks<'a>(
  tasks: &'a [Task],
  filter: &TaskFilter,
  today: NaiveDate
) -> Vec<&'a Task> {
  let out: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      filter.matches(task, today)
    })
    .collect();
  tracing::trace!(
    total = tasks.len(),
    matched = out.len(),
    "filtered tasks"
  );
  out
}

/// Manual order first, creation time as tie-breaker.
#[must_use]
pub fn sorted_by_order(
  tasks: &[Task]
) -> Vec<&Task> {
  let mut out: Vec<&Task> =
    tasks.iter().collect();
  out.sort_by_key(|task| {
    (task.order, task.created_at)
  });
  out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
  pub date:     NaiveDate,
  /// Always true in week grids.
  pub in_month: bool,
  pub is_today: bool,
  pub tasks:    Vec<Task>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
  pub year:  i32,
  pub month: u32,
  pub cells: Vec<DayCell>
}

impl MonthGrid {
  /// "March 2024"
  #[must_use]
  pub fn title(&self) -> String {
    format!(
      "{} {}",
      month_name(self.month),
      self.year
    )
  }

  pub fn weeks(
    &self
  ) -> impl Iterator<Item = &[DayCell]> {
    self.cells.chunks(WEEK_GRID_CELLS)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekGrid {
  /// Sunday.
  pub start:    NaiveDate,
  /// Saturday.
  pub end:      NaiveDate,
  /// ISO week number of `start`, for
  /// the label only.
  pub iso_week: u32,
  pub cells:    Vec<DayCell>
}

impl WeekGrid {
  /// "Week 9 - Mar 3, 2024 to Mar 9,
  /// 2024"
  #[must_use]
  pub fn title(&self) -> String {
    format!(
      "Week {} - {} to {}",
      self.iso_week,
      format_date(self.start),
      format_date(self.end)
    )
  }
}

fn tasks_due_on(
  tasks: &[Task],
  date: NaiveDate
) -> Vec<Task> {
  tasks
    .iter()
    .filter(|task| {
      task
        .due_date
        .is_some_and(|due| due.date() == date)
    })
    .cloned()
    .collect()
}

/// Six Sunday-start rows covering the
/// month. `None` for an invalid month.
#[tracing::instrument(skip(tasks, today))]
pub fn month_grid(
  year: i32,
  month: u32,
  tasks: &[Task],
  today: NaiveDate
) -> Option<MonthGrid> {
  let first =
    first_day_of_month(year, month)?;
  let start = start_of_week_sunday(first);

  let cells = (0..MONTH_GRID_CELLS)
    .map(|offset| {
      let date =
        add_days(start, offset as i64);
      DayCell {
        date,
        in_month: date.year() == year
          && date.month() == month,
        is_today: date == today,
        tasks: tasks_due_on(tasks, date)
      }
    })
    .collect();

  Some(MonthGrid {
    year,
    month,
    cells
  })
}

/// The Sunday-start week containing
/// `reference`.
#[tracing::instrument(skip(tasks, today))]
pub fn week_grid(
  reference: NaiveDate,
  tasks: &[Task],
  today: NaiveDate
) -> WeekGrid {
  let start =
    start_of_week_sunday(reference);
  let cells = (0..WEEK_GRID_CELLS)
    .map(|offset| {
      let date =
        add_days(start, offset as i64);
      DayCell {
        date,
        in_month: true,
        is_today: date == today,
        tasks: tasks_due_on(tasks, date)
      }
    })
    .collect();

  WeekGrid {
    start,
    end: add_days(start, 6),
    iso_week: iso_week(start),
    cells
  }
}
