use anyhow::{Context, anyhow, bail};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::cli::{Command, ProjectCommand, TaskCommand};
use crate::config::Config;
use crate::data::TaskManager;
use crate::datetime::{iso_week, parse_date_input, start_of_week_sunday, today};
use crate::model::{NewProject, NewTask, ProjectPatch, Task, TaskPatch, TaskQuery};
use crate::remote::TransportError;
use crate::render::Renderer;
use crate::views::{TaskFilter, filter_tasks, month_grid, sorted_by_order, week_grid};

/// Runs one command against the data layer. With no command, lists all tasks.
#[tracing::instrument(skip_all)]
pub async fn dispatch<R>(
    manager: &mut TaskManager<R>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Option<Command>,
) -> anyhow::Result<()>
where
    R: StorageBackend<Error = TransportError> + Sync,
{
    let today = today(cfg.calendar_timezone().as_ref());
    let command = command.unwrap_or_else(|| {
        debug!("no command given; listing tasks");
        Command::Task(TaskCommand::List {
            project: None,
            filter: Default::default(),
            priority: None,
            status: None,
        })
    });

    match command {
        Command::Status => cmd_status(manager, renderer).await,
        Command::Project(cmd) => cmd_project(manager, renderer, cmd).await,
        Command::Task(cmd) => cmd_task(manager, renderer, cmd, today).await,
        Command::Month { year, month } => {
            let year = year.unwrap_or_else(|| today.year());
            let month = month.unwrap_or_else(|| today.month());
            cmd_month(manager, renderer, year, month, today).await
        }
        Command::Week { date } => {
            let reference = match date {
                Some(raw) => parse_date_input(&raw, today)?.date(),
                None => today,
            };
            cmd_week(manager, renderer, reference, today).await
        }
    }
}

async fn cmd_status<R>(manager: &mut TaskManager<R>, renderer: &mut Renderer) -> anyhow::Result<()>
where
    R: StorageBackend<Error = TransportError> + Sync,
{
    let online = manager.refresh().await;
    renderer.print_connection_status(online)?;
    println!(
        "{} projects, {} tasks",
        manager.projects().len(),
        manager.tasks().len()
    );
    Ok(())
}

async fn cmd_project<R>(
    manager: &mut TaskManager<R>,
    renderer: &mut Renderer,
    cmd: ProjectCommand,
) -> anyhow::Result<()>
where
    R: StorageBackend<Error = TransportError> + Sync,
{
    match cmd {
        ProjectCommand::List => {
            let projects = manager.list_projects().await;
            if projects.is_empty() {
                println!("No projects yet");
                return Ok(());
            }
            renderer.print_project_table(&projects)?;
        }
        ProjectCommand::Add {
            name,
            description,
            color,
        } => {
            let name = required_text(name, "project name")?;
            let project = manager
                .create_project(NewProject {
                    name,
                    description,
                    color,
                })
                .await;
            info!(id = %project.id, "project created");
            println!("Created project {}.", project.id);
            renderer.print_project_info(&project)?;
        }
        ProjectCommand::Edit {
            id,
            name,
            description,
            color,
        } => {
            let name = name.map(|n| required_text(n, "project name")).transpose()?;
            let patch = ProjectPatch {
                name,
                description,
                color,
            };
            let project = manager
                .update_project(&id, patch)
                .await
                .ok_or_else(|| anyhow!("no project with id {id}"))?;
            println!("Modified project {}.", project.id);
            renderer.print_project_info(&project)?;
        }
        ProjectCommand::Delete { id } => {
            manager.delete_project(&id).await;
            println!("Deleted project {id} and its tasks.");
        }
    }
    Ok(())
}

async fn cmd_task<R>(
    manager: &mut TaskManager<R>,
    renderer: &mut Renderer,
    cmd: TaskCommand,
    today: NaiveDate,
) -> anyhow::Result<()>
where
    R: StorageBackend<Error = TransportError> + Sync,
{
    match cmd {
        TaskCommand::List {
            project,
            filter,
            priority,
            status,
        } => {
            let projects = manager.list_projects().await;
            let query = project.map(TaskQuery::for_project).unwrap_or_default();
            let tasks = manager.list_tasks(&query).await;

            let ordered: Vec<Task> = sorted_by_order(&tasks).into_iter().cloned().collect();
            let filter = TaskFilter {
                mode: filter,
                priority,
                status,
            };
            let shown = filter_tasks(&ordered, &filter, today);
            renderer.print_task_table(filter.mode.title(), &shown, &projects, today)?;
        }
        TaskCommand::Add {
            title,
            project,
            description,
            priority,
            due,
            reminder,
        } => {
            let title = required_text(title, "task title")?;
            let project_id = required_text(project, "project")?;
            let projects = manager.list_projects().await;
            if !projects.iter().any(|p| p.id == project_id) {
                bail!("no project with id {project_id}");
            }
            let fields = NewTask {
                project_id,
                title,
                description,
                priority,
                due_date: due
                    .map(|raw| parse_date_input(&raw, today))
                    .transpose()
                    .context("invalid --due")?,
                reminder_date: reminder
                    .map(|raw| parse_date_input(&raw, today))
                    .transpose()
                    .context("invalid --reminder")?,
            };
            let task = manager.create_task(fields).await;
            info!(id = %task.id, "task created");
            println!("Created task {}.", task.id);
            renderer.print_task_info(&task)?;
        }
        TaskCommand::Edit {
            id,
            title,
            description,
            priority,
            status,
            due,
            clear_due,
            reminder,
            clear_reminder,
        } => {
            let title = title.map(|t| required_text(t, "task title")).transpose()?;
            let patch = TaskPatch {
                title,
                description,
                status,
                priority,
                due_date: date_change(due, clear_due, today).context("invalid --due")?,
                reminder_date: date_change(reminder, clear_reminder, today)
                    .context("invalid --reminder")?,
                order: None,
            };
            let task = manager
                .update_task(&id, patch)
                .await
                .ok_or_else(|| anyhow!("no task with id {id}"))?;
            println!("Modified task {}.", task.id);
            renderer.print_task_info(&task)?;
        }
        TaskCommand::Delete { id } => {
            manager.delete_task(&id).await;
            println!("Deleted task {id}.");
        }
        TaskCommand::Toggle { id } => {
            let task = manager
                .toggle_status(&id)
                .await
                .ok_or_else(|| anyhow!("no task with id {id}"))?;
            println!("Task {} is now {}.", task.id, task.status);
        }
        TaskCommand::Reorder { ids } => {
            manager.reorder(&ids).await;
            println!("Reordered {} tasks.", ids.len());
        }
    }
    Ok(())
}

async fn cmd_month<R>(
    manager: &mut TaskManager<R>,
    renderer: &mut Renderer,
    year: i32,
    month: u32,
    today: NaiveDate,
) -> anyhow::Result<()>
where
    R: StorageBackend<Error = TransportError> + Sync,
{
    if !(1..=12).contains(&month) {
        bail!("invalid month: {month} (expected 1-12)");
    }
    let tasks = manager.month_tasks(year, month).await;
    let grid = month_grid(year, month, &tasks, today)
        .ok_or_else(|| anyhow!("invalid month: {year}-{month}"))?;
    renderer.print_month_grid(&grid)
}

/// The Sunday that starts the grid can sit in the previous ISO week, so both
/// weeks are fetched when they differ.
async fn cmd_week<R>(
    manager: &mut TaskManager<R>,
    renderer: &mut Renderer,
    reference: NaiveDate,
    today: NaiveDate,
) -> anyhow::Result<()>
where
    R: StorageBackend<Error = TransportError> + Sync,
{
    let start = start_of_week_sunday(reference);
    let mut tasks = manager
        .week_tasks(reference.year(), iso_week(reference))
        .await;

    let start_week = (start.year(), iso_week(start));
    if start_week != (reference.year(), iso_week(reference)) {
        for task in manager.week_tasks(start_week.0, start_week.1).await {
            if !tasks.iter().any(|t| t.id == task.id) {
                tasks.push(task);
            }
        }
    }

    let grid = week_grid(reference, &tasks, today);
    renderer.print_week_grid(&grid)
}

fn required_text(value: String, what: &str) -> anyhow::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{what} cannot be empty");
    }
    Ok(trimmed.to_string())
}

fn date_change(
    raw: Option<String>,
    clear: bool,
    today: NaiveDate,
) -> anyhow::Result<Option<Option<chrono::NaiveDateTime>>> {
    if clear {
        return Ok(Some(None));
    }
    raw.map(|raw| parse_date_input(&raw, today).map(Some))
        .transpose()
}
