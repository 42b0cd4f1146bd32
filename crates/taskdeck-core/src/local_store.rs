use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::model::{Project, Task};

pub const PROJECTS_ENTRY: &str = "projects.json";
pub const TASKS_ENTRY: &str = "tasks.json";

/// On-device mirror of the full project and task collections, one JSON
/// document per collection.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pub data_dir: PathBuf,
    pub projects_path: PathBuf,
    pub tasks_path: PathBuf,
}

impl LocalStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let projects_path = data_dir.join(PROJECTS_ENTRY);
        let tasks_path = data_dir.join(TASKS_ENTRY);

        info!(
            data_dir = %data_dir.display(),
            projects = %projects_path.display(),
            tasks = %tasks_path.display(),
            "opened local store"
        );

        Ok(Self {
            data_dir,
            projects_path,
            tasks_path,
        })
    }

    /// Reads both collections. Missing or unreadable entries come back empty.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> (Vec<Project>, Vec<Task>) {
        let projects = load_entry(&self.projects_path);
        let tasks = load_entry(&self.tasks_path);
        debug!(
            projects = projects.len(),
            tasks = tasks.len(),
            "loaded local store"
        );
        (projects, tasks)
    }

    /// Writes both collections in full.
    #[tracing::instrument(skip(self, projects, tasks))]
    pub fn save(&self, projects: &[Project], tasks: &[Task]) -> anyhow::Result<()> {
        save_json_atomic(&self.projects_path, projects)
            .with_context(|| format!("failed to save {PROJECTS_ENTRY}"))?;
        save_json_atomic(&self.tasks_path, tasks)
            .with_context(|| format!("failed to save {TASKS_ENTRY}"))?;
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_entry<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(file = %path.display(), "no stored entry");
            return Vec::new();
        }
        Err(err) => {
            warn!(file = %path.display(), error = %err, "failed reading stored entry; treating as empty");
            return Vec::new();
        }
    };

    if raw.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => items,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "stored entry is corrupt; treating as empty");
            Vec::new()
        }
    }
}

#[tracing::instrument(skip(path, items))]
fn save_json_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving entry atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut temp, items)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::model::{NewProject, NewTask};

    #[test]
    fn empty_directory_loads_empty_collections() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        let (projects, tasks) = store.load();
        assert!(projects.is_empty());
        assert!(tasks.is_empty());
    }

    #[test]
    fn save_then_load_is_deep_equal() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        let now = Utc::now();

        let project = Project::from_new(
            "p-1".to_string(),
            NewProject {
                name: "Home".to_string(),
                ..NewProject::default()
            },
            now,
        );
        let task = Task::from_new(
            "t-1".to_string(),
            NewTask {
                project_id: project.id.clone(),
                title: "Water plants".to_string(),
                due_date: now.naive_local().date().and_hms_opt(8, 30, 0),
                ..NewTask::default()
            },
            now,
        );

        let projects = vec![project];
        let tasks = vec![task];
        store.save(&projects, &tasks).expect("save");

        let (loaded_projects, loaded_tasks) = store.load();
        assert_eq!(loaded_projects, projects);
        assert_eq!(loaded_tasks, tasks);
    }

    #[test]
    fn corrupt_entry_is_treated_as_absent() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        fs::write(&store.projects_path, "{not json").expect("write garbage");
        fs::write(&store.tasks_path, "[]").expect("write tasks");

        let (projects, tasks) = store.load();
        assert!(projects.is_empty());
        assert!(tasks.is_empty());
    }
}
