use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::{debug, error, instrument};

use crate::datetime::iso_week;
use crate::ids::{IdGenerator, UuidIds};
use crate::local_store::LocalStore;
use crate::model::{NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskQuery};

/// One place projects and tasks can live. The remote API and the on-device
/// store both implement it with the same record shapes.
#[async_trait]
pub trait StorageBackend: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn health(&self) -> Result<(), Self::Error>;

    async fn list_projects(&mut self) -> Result<Vec<Project>, Self::Error>;
    async fn create_project(&mut self, fields: &NewProject) -> Result<Project, Self::Error>;
    async fn update_project(
        &mut self,
        id: &str,
        patch: &ProjectPatch,
    ) -> Result<Option<Project>, Self::Error>;
    async fn delete_project(&mut self, id: &str) -> Result<(), Self::Error>;

    async fn list_tasks(&mut self, query: &TaskQuery) -> Result<Vec<Task>, Self::Error>;
    async fn create_task(&mut self, fields: &NewTask) -> Result<Task, Self::Error>;
    async fn update_task(
        &mut self,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, Self::Error>;
    async fn delete_task(&mut self, id: &str) -> Result<(), Self::Error>;
    async fn toggle_task(&mut self, id: &str) -> Result<Option<Task>, Self::Error>;
    async fn reorder_tasks(&mut self, ids: &[String]) -> Result<(), Self::Error>;

    async fn month_tasks(&mut self, year: i32, month: u32) -> Result<Vec<Task>, Self::Error>;
    async fn week_tasks(&mut self, year: i32, week: u32) -> Result<Vec<Task>, Self::Error>;
}

/// In-memory collections mirrored to a [`LocalStore`] after every change.
pub struct LocalBackend {
    store: LocalStore,
    ids: Arc<dyn IdGenerator>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("store", &self.store)
            .field("projects", &self.projects.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl LocalBackend {
    pub fn open(store: LocalStore) -> Self {
        Self::with_ids(store, Arc::new(UuidIds))
    }

    pub fn with_ids(store: LocalStore, ids: Arc<dyn IdGenerator>) -> Self {
        let (projects, tasks) = store.load();
        Self {
            store,
            ids,
            projects,
            tasks,
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Persists both collections. A failed write is logged and the
    /// in-memory state stays authoritative.
    fn persist(&self) {
        if let Err(err) = self.store.save(&self.projects, &self.tasks) {
            error!(error = %format!("{err:#}"), "failed persisting local store");
        }
    }

    pub fn replace_projects(&mut self, projects: Vec<Project>) {
        self.projects = projects;
        self.persist();
    }

    pub fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.persist();
    }

    pub fn upsert_project(&mut self, project: Project) {
        match self.projects.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => *existing = project,
            None => self.projects.push(project),
        }
        self.persist();
    }

    pub fn upsert_task(&mut self, task: Task) {
        self.upsert_tasks(vec![task]);
    }

    pub fn upsert_tasks(&mut self, tasks: Vec<Task>) {
        for task in tasks {
            match self.tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task,
                None => self.tasks.push(task),
            }
        }
        self.persist();
    }

    fn remove_project(&mut self, id: &str) {
        let before = (self.projects.len(), self.tasks.len());
        self.projects.retain(|p| p.id != id);
        self.tasks.retain(|t| t.project_id != id);
        debug!(
            id,
            projects_removed = before.0 - self.projects.len(),
            tasks_removed = before.1 - self.tasks.len(),
            "removed project"
        );
        self.persist();
    }

    fn remove_task(&mut self, id: &str) {
        self.tasks.retain(|t| t.id != id);
        self.persist();
    }

    fn apply_reorder(&mut self, ids: &[String]) {
        for (index, id) in ids.iter().enumerate() {
            if let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) {
                task.order = index as i64;
            }
        }
        self.persist();
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    type Error = Infallible;

    async fn health(&self) -> Result<(), Infallible> {
        Ok(())
    }

    async fn list_projects(&mut self) -> Result<Vec<Project>, Infallible> {
        Ok(self.projects.clone())
    }

    #[instrument(skip(self, fields))]
    async fn create_project(&mut self, fields: &NewProject) -> Result<Project, Infallible> {
        let project = Project::from_new(self.ids.next_id(), fields.clone(), Utc::now());
        debug!(id = %project.id, "created project locally");
        self.projects.push(project.clone());
        self.persist();
        Ok(project)
    }

    #[instrument(skip(self, patch))]
    async fn update_project(
        &mut self,
        id: &str,
        patch: &ProjectPatch,
    ) -> Result<Option<Project>, Infallible> {
        let Some(project) = self.projects.iter_mut().find(|p| p.id == id) else {
            debug!("project not found; nothing to update");
            return Ok(None);
        };
        patch.apply(project);
        let updated = project.clone();
        self.persist();
        Ok(Some(updated))
    }

    #[instrument(skip(self))]
    async fn delete_project(&mut self, id: &str) -> Result<(), Infallible> {
        self.remove_project(id);
        Ok(())
    }

    async fn list_tasks(&mut self, query: &TaskQuery) -> Result<Vec<Task>, Infallible> {
        Ok(self
            .tasks
            .iter()
            .filter(|task| query.matches(task))
            .cloned()
            .collect())
    }

    #[instrument(skip(self, fields))]
    async fn create_task(&mut self, fields: &NewTask) -> Result<Task, Infallible> {
        let task = Task::from_new(self.ids.next_id(), fields.clone(), Utc::now());
        debug!(id = %task.id, project_id = %task.project_id, "created task locally");
        self.tasks.push(task.clone());
        self.persist();
        Ok(task)
    }

    #[instrument(skip(self, patch))]
    async fn update_task(
        &mut self,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, Infallible> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("task not found; nothing to update");
            return Ok(None);
        };
        patch.apply(task, Utc::now());
        let updated = task.clone();
        self.persist();
        Ok(Some(updated))
    }

    #[instrument(skip(self))]
    async fn delete_task(&mut self, id: &str) -> Result<(), Infallible> {
        self.remove_task(id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn toggle_task(&mut self, id: &str) -> Result<Option<Task>, Infallible> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("task not found; nothing to toggle");
            return Ok(None);
        };
        task.toggle_status(Utc::now());
        let toggled = task.clone();
        self.persist();
        Ok(Some(toggled))
    }

    #[instrument(skip(self))]
    async fn reorder_tasks(&mut self, ids: &[String]) -> Result<(), Infallible> {
        self.apply_reorder(ids);
        Ok(())
    }

    async fn month_tasks(&mut self, year: i32, month: u32) -> Result<Vec<Task>, Infallible> {
        Ok(self
            .tasks
            .iter()
            .filter(|task| {
                task.due_date
                    .is_some_and(|due| due.year() == year && due.month() == month)
            })
            .cloned()
            .collect())
    }

    async fn week_tasks(&mut self, year: i32, week: u32) -> Result<Vec<Task>, Infallible> {
        Ok(self
            .tasks
            .iter()
            .filter(|task| {
                task.due_date
                    .is_some_and(|due| iso_week(due.date()) == week && due.year() == year)
            })
            .cloned()
            .collect())
    }
}

/// Mirror operations used after a successful remote call.
impl LocalBackend {
    pub fn mirror_delete_project(&mut self, id: &str) {
        self.remove_project(id);
    }

    pub fn mirror_delete_task(&mut self, id: &str) {
        self.remove_task(id);
    }

    pub fn mirror_reorder(&mut self, ids: &[String]) {
        self.apply_reorder(ids);
    }
}
