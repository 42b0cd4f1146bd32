//! Data access layer: one CRUD surface over projects and tasks.
//!
//! Each operation tries the remote API while the session is online. A
//! failed remote call marks the session offline and the same call is served
//! from the local backend; the caller always gets a result. Successful remote
//! results are mirrored into the local backend so it stays usable.

use std::convert::Infallible;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::backend::{LocalBackend, StorageBackend};
use crate::config::ApiSettings;
use crate::connectivity::ConnectivityPolicy;
use crate::local_store::LocalStore;
use crate::model::{NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskQuery};
use crate::remote::{RemoteBackend, TransportError};

fn local<T>(result: Result<T, Infallible>) -> T {
    result.unwrap_or_else(|never| match never {})
}

pub struct TaskManager<R = RemoteBackend> {
    remote: R,
    local: LocalBackend,
    connectivity: ConnectivityPolicy,
}

impl<R> std::fmt::Debug for TaskManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("local", &self.local)
            .field("connectivity", &self.connectivity)
            .finish_non_exhaustive()
    }
}

impl TaskManager<RemoteBackend> {
    /// Wires the configured remote API to the local store under `data_dir`.
    /// With the API disabled the session starts offline and never probes.
    pub fn open(api: &ApiSettings, data_dir: &Path) -> anyhow::Result<Self> {
        let store = LocalStore::open(data_dir)
            .with_context(|| format!("failed to open local store at {}", data_dir.display()))?;
        let remote = RemoteBackend::new(&api.base_url, api.timeout)
            .with_context(|| format!("invalid api.base: {}", api.base_url))?;

        let connectivity = if api.enabled {
            ConnectivityPolicy::new()
        } else {
            info!("remote API disabled; using local storage only");
            ConnectivityPolicy::offline()
        };

        Ok(Self::new(remote, LocalBackend::open(store), connectivity))
    }
}

impl<R> TaskManager<R>
where
    R: StorageBackend<Error = TransportError> + Sync,
{
    pub fn new(remote: R, local: LocalBackend, connectivity: ConnectivityPolicy) -> Self {
        Self {
            remote,
            local,
            connectivity,
        }
    }

    pub fn connectivity(&self) -> &ConnectivityPolicy {
        &self.connectivity
    }

    pub fn local(&self) -> &LocalBackend {
        &self.local
    }

    /// Last known projects, without touching the network.
    pub fn projects(&self) -> &[Project] {
        self.local.projects()
    }

    /// Last known tasks, without touching the network.
    pub fn tasks(&self) -> &[Task] {
        self.local.tasks()
    }

    async fn use_remote(&self) -> bool {
        self.connectivity.probe(&self.remote).await
    }

    fn remote_failed(&self, operation: &'static str, err: &TransportError) {
        warn!(
            operation,
            status = ?err.status(),
            error = %err,
            "remote call failed; falling back to local storage"
        );
        self.connectivity.mark_offline();
    }

    /// Probes the remote and, when it answers, pulls full collections into
    /// the local mirror. Returns whether the session is online.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> bool {
        if !self.use_remote().await {
            return false;
        }
        self.list_projects().await;
        self.list_tasks(&TaskQuery::default()).await;
        self.connectivity.is_online()
    }

    #[instrument(skip(self))]
    pub async fn list_projects(&mut self) -> Vec<Project> {
        if self.use_remote().await {
            match self.remote.list_projects().await {
                Ok(projects) => {
                    self.local.replace_projects(projects.clone());
                    return projects;
                }
                Err(err) => self.remote_failed("list_projects", &err),
            }
        }
        local(self.local.list_projects().await)
    }

    #[instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn create_project(&mut self, fields: NewProject) -> Project {
        if self.use_remote().await {
            match self.remote.create_project(&fields).await {
                Ok(project) => {
                    self.local.upsert_project(project.clone());
                    return project;
                }
                Err(err) => self.remote_failed("create_project", &err),
            }
        }
        local(self.local.create_project(&fields).await)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_project(&mut self, id: &str, patch: ProjectPatch) -> Option<Project> {
        if self.use_remote().await {
            match self.remote.update_project(id, &patch).await {
                Ok(project) => {
                    if let Some(project) = &project {
                        self.local.upsert_project(project.clone());
                    }
                    return project;
                }
                Err(err) => self.remote_failed("update_project", &err),
            }
        }
        local(self.local.update_project(id, &patch).await)
    }

    /// Removes the project and every task that belongs to it.
    #[instrument(skip(self))]
    pub async fn delete_project(&mut self, id: &str) {
        if self.use_remote().await {
            match self.remote.delete_project(id).await {
                Ok(()) => {
                    self.local.mirror_delete_project(id);
                    return;
                }
                Err(err) => self.remote_failed("delete_project", &err),
            }
        }
        local(self.local.delete_project(id).await)
    }

    #[instrument(skip(self))]
    pub async fn list_tasks(&mut self, query: &TaskQuery) -> Vec<Task> {
        if self.use_remote().await {
            match self.remote.list_tasks(query).await {
                Ok(tasks) => {
                    if query.is_unfiltered() {
                        self.local.replace_tasks(tasks.clone());
                    } else {
                        self.local.upsert_tasks(tasks.clone());
                    }
                    return tasks;
                }
                Err(err) => self.remote_failed("list_tasks", &err),
            }
        }
        local(self.local.list_tasks(query).await)
    }

    #[instrument(skip(self, fields), fields(project_id = %fields.project_id))]
    pub async fn create_task(&mut self, fields: NewTask) -> Task {
        if self.use_remote().await {
            match self.remote.create_task(&fields).await {
                Ok(task) => {
                    self.local.upsert_task(task.clone());
                    return task;
                }
                Err(err) => self.remote_failed("create_task", &err),
            }
        }
        local(self.local.create_task(&fields).await)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&mut self, id: &str, patch: TaskPatch) -> Option<Task> {
        if self.use_remote().await {
            match self.remote.update_task(id, &patch).await {
                Ok(task) => {
                    if let Some(task) = &task {
                        self.local.upsert_task(task.clone());
                    }
                    return task;
                }
                Err(err) => self.remote_failed("update_task", &err),
            }
        }
        local(self.local.update_task(id, &patch).await)
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&mut self, id: &str) {
        if self.use_remote().await {
            match self.remote.delete_task(id).await {
                Ok(()) => {
                    self.local.mirror_delete_task(id);
                    return;
                }
                Err(err) => self.remote_failed("delete_task", &err),
            }
        }
        local(self.local.delete_task(id).await)
    }

    /// Flips pending/completed. `None` when the task is unknown.
    #[instrument(skip(self))]
    pub async fn toggle_status(&mut self, id: &str) -> Option<Task> {
        if self.use_remote().await {
            match self.remote.toggle_task(id).await {
                Ok(task) => {
                    if let Some(task) = &task {
                        self.local.upsert_task(task.clone());
                    }
                    return task;
                }
                Err(err) => self.remote_failed("toggle_status", &err),
            }
        }
        local(self.local.toggle_task(id).await)
    }

    /// Sets `order` to the position in `ids` for every listed task. Unknown
    /// ids are skipped and unlisted tasks keep their current `order`.
    #[instrument(skip(self))]
    pub async fn reorder(&mut self, ids: &[String]) {
        if self.use_remote().await {
            match self.remote.reorder_tasks(ids).await {
                Ok(()) => {
                    self.local.mirror_reorder(ids);
                    return;
                }
                Err(err) => self.remote_failed("reorder", &err),
            }
        }
        local(self.local.reorder_tasks(ids).await)
    }

    #[instrument(skip(self))]
    pub async fn month_tasks(&mut self, year: i32, month: u32) -> Vec<Task> {
        if self.use_remote().await {
            match self.remote.month_tasks(year, month).await {
                Ok(tasks) => {
                    self.local.upsert_tasks(tasks.clone());
                    return tasks;
                }
                Err(err) => self.remote_failed("month_tasks", &err),
            }
        }
        debug!("computing month tasks locally");
        local(self.local.month_tasks(year, month).await)
    }

    #[instrument(skip(self))]
    pub async fn week_tasks(&mut self, year: i32, week: u32) -> Vec<Task> {
        if self.use_remote().await {
            match self.remote.week_tasks(year, week).await {
                Ok(tasks) => {
                    self.local.upsert_tasks(tasks.clone());
                    return tasks;
                }
                Err(err) => self.remote_failed("week_tasks", &err),
            }
        }
        debug!("computing week tasks locally");
        local(self.local.week_tasks(year, week).await)
    }
}
