//! HTTP client for the task API.
//!
//! Every call returns a [`TransportError`] on network failure, non-success
//! status or an undecodable body. Callers decide what to do with it; the
//! data layer falls back to local storage.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::backend::StorageBackend;
use crate::model::{NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskQuery};

pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid API base URL {url}")]
    InvalidBaseUrl { url: String },

    #[error("failed building HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("{path} returned an empty body")]
    EmptyBody { path: String },

    #[error("failed decoding response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed encoding request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Calendar endpoints answer either with a bare list or with
/// `{ "tasks": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskListBody {
    Bare(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

impl TaskListBody {
    fn into_tasks(self) -> Vec<Task> {
        match self {
            TaskListBody::Bare(tasks) | TaskListBody::Wrapped { tasks } => tasks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed).map_err(|_| TransportError::InvalidBaseUrl {
            url: base_url.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidBaseUrl {
                url: base_url.to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidBaseUrl {
                url: self.base_url.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends one request. `Ok(None)` means the server answered 204.
    #[instrument(skip(self, url, body), fields(url = %url))]
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<Option<String>, TransportError> {
        let path = url.path().to_string();
        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await.map_err(|source| TransportError::Request {
            path: path.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                path,
                status: status.as_u16(),
            });
        }
        if status == StatusCode::NO_CONTENT {
            debug!(path = %path, "no content");
            return Ok(None);
        }

        let text = response
            .text()
            .await
            .map_err(|source| TransportError::Request {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path, status = status.as_u16(), bytes = text.len(), "response received");
        Ok(Some(text))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<T, TransportError> {
        let path = url.path().to_string();
        let text = self
            .execute(method, url, body)
            .await?
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| TransportError::EmptyBody { path: path.clone() })?;
        serde_json::from_str(&text).map_err(|source| TransportError::Decode { path, source })
    }

    async fn send_ignoring_body(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<(), TransportError> {
        self.execute(method, url, body).await.map(|_| ())
    }
}

/// Integer-looking ids go out as JSON numbers, everything else as strings.
fn wire_id(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

#[async_trait]
impl StorageBackend for RemoteBackend {
    type Error = TransportError;

    async fn health(&self) -> Result<(), TransportError> {
        let url = self.endpoint(&["health"])?;
        self.send_ignoring_body(Method::GET, url, None).await
    }

    async fn list_projects(&mut self) -> Result<Vec<Project>, TransportError> {
        let url = self.endpoint(&["projects"])?;
        self.fetch(Method::GET, url, None).await
    }

    async fn create_project(&mut self, fields: &NewProject) -> Result<Project, TransportError> {
        let url = self.endpoint(&["projects"])?;
        let body = serde_json::to_vec(fields)?;
        self.fetch(Method::POST, url, Some(body)).await
    }

    async fn update_project(
        &mut self,
        id: &str,
        patch: &ProjectPatch,
    ) -> Result<Option<Project>, TransportError> {
        let url = self.endpoint(&["projects", id])?;
        let body = serde_json::to_vec(patch)?;
        self.fetch(Method::PUT, url, Some(body)).await.map(Some)
    }

    async fn delete_project(&mut self, id: &str) -> Result<(), TransportError> {
        let url = self.endpoint(&["projects", id])?;
        self.send_ignoring_body(Method::DELETE, url, None).await
    }

    async fn list_tasks(&mut self, query: &TaskQuery) -> Result<Vec<Task>, TransportError> {
        let mut url = self.endpoint(&["tasks"])?;
        let pairs = query.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        self.fetch(Method::GET, url, None).await
    }

    async fn create_task(&mut self, fields: &NewTask) -> Result<Task, TransportError> {
        let url = self.endpoint(&["tasks"])?;
        let mut body = serde_json::to_value(fields)?;
        body["project_id"] = wire_id(&fields.project_id);
        self.fetch(Method::POST, url, Some(serde_json::to_vec(&body)?))
            .await
    }

    async fn update_task(
        &mut self,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, TransportError> {
        let url = self.endpoint(&["tasks", id])?;
        let body = serde_json::to_vec(patch)?;
        self.fetch(Method::PUT, url, Some(body)).await.map(Some)
    }

    async fn delete_task(&mut self, id: &str) -> Result<(), TransportError> {
        let url = self.endpoint(&["tasks", id])?;
        self.send_ignoring_body(Method::DELETE, url, None).await
    }

    async fn toggle_task(&mut self, id: &str) -> Result<Option<Task>, TransportError> {
        let url = self.endpoint(&["tasks", "toggle", id])?;
        self.fetch(Method::PUT, url, None).await.map(Some)
    }

    async fn reorder_tasks(&mut self, ids: &[String]) -> Result<(), TransportError> {
        let url = self.endpoint(&["tasks", "reorder"])?;
        let task_ids: Vec<Value> = ids.iter().map(|id| wire_id(id)).collect();
        let body = serde_json::to_vec(&json!({ "task_ids": task_ids }))?;
        self.send_ignoring_body(Method::POST, url, Some(body)).await
    }

    async fn month_tasks(&mut self, year: i32, month: u32) -> Result<Vec<Task>, TransportError> {
        let url = self.endpoint(&["calendar", "month", &year.to_string(), &month.to_string()])?;
        self.fetch::<TaskListBody>(Method::GET, url, None)
            .await
            .map(TaskListBody::into_tasks)
    }

    async fn week_tasks(&mut self, year: i32, week: u32) -> Result<Vec<Task>, TransportError> {
        let url = self.endpoint(&["calendar", "week", &year.to_string(), &week.to_string()])?;
        self.fetch::<TaskListBody>(Method::GET, url, None)
            .await
            .map(TaskListBody::into_tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_extend_the_base_path() {
        let remote =
            RemoteBackend::new("http://localhost:5000/api/", DEFAULT_TIMEOUT).expect("remote");
        let url = remote.endpoint(&["tasks", "toggle", "42"]).expect("endpoint");
        assert_eq!(url.as_str(), "http://localhost:5000/api/tasks/toggle/42");
    }

    #[test]
    fn ids_are_escaped_as_single_segments() {
        let remote =
            RemoteBackend::new("http://localhost:5000/api", DEFAULT_TIMEOUT).expect("remote");
        let url = remote.endpoint(&["projects", "a/b"]).expect("endpoint");
        assert_eq!(url.as_str(), "http://localhost:5000/api/projects/a%2Fb");
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            RemoteBackend::new("not a url", DEFAULT_TIMEOUT),
            Err(TransportError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            RemoteBackend::new("mailto:someone@example.com", DEFAULT_TIMEOUT),
            Err(TransportError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn numeric_ids_go_out_as_numbers() {
        assert_eq!(wire_id("12"), json!(12));
        assert_eq!(wire_id("b7c1"), json!("b7c1"));
    }
}
