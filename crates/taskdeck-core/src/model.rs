use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::datetime::{utc_timestamp_serde, wall_clock_serde};

pub const DEFAULT_PROJECT_COLOR: &str = "#667eea";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Completed,
}

impl Status {
    pub fn toggled(self) -> Self {
        match self {
            Status::Pending => Status::Completed,
            Status::Completed => Status::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "completed" => Ok(Status::Completed),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    #[serde(deserialize_with = "id_from_string_or_int")]
    pub id: String,

    pub name: String,

    #[serde(default, deserialize_with = "string_or_null")]
    pub description: String,

    #[serde(default = "default_color", deserialize_with = "color_or_default")]
    pub color: String,

    #[serde(with = "utc_timestamp_serde")]
    pub created_at: DateTime<Utc>,

    /// Reported by the remote API only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_count: Option<u64>,
}

impl Project {
    pub fn from_new(id: String, fields: NewProject, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: fields.name,
            description: fields.description.unwrap_or_default(),
            color: fields
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(default_color),
            created_at: now,
            task_count: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    #[serde(deserialize_with = "id_from_string_or_int")]
    pub id: String,

    #[serde(deserialize_with = "id_from_string_or_int")]
    pub project_id: String,

    pub title: String,

    #[serde(default, deserialize_with = "string_or_null")]
    pub description: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, with = "wall_clock_serde::option")]
    pub due_date: Option<NaiveDateTime>,

    #[serde(default, with = "wall_clock_serde::option")]
    pub reminder_date: Option<NaiveDateTime>,

    #[serde(default)]
    pub order: i64,

    #[serde(with = "utc_timestamp_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "utc_timestamp_serde")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn from_new(id: String, fields: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            project_id: fields.project_id,
            title: fields.title,
            description: fields.description.unwrap_or_default(),
            status: Status::Pending,
            priority: fields.priority.unwrap_or_default(),
            due_date: fields.due_date,
            reminder_date: fields.reminder_date,
            order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn toggle_status(&mut self, now: DateTime<Utc>) {
        self.status = self.status.toggled();
        self.touch(now);
    }

    /// Bumps `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ProjectPatch {
    pub fn apply(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(description) = &self.description {
            project.description = description.clone();
        }
        if let Some(color) = &self.color {
            project.color = color.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct NewTask {
    pub project_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "wall_clock_serde::option"
    )]
    pub due_date: Option<NaiveDateTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "wall_clock_serde::option"
    )]
    pub reminder_date: Option<NaiveDateTime>,
}

/// Partial task update. The nested options on dates distinguish "leave
/// alone" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_cleared_wall_clock"
    )]
    pub due_date: Option<Option<NaiveDateTime>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_cleared_wall_clock"
    )]
    pub reminder_date: Option<Option<NaiveDateTime>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(reminder) = self.reminder_date {
            task.reminder_date = reminder;
        }
        if let Some(order) = self.order {
            task.order = order;
        }
        task.touch(now);
    }
}

/// Server-side task list filters; every set field narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub project_id: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
}

impl TaskQuery {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self == &Self::default()
    }

    /// Query-string pairs; empty values are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(project_id) = self.project_id.as_ref().filter(|p| !p.is_empty()) {
            pairs.push(("project_id", project_id.clone()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.to_string()));
        }
        if let Some(start) = self.start_date {
            pairs.push(("start_date", start.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("end_date", end.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }
        pairs
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(project_id) = self.project_id.as_ref().filter(|p| !p.is_empty())
            && &task.project_id != project_id
        {
            return false;
        }
        if let Some(status) = self.status
            && task.status != status
        {
            return false;
        }
        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }
        if let Some(start) = self.start_date
            && !task.due_date.is_some_and(|due| due >= start)
        {
            return false;
        }
        if let Some(end) = self.end_date
            && !task.due_date.is_some_and(|due| due <= end)
        {
            return false;
        }
        true
    }
}

fn default_color() -> String {
    DEFAULT_PROJECT_COLOR.to_string()
}

fn id_from_string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn color_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(default_color))
}

fn serialize_cleared_wall_clock<S>(
    value: &Option<Option<NaiveDateTime>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(Some(when)) => {
            serializer.serialize_str(&when.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        _ => serializer.serialize_none(),
    }
}
