//! Task tracker capability
//!
//! The pipeline only needs to list the tasks already in a scope and to
//! create new ones. [`RestTaskTracker`] is a thin REST client for trackers
//! with a Todoist-style API.
//!
//! A scope is a due date: `YYYY-MM-DD`, or `today`.

use crate::error::TrackerError;
use async_trait::async_trait;
use chrono::NaiveDate;
use jot_record::{TaskPriority, DEFAULT_DUE, DUE_DATE_FORMAT};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Identifier assigned by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Minimal task tracker interface
#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Texts of the tasks already present in `scope`
    async fn list_existing_tasks(&self, scope: &str) -> Result<Vec<String>, TrackerError>;

    /// Create a task due in `scope`
    async fn create_task(
        &self,
        text: &str,
        priority: TaskPriority,
        scope: &str,
    ) -> Result<TaskId, TrackerError>;
}

/// REST tracker client authenticated with a bearer token
#[derive(Debug, Clone)]
pub struct RestTaskTracker {
    client: Client,
    base_url: String,
}

impl RestTaskTracker {
    /// Build a client for `base_url`
    ///
    /// # Errors
    /// Returns [`TrackerError::Config`] for a blank or unusable token
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> Result<Self, TrackerError> {
        if token.trim().is_empty() {
            return Err(TrackerError::Config("missing tracker API token".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| TrackerError::Config("invalid tracker API token".to_string()))?,
        );
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TrackerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(TrackerError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Calendar date a scope stands for, `None` when it is not a date
fn scope_date(scope: &str) -> Option<NaiveDate> {
    let scope = scope.trim();
    if scope.eq_ignore_ascii_case(DEFAULT_DUE) {
        return Some(chrono::Local::now().date_naive());
    }
    NaiveDate::parse_from_str(scope, DUE_DATE_FORMAT).ok()
}

/// Texts of the tasks due on `date`
fn due_on(tasks: Vec<TaskRecord>, date: NaiveDate) -> Vec<String> {
    tasks
        .into_iter()
        .filter(|task| task.due_date() == Some(date))
        .map(|task| task.content.trim().to_string())
        .filter(|content| !content.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct TaskRecord {
    id: String,
    content: String,
    #[serde(default)]
    due: Option<TaskDue>,
}

impl TaskRecord {
    fn due_date(&self) -> Option<NaiveDate> {
        // dated tasks carry a plain date, timed ones a datetime
        let date = self.due.as_ref()?.date.get(..10)?;
        NaiveDate::parse_from_str(date, DUE_DATE_FORMAT).ok()
    }
}

#[derive(Debug, Deserialize)]
struct TaskDue {
    date: String,
}

#[derive(Debug, Serialize)]
struct NewTask<'a> {
    content: &'a str,
    priority: u8,
    #[serde(flatten)]
    due: NewDue<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum NewDue<'a> {
    DueDate(String),
    DueString(&'a str),
}

impl<'a> NewDue<'a> {
    fn for_scope(scope: &'a str) -> Self {
        match NaiveDate::parse_from_str(scope.trim(), DUE_DATE_FORMAT) {
            Ok(date) => Self::DueDate(date.format(DUE_DATE_FORMAT).to_string()),
            Err(_) => Self::DueString(scope),
        }
    }
}

#[async_trait]
impl TaskTracker for RestTaskTracker {
    async fn list_existing_tasks(&self, scope: &str) -> Result<Vec<String>, TrackerError> {
        let date = scope_date(scope)
            .ok_or_else(|| TrackerError::Rejected(format!("scope '{scope}' is not a date")))?;
        let response = self.client.get(self.tasks_url()).send().await?;
        let tasks: Vec<TaskRecord> = Self::check(response).await?.json().await?;
        let total = tasks.len();
        let existing = due_on(tasks, date);
        tracing::debug!(
            "Tracker lists {} of {} task(s) due {}",
            existing.len(),
            total,
            date
        );
        Ok(existing)
    }

    async fn create_task(
        &self,
        text: &str,
        priority: TaskPriority,
        scope: &str,
    ) -> Result<TaskId, TrackerError> {
        let body = NewTask {
            content: text,
            priority: priority.api_value(),
            due: NewDue::for_scope(scope),
        };
        let response = self.client.post(self.tasks_url()).json(&body).send().await?;
        let task: TaskRecord = Self::check(response).await?.json().await?;
        Ok(TaskId(task.id))
    }
}
