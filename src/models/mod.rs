use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub type TaskId = Uuid;

pub const DEFAULT_CATEGORY: &str = "General";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: TaskId,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    // Older files predate these two fields.
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Optional values accepted when a task is created.
#[derive(Debug, Clone, Default)]
pub struct TaskFields {
    pub completed: bool,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Result<Self, TaskError> {
        Self::with_fields(description, TaskFields::default())
    }

    pub fn with_fields(
        description: impl Into<String>,
        fields: TaskFields,
    ) -> Result<Self, TaskError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(TaskError::EmptyDescription);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            description,
            completed: fields.completed,
            priority: fields.priority.unwrap_or_default(),
            due_date: fields.due_date,
            category: fields.category.unwrap_or_else(default_category),
            tags: fields.tags,
            start_time: None,
            end_time: None,
        })
    }

    /// Marks the moment work on the task began.
    pub fn start(&mut self) {
        self.start_time = Some(Local::now().naive_local());
    }

    /// Marks the moment work on the task ended. Does not touch `completed`.
    pub fn complete(&mut self) {
        self.end_time = Some(Local::now().naive_local());
    }

    pub fn elapsed_minutes(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 60_000.0),
            _ => None,
        }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }

    /// Applies every field present in `update`. Callers validate first.
    pub fn apply(&mut self, update: TaskUpdate) {
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(completed) = update.completed {
            self.completed = completed;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(due_date) = update.due_date {
            self.due_date = due_date;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
    }
}

/// A partial edit of a task.
///
/// `None` means "leave the field alone"; `Some` always overwrites, even with
/// an empty tag list or `false`. `due_date: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn due_date(mut self, due_date: Option<NaiveDate>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        match &self.description {
            Some(description) if description.trim().is_empty() => Err(TaskError::EmptyDescription),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error("Task description cannot be empty")]
    EmptyDescription,
    #[error("Priority must be low, medium, or high (got '{0}')")]
    InvalidPriority(String),
    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),
    #[error("Invalid due date '{0}', expected YYYY-MM-DD")]
    InvalidDueDate(String),
}

/// Variant order is the display rank: high sorts before medium before low.
#[derive(
    Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Fallback duration estimate when no timing history exists.
    pub fn default_estimate_minutes(self) -> f64 {
        match self {
            Priority::High => 30.0,
            Priority::Medium => 60.0,
            Priority::Low => 120.0,
        }
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(TaskError::InvalidPriority(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_due_date(value: &str) -> Result<NaiveDate, TaskError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| TaskError::InvalidDueDate(value.to_string()))
}

/// Splits comma separated tag input, dropping blank entries.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
