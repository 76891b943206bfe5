//! The task-list engine.
//!
//! [`TodoList`] owns the ordered task collection and re-saves all of it after
//! every mutation. Tasks are addressed through [`TaskKey`], either by their
//! current position or by their stable [`TaskId`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};
use tracing::info;

use crate::models::{Priority, Task, TaskError, TaskFields, TaskId, TaskUpdate};
use crate::storage::{load_or_empty, save_or_log, Storage};

/// Handle used when more than one front end drives the same list.
pub type SharedTodoList = Arc<Mutex<TodoList>>;

/// Locks a shared list. A panic in another holder cannot leave the
/// collection half-updated, so a poisoned lock is taken over as is.
pub fn lock(list: &SharedTodoList) -> MutexGuard<'_, TodoList> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKey {
    Index(usize),
    Id(TaskId),
}

impl From<usize> for TaskKey {
    fn from(index: usize) -> Self {
        TaskKey::Index(index)
    }
}

impl From<TaskId> for TaskKey {
    fn from(id: TaskId) -> Self {
        TaskKey::Id(id)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Index(index) => write!(f, "{}", index),
            TaskKey::Id(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Priority,
    DueDate,
    Added,
}

impl SortKey {
    /// Unrecognized names fall back to insertion order.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "priority" => SortKey::Priority,
            "due_date" | "due" => SortKey::DueDate,
            _ => SortKey::Added,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring of the description.
    pub term: Option<String>,
    pub category: Option<String>,
    /// Matches when the task carries any of these.
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
    /// Due between today and today + N days, both ends included.
    pub due_within_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub by_priority: BTreeMap<Priority, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub overdue: usize,
    pub completion_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimateSource {
    /// Average over this many timed, comparable tasks.
    History(usize),
    PriorityDefault,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    InsufficientData,
    Estimate { minutes: f64, source: EstimateSource },
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::InsufficientData => f.write_str("Insufficient data for prediction"),
            Prediction::Estimate { minutes, .. } => {
                let total = minutes.max(0.0) as u64;
                let (hours, minutes) = (total / 60, total % 60);
                if hours > 0 {
                    write!(f, "{}h {}m", hours, minutes)
                } else {
                    write!(f, "{} minutes", minutes)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryHabit {
    /// Completions in this category divided by the total number of tasks.
    pub completion_rate: f64,
    /// Sample standard deviation of the per-weekday completion counts.
    pub consistency: f64,
    pub peak_day: Weekday,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HabitReport {
    pub peak_day: Option<Weekday>,
    pub categories: BTreeMap<String, CategoryHabit>,
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Completion counts indexed by days from Monday.
type WeekCounts = [usize; 7];

/// Busiest day; ties go to the day earliest in the week.
fn peak_day(counts: &WeekCounts) -> Option<Weekday> {
    let mut best: Option<(usize, usize)> = None;
    for (day, &count) in counts.iter().enumerate() {
        if count > 0 && best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((day, count));
        }
    }
    best.map(|(day, _)| weekday_from_monday(day))
}

fn weekday_from_monday(days: usize) -> Weekday {
    let mut day = Weekday::Mon;
    for _ in 0..days {
        day = day.succ();
    }
    day
}

fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

pub struct TodoList {
    tasks: Vec<Task>,
    storage: Box<dyn Storage>,
}

impl TodoList {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        let tasks = load_or_empty(storage.as_ref());
        Self { tasks, storage }
    }

    pub fn into_shared(self) -> SharedTodoList {
        Arc::new(Mutex::new(self))
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn id_at(&self, index: usize) -> Option<TaskId> {
        self.tasks.get(index).map(|task| task.id)
    }

    pub fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    pub fn get(&self, key: impl Into<TaskKey>) -> Result<&Task, TaskError> {
        let index = self.position(key.into())?;
        Ok(&self.tasks[index])
    }

    fn position(&self, key: TaskKey) -> Result<usize, TaskError> {
        let index = match key {
            TaskKey::Index(index) if index < self.tasks.len() => Some(index),
            TaskKey::Index(_) => None,
            TaskKey::Id(id) => self.index_of(id),
        };
        index.ok_or_else(|| TaskError::InvalidTaskId(key.to_string()))
    }

    fn save(&self) {
        save_or_log(self.storage.as_ref(), &self.tasks);
    }

    pub fn add(
        &mut self,
        description: impl Into<String>,
        fields: TaskFields,
    ) -> Result<TaskId, TaskError> {
        let task = Task::with_fields(description, fields)?;
        let id = task.id;
        info!(%id, description = %task.description, "adding task");
        self.tasks.push(task);
        self.save();
        Ok(id)
    }

    /// Applies the fields present in `update`. Nothing changes on error.
    pub fn edit(
        &mut self,
        key: impl Into<TaskKey>,
        update: TaskUpdate,
    ) -> Result<&Task, TaskError> {
        let index = self.position(key.into())?;
        update.validate()?;
        self.tasks[index].apply(update);
        info!(id = %self.tasks[index].id, "edited task");
        self.save();
        Ok(&self.tasks[index])
    }

    pub fn mark_completed(
        &mut self,
        key: impl Into<TaskKey>,
        completed: bool,
    ) -> Result<(), TaskError> {
        let index = self.position(key.into())?;
        self.tasks[index].completed = completed;
        info!(id = %self.tasks[index].id, completed, "updated completion");
        self.save();
        Ok(())
    }

    /// Records that work on the task has begun.
    pub fn start(&mut self, key: impl Into<TaskKey>) -> Result<(), TaskError> {
        let index = self.position(key.into())?;
        self.tasks[index].start();
        info!(id = %self.tasks[index].id, "started task");
        self.save();
        Ok(())
    }

    /// Records the end of work and marks the task completed.
    pub fn finish(&mut self, key: impl Into<TaskKey>) -> Result<(), TaskError> {
        let index = self.position(key.into())?;
        let task = &mut self.tasks[index];
        task.complete();
        task.completed = true;
        info!(id = %task.id, "finished task");
        self.save();
        Ok(())
    }

    /// Removes a task. Positions of every later task shift down by one.
    pub fn delete(&mut self, key: impl Into<TaskKey>) -> Result<Task, TaskError> {
        let index = self.position(key.into())?;
        let task = self.tasks.remove(index);
        info!(id = %task.id, "deleted task");
        self.save();
        Ok(task)
    }

    /// A filtered, sorted copy; the stored order is never touched.
    pub fn view(&self, filter_completed: Option<bool>, sort_by: SortKey) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| filter_completed.map_or(true, |completed| task.completed == completed))
            .collect();

        match sort_by {
            SortKey::Priority => tasks.sort_by_key(|task| task.priority.rank()),
            // Undated tasks sort as if due on the last representable date.
            SortKey::DueDate => tasks.sort_by_key(|task| task.due_date.unwrap_or(NaiveDate::MAX)),
            SortKey::Added => {}
        }
        tasks
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<&Task> {
        self.search_as_of(query, today())
    }

    pub fn search_as_of(&self, query: &SearchQuery, today: NaiveDate) -> Vec<&Task> {
        let term = query
            .term
            .as_deref()
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);
        let category = query.category.as_deref().filter(|c| !c.is_empty());
        let window_end = query
            .due_within_days
            .map(|days| today.checked_add_days(Days::new(days.into())).unwrap_or(NaiveDate::MAX));

        self.tasks
            .iter()
            .filter(|task| {
                term.as_ref()
                    .map_or(true, |term| task.description.to_lowercase().contains(term))
            })
            .filter(|task| category.map_or(true, |category| task.category == category))
            .filter(|task| {
                query.tags.is_empty() || query.tags.iter().any(|tag| task.tags.contains(tag))
            })
            .filter(|task| query.priority.map_or(true, |priority| task.priority == priority))
            .filter(|task| {
                window_end.map_or(true, |end| {
                    task.due_date.is_some_and(|due| today <= due && due <= end)
                })
            })
            .collect()
    }

    pub fn stats(&self) -> TaskStats {
        self.stats_as_of(today())
    }

    pub fn stats_as_of(&self, today: NaiveDate) -> TaskStats {
        let mut by_priority = BTreeMap::new();
        let mut by_category = BTreeMap::new();

        for task in &self.tasks {
            *by_priority.entry(task.priority).or_insert(0) += 1;
            if !task.category.is_empty() {
                *by_category.entry(task.category.clone()).or_insert(0) += 1;
            }
        }

        let total = self.tasks.len();
        let completed = self.tasks.iter().filter(|task| task.completed).count();
        let completion_pct = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        TaskStats {
            total,
            completed,
            by_priority,
            by_category,
            overdue: self.tasks.iter().filter(|task| task.is_overdue(today)).count(),
            completion_pct,
        }
    }

    /// Estimates how long a task will take from completed tasks that share
    /// its category and priority.
    pub fn predict_completion_time(
        &self,
        key: impl Into<TaskKey>,
    ) -> Result<Prediction, TaskError> {
        let task = self.get(key)?;
        let similar: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.completed && t.category == task.category && t.priority == task.priority)
            .collect();

        if similar.is_empty() {
            return Ok(Prediction::InsufficientData);
        }

        let durations: Vec<f64> = similar.iter().filter_map(|t| t.elapsed_minutes()).collect();
        let prediction = if durations.is_empty() {
            Prediction::Estimate {
                minutes: task.priority.default_estimate_minutes(),
                source: EstimateSource::PriorityDefault,
            }
        } else {
            Prediction::Estimate {
                minutes: durations.iter().sum::<f64>() / durations.len() as f64,
                source: EstimateSource::History(durations.len()),
            }
        };
        Ok(prediction)
    }

    /// Looks for weekday patterns in completed tasks, keyed on their due date.
    pub fn analyze_habits(&self) -> HabitReport {
        let mut overall: WeekCounts = [0; 7];
        let mut per_category: BTreeMap<&str, WeekCounts> = BTreeMap::new();

        for task in self.tasks.iter().filter(|task| task.completed) {
            if let Some(due) = task.due_date {
                let day = due.weekday().num_days_from_monday() as usize;
                overall[day] += 1;
                per_category.entry(task.category.as_str()).or_insert([0; 7])[day] += 1;
            }
        }

        let total_tasks = self.tasks.len() as f64;
        let categories = per_category
            .into_iter()
            .filter_map(|(category, counts)| {
                let active: Vec<f64> = counts
                    .iter()
                    .filter(|&&count| count > 0)
                    .map(|&count| count as f64)
                    .collect();
                if active.len() < 3 {
                    return None;
                }
                let habit = CategoryHabit {
                    completion_rate: active.iter().sum::<f64>() / total_tasks,
                    consistency: sample_std_dev(&active),
                    peak_day: peak_day(&counts)?,
                };
                Some((category.to_string(), habit))
            })
            .collect();

        HabitReport {
            peak_day: peak_day(&overall),
            categories,
        }
    }
}
