use crate::models::Task;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error};

pub mod json;
pub mod migrations;
pub mod sqlite;

pub use json::JsonStorage;
pub use sqlite::SqliteStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Json,
    Sqlite,
}

impl StorageType {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::Json => "json",
            StorageType::Sqlite => "sqlite",
        }
    }
}

impl FromStr for StorageType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(StorageType::Json),
            "sqlite" => Ok(StorageType::Sqlite),
            other => Err(StorageError::Storage(format!(
                "Unknown storage type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend that persists the whole task collection at once.
pub trait Storage: Send + Sync {
    /// Replaces everything stored with `tasks`, keeping their order.
    fn save(&self, tasks: &[Task]) -> Result<(), StorageError>;
    /// Returns the stored collection, or an empty one if nothing was saved yet.
    fn load(&self) -> Result<Vec<Task>, StorageError>;
    /// Human readable location, used in log lines.
    fn location(&self) -> String;
}

pub fn create_storage(
    storage_type: StorageType,
    path: &Path,
) -> Result<Box<dyn Storage>, StorageError> {
    match storage_type {
        StorageType::Json => Ok(Box::new(JsonStorage::new(path))),
        StorageType::Sqlite => Ok(Box::new(SqliteStorage::new(path)?)),
    }
}

/// Loads the collection, degrading to an empty list on any failure.
///
/// A corrupt or unreadable file is logged and otherwise ignored, so whatever
/// it held is lost once the next mutation saves over it.
pub fn load_or_empty(storage: &dyn Storage) -> Vec<Task> {
    match storage.load() {
        Ok(tasks) => {
            debug!(count = tasks.len(), location = %storage.location(), "loaded tasks");
            tasks
        }
        Err(e) => {
            error!(error = %e, location = %storage.location(), "Error loading tasks, starting with an empty list");
            Vec::new()
        }
    }
}

/// Saves the collection, logging instead of propagating failures.
pub fn save_or_log(storage: &dyn Storage, tasks: &[Task]) -> bool {
    match storage.save(tasks) {
        Ok(()) => {
            debug!(count = tasks.len(), location = %storage.location(), "saved tasks");
            true
        }
        Err(e) => {
            error!(error = %e, location = %storage.location(), "Error saving tasks");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TaskFields};
    use tempfile::NamedTempFile;

    fn sample_tasks() -> Vec<Task> {
        vec![
            Task::new("Buy milk").unwrap(),
            Task::with_fields(
                "File taxes",
                TaskFields {
                    priority: Some(Priority::High),
                    tags: vec!["money".to_string()],
                    ..Default::default()
                },
            )
            .unwrap(),
        ]
    }

    #[test]
    fn test_storage_factory() {
        let temp_dir = tempfile::tempdir().unwrap();

        for (storage_type, file) in [
            (StorageType::Json, "tasks.json"),
            (StorageType::Sqlite, "tasks.db"),
        ] {
            let storage = create_storage(storage_type, &temp_dir.path().join(file)).unwrap();
            storage.save(&sample_tasks()).unwrap();
            let loaded = storage.load().unwrap();
            assert_eq!(loaded.len(), 2, "{} backend", storage_type);
            assert_eq!(loaded[1].description, "File taxes");

            storage.save(&[]).unwrap();
            assert!(storage.load().unwrap().is_empty());
        }
    }

    #[test]
    fn test_storage_type_parsing() {
        assert_eq!("JSON".parse::<StorageType>().unwrap(), StorageType::Json);
        assert_eq!("sqlite".parse::<StorageType>().unwrap(), StorageType::Sqlite);
        assert!("yaml".parse::<StorageType>().is_err());
    }

    #[test]
    fn test_load_or_empty_swallows_corrupt_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "{ this is not json").unwrap();
        let storage = JsonStorage::new(temp_file.path());

        assert!(storage.load().is_err());
        assert!(load_or_empty(&storage).is_empty());
    }

    #[test]
    fn test_save_or_log_reports_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        // A directory cannot be overwritten as a file.
        let storage = JsonStorage::new(temp_dir.path());
        assert!(!save_or_log(&storage, &sample_tasks()));

        let storage = JsonStorage::new(temp_dir.path().join("tasks.json"));
        assert!(save_or_log(&storage, &sample_tasks()));
    }
}
