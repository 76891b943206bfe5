use super::{migrations, Storage, StorageError};
use crate::models::{Priority, Task, DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Version 1 of the schema. Later columns come from [`migrations::MIGRATIONS`].
const INIT_SCHEMA: &str = r#"
-- Create schema version table first
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Position keeps insertion order; id is the stable task identifier
CREATE TABLE IF NOT EXISTS tasks (
    position INTEGER PRIMARY KEY,
    id TEXT NOT NULL,
    description TEXT NOT NULL,
    completed BOOLEAN NOT NULL DEFAULT 0,
    priority TEXT NOT NULL,
    due_date TEXT,
    category TEXT NOT NULL,
    tags TEXT NOT NULL
);
"#;

pub struct SqliteStorage {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = PathBuf::from(shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&path)
            .map_err(|e| StorageError::Storage(format!("Failed to open database: {}", e)))?;
        Self::init_schema(&mut conn)?;

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &mut Connection) -> Result<(), StorageError> {
        conn.execute_batch(INIT_SCHEMA)
            .map_err(|e| StorageError::Storage(format!("Failed to create schema: {}", e)))?;

        let versions: i64 =
            conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
        if versions == 0 {
            conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        }

        migrations::apply_migrations(conn)
    }

    fn get_connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Storage(format!("Failed to lock connection: {}", e)))
    }

    fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
        let id: String = row.get(0)?;
        let priority: String = row.get(3)?;
        let due_date: Option<String> = row.get(4)?;
        let tags: String = row.get(6)?;
        let start_time: Option<String> = row.get(7)?;
        let end_time: Option<String> = row.get(8)?;

        Ok(Task {
            id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
            description: row.get(1)?,
            completed: row.get(2)?,
            priority: priority
                .parse::<Priority>()
                .map_err(|e| conversion_error(3, e))?,
            due_date: due_date
                .map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT))
                .transpose()
                .map_err(|e| conversion_error(4, e))?,
            category: row.get(5)?,
            tags: serde_json::from_str(&tags).map_err(|e| conversion_error(6, e))?,
            start_time: parse_timestamp(start_time).map_err(|e| conversion_error(7, e))?,
            end_time: parse_timestamp(end_time).map_err(|e| conversion_error(8, e))?,
        })
    }
}

fn conversion_error<E>(column: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

fn parse_timestamp(value: Option<String>) -> Result<Option<NaiveDateTime>, chrono::ParseError> {
    value
        .map(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT))
        .transpose()
}

fn format_timestamp(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
}

impl Storage for SqliteStorage {
    fn save(&self, tasks: &[Task]) -> Result<(), StorageError> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM tasks", [])?;

        for (position, task) in tasks.iter().enumerate() {
            tx.execute(
                "INSERT INTO tasks (position, id, description, completed, priority, due_date, category, tags, start_time, end_time) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    position as i64,
                    task.id.to_string(),
                    task.description,
                    task.completed,
                    task.priority.as_str(),
                    task.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    task.category,
                    serde_json::to_string(&task.tags)?,
                    format_timestamp(task.start_time),
                    format_timestamp(task.end_time),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<Task>, StorageError> {
        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare("SELECT id, description, completed, priority, due_date, category, tags, start_time, end_time FROM tasks ORDER BY position")
            .map_err(|e| StorageError::Storage(format!("Failed to prepare tasks query: {}", e)))?;

        let task_iter = stmt
            .query_map([], Self::row_to_task)
            .map_err(|e| StorageError::Storage(format!("Failed to query tasks: {}", e)))?;

        let mut tasks = Vec::new();
        for task in task_iter {
            tasks.push(
                task.map_err(|e| StorageError::InvalidData(format!("Failed to read task: {}", e)))?,
            );
        }
        Ok(tasks)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
