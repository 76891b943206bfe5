//! CSV export of the task collection.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::models::{Task, DATE_FORMAT};

const HEADER: [&str; 6] = [
    "Description",
    "Completed",
    "Priority",
    "Due Date",
    "Category",
    "Tags",
];

/// Quotes a field when it contains a delimiter, a quote or a line break.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<W: Write>(writer: &mut W, fields: &[&str]) -> io::Result<()> {
    let row: Vec<String> = fields.iter().map(|field| escape_field(field)).collect();
    write!(writer, "{}\r\n", row.join(","))
}

pub fn write_csv<W: Write>(writer: &mut W, tasks: &[Task]) -> io::Result<()> {
    write_row(writer, &HEADER)?;

    for task in tasks {
        let due_date = task
            .due_date
            .map(|date| date.format(DATE_FORMAT).to_string())
            .unwrap_or_default();
        let tags = task.tags.join(", ");
        write_row(
            writer,
            &[
                task.description.as_str(),
                if task.completed { "Yes" } else { "No" },
                task.priority.as_str(),
                due_date.as_str(),
                task.category.as_str(),
                tags.as_str(),
            ],
        )?;
    }
    Ok(())
}

/// Writes every task to `path`, replacing any existing file.
pub fn export_csv(tasks: &[Task], path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_csv(&mut writer, tasks)?;
    writer.flush()?;
    info!(count = tasks.len(), path = %path.display(), "exported tasks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TaskFields};
    use chrono::NaiveDate;

    fn render(tasks: &[Task]) -> String {
        let mut out = Vec::new();
        write_csv(&mut out, tasks).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_export_has_header_only() {
        assert_eq!(
            render(&[]),
            "Description,Completed,Priority,Due Date,Category,Tags\r\n"
        );
    }

    #[test]
    fn test_rows_follow_collection_order() {
        let tasks = vec![
            Task::with_fields(
                "File taxes",
                TaskFields {
                    completed: true,
                    priority: Some(Priority::High),
                    due_date: NaiveDate::from_ymd_opt(2024, 4, 15),
                    category: Some("Finance".to_string()),
                    tags: vec!["money".to_string(), "gov".to_string()],
                },
            )
            .unwrap(),
            Task::new("Buy milk").unwrap(),
        ];

        let csv = render(&tasks);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[1], "File taxes,Yes,high,2024-04-15,Finance,\"money, gov\"");
        assert_eq!(lines[2], "Buy milk,No,medium,,General,");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_fields_are_quoted_when_needed() {
        let task = Task::new("Say \"hi\", then leave").unwrap();
        let csv = render(&[task]);
        assert!(csv.contains("\"Say \"\"hi\"\", then leave\",No"));
    }

    #[test]
    fn test_export_csv_writes_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("tasks_export.csv");
        export_csv(&[Task::new("Buy milk").unwrap()], &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.starts_with("Description,"));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("missing").join("out.csv");
        assert!(export_csv(&[], &path).is_err());
    }
}
