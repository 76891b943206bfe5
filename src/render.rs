//! Terminal output shared by the subcommands and the interactive menu.
//!
//! Everything writes to a caller supplied `Write` so the menu can be driven
//! from tests. Colouring goes through `colored`, which honours `NO_COLOR`.

use std::io::{self, Write};

use chrono::NaiveDate;
use colored::Colorize;

use crate::models::{Priority, Task, DATE_FORMAT};
use crate::todo_list::{weekday_name, HabitReport, Prediction, TaskStats, TodoList};

const RULE_WIDTH: usize = 70;
const CATEGORY_WIDTH: usize = 15;
const PROGRESS_BAR_WIDTH: usize = 30;

/// Priority padded to `width` and coloured.
pub fn priority_colored(priority: Priority, width: usize) -> String {
    let label = format!("{:<width$}", priority.as_str().to_uppercase(), width = width);
    match priority {
        Priority::High => label.red().to_string(),
        Priority::Medium => label.yellow().to_string(),
        Priority::Low => label.green().to_string(),
    }
}

/// Pairs each task with its position in the stored collection, which is the
/// number users type to address it.
pub fn with_positions<'a>(list: &TodoList, tasks: Vec<&'a Task>) -> Vec<(usize, &'a Task)> {
    tasks
        .into_iter()
        .filter_map(|task| list.index_of(task.id).map(|index| (index, task)))
        .collect()
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

pub fn task_table<W: Write>(
    out: &mut W,
    rows: &[(usize, &Task)],
    today: NaiveDate,
) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "{}", "No tasks found!".yellow());
    }

    writeln!(out)?;
    writeln!(out, "{}", "YOUR TASKS:".blue().bold())?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    writeln!(
        out,
        "{:<3} | {:<6} | {:<8} | {:<12} | {:<15} | Description",
        "ID", "Status", "Priority", "Due", "Category"
    )?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;

    for (index, task) in rows {
        let status = if task.completed {
            format!("{:<6}", "✓ DONE").green()
        } else {
            format!("{:<6}", "TODO").red()
        };

        let due = match task.due_date {
            Some(due) if task.is_overdue(today) => {
                format!("{:<12}", format!("{}!", format_date(due))).red().to_string()
            }
            Some(due) => format!("{:<12}", format_date(due)),
            None => format!("{:<12}", "-"),
        };

        writeln!(
            out,
            "{:<3} | {} | {} | {} | {:<15} | {}",
            index,
            status,
            priority_colored(task.priority, 8),
            due,
            truncate(&task.category, CATEGORY_WIDTH),
            task.description
        )?;

        if !task.tags.is_empty() {
            writeln!(out, "   Tags: {}", task.tags.join(", "))?;
        }
    }
    Ok(())
}

pub fn search_results<W: Write>(out: &mut W, rows: &[(usize, &Task)]) -> io::Result<()> {
    if rows.is_empty() {
        writeln!(out)?;
        return writeln!(out, "{}", "No tasks match your criteria".yellow());
    }

    writeln!(out)?;
    writeln!(out, "{}", format!("Found {} tasks:", rows.len()).green())?;
    for (index, task) in rows {
        let status = if task.completed { "✓" } else { "◻" };
        writeln!(
            out,
            "{}. [{}] {} ({})",
            index, status, task.description, task.category
        )?;
        if !task.tags.is_empty() {
            writeln!(out, "   Tags: {}", task.tags.join(", "))?;
        }
        if let Some(due) = task.due_date {
            writeln!(out, "   Due: {}", format_date(due))?;
        }
    }
    Ok(())
}

fn share(count: usize, total: usize) -> f64 {
    if total > 0 {
        count as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

pub fn statistics<W: Write>(
    out: &mut W,
    stats: &TaskStats,
    habits: &HabitReport,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "=== PRODUCTIVITY STATISTICS ===".blue().bold())?;
    writeln!(out, "Total tasks: {}", stats.total)?;
    writeln!(
        out,
        "Completed: {} ({:.1}%)",
        stats.completed, stats.completion_pct
    )?;
    writeln!(out, "Overdue: {}", stats.overdue)?;

    writeln!(out)?;
    writeln!(out, "{}", "Priority Distribution:".yellow())?;
    for (priority, count) in &stats.by_priority {
        let mut name = priority.as_str().to_string();
        name[..1].make_ascii_uppercase();
        writeln!(
            out,
            "- {}: {} ({:.1}%)",
            name,
            count,
            share(*count, stats.total)
        )?;
    }

    if !stats.by_category.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", "Category Distribution:".yellow())?;
        for (category, count) in &stats.by_category {
            writeln!(
                out,
                "- {}: {} ({:.1}%)",
                category,
                count,
                share(*count, stats.total)
            )?;
        }
    }

    if stats.total > 0 {
        let filled = (PROGRESS_BAR_WIDTH as f64 * stats.completion_pct / 100.0) as usize;
        writeln!(out)?;
        writeln!(out, "{}", "Progress:".green())?;
        writeln!(
            out,
            "[{}{}] {:.1}%",
            "█".repeat(filled),
            " ".repeat(PROGRESS_BAR_WIDTH - filled),
            stats.completion_pct
        )?;
    }

    writeln!(out)?;
    writeln!(out, "{}", "HABIT ANALYSIS:".magenta())?;
    match habits.peak_day {
        Some(day) => writeln!(out, "Your most productive day: {}", weekday_name(day))?,
        None => writeln!(out, "Not enough completed tasks with due dates yet")?,
    }

    if !habits.categories.is_empty() {
        writeln!(out)?;
        writeln!(out, "Category Performance:")?;
        for (category, habit) in &habits.categories {
            writeln!(out, "- {}:", category)?;
            writeln!(out, "  Completion: {:.1}%", habit.completion_rate * 100.0)?;
            writeln!(out, "  Consistency: {:.2}", habit.consistency)?;
            writeln!(out, "  Peak day: {}", weekday_name(habit.peak_day))?;
        }
    }
    Ok(())
}

pub fn prediction<W: Write>(out: &mut W, task: &Task, estimate: &Prediction) -> io::Result<()> {
    writeln!(out, "{} {}", "Predicted time:".magenta(), estimate)?;
    writeln!(out, "  Task: {}", task.description)
}

pub fn success<W: Write>(out: &mut W, message: &str) -> io::Result<()> {
    writeln!(out, "{}", format!("✓ {}", message).green())
}

pub fn failure<W: Write>(out: &mut W, message: &str) -> io::Result<()> {
    writeln!(out, "{}", format!("Error: {}", message).red())
}

pub fn notice<W: Write>(out: &mut W, message: &str) -> io::Result<()> {
    writeln!(out, "{}", message.yellow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskFields;
    use crate::storage::JsonStorage;
    use crate::todo_list::{SortKey, TodoList};
    use chrono::Weekday;
    use std::collections::BTreeMap;

    fn plain() {
        colored::control::set_override(false);
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        plain();
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_task_table_uses_stored_positions() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut list = TodoList::new(Box::new(JsonStorage::new(temp_dir.path().join("t.json"))));
        list.add(
            "Buy milk",
            TaskFields {
                priority: Some(Priority::Low),
                ..Default::default()
            },
        )
        .unwrap();
        list.add(
            "File taxes",
            TaskFields {
                priority: Some(Priority::High),
                due_date: Some(date(2024, 3, 1)),
                category: Some("Extraordinarily long category".to_string()),
                tags: vec!["money".to_string()],
                ..Default::default()
            },
        )
        .unwrap();

        let rows = with_positions(&list, list.view(None, SortKey::Priority));
        assert_eq!(rows[0].0, 1);

        let text = render(|out| task_table(out, &rows, date(2024, 3, 10)));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[5].starts_with("1   | TODO   | HIGH     | 2024-03-01!"), "{}", lines[5]);
        assert!(lines[5].contains("Extraordinarily...") && lines[5].ends_with("File taxes"));
        assert_eq!(lines[6], "   Tags: money");
        assert!(lines[7].starts_with("0   | TODO   | LOW      | -"));
    }

    #[test]
    fn test_empty_table() {
        let text = render(|out| task_table(out, &[], date(2024, 1, 1)));
        assert_eq!(text, "No tasks found!\n");
    }

    #[test]
    fn test_search_results() {
        let mut task = Task::new("Call plumber").unwrap();
        task.completed = true;
        task.due_date = Some(date(2024, 2, 2));
        let text = render(|out| search_results(out, &[(3, &task)]));
        assert!(text.contains("Found 1 tasks:"));
        assert!(text.contains("3. [✓] Call plumber (General)"));
        assert!(text.contains("   Due: 2024-02-02"));

        let empty = render(|out| search_results(out, &[]));
        assert!(empty.contains("No tasks match your criteria"));
    }

    #[test]
    fn test_statistics() {
        let stats = TaskStats {
            total: 4,
            completed: 1,
            by_priority: BTreeMap::from([(Priority::High, 3), (Priority::Low, 1)]),
            by_category: BTreeMap::from([("Work".to_string(), 4)]),
            overdue: 2,
            completion_pct: 25.0,
        };
        let habits = HabitReport {
            peak_day: Some(Weekday::Fri),
            categories: BTreeMap::new(),
        };

        let text = render(|out| statistics(out, &stats, &habits));
        assert!(text.contains("Completed: 1 (25.0%)"));
        assert!(text.contains("- High: 3 (75.0%)"));
        assert!(text.contains("- Work: 4 (100.0%)"));
        assert!(text.contains(&format!("[{}{}] 25.0%", "█".repeat(7), " ".repeat(23))));
        assert!(text.contains("Your most productive day: Friday"));
    }

    #[test]
    fn test_statistics_without_habits() {
        let stats = TaskStats {
            total: 0,
            completed: 0,
            by_priority: BTreeMap::new(),
            by_category: BTreeMap::new(),
            overdue: 0,
            completion_pct: 0.0,
        };
        let text = render(|out| statistics(out, &stats, &HabitReport::default()));
        assert!(!text.contains("Progress:"));
        assert!(text.contains("Not enough completed tasks"));
    }
}
