//! Numbered interactive menu, the default front end.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use colored::Colorize;

use crate::assistant::{
    categorize_or_default, looks_like_natural_language, Categorizer, FallbackCategorizer,
    RuleParser, TaskParser,
};
use crate::export::export_csv;
use crate::models::{parse_due_date, parse_tags, Priority, TaskFields, TaskUpdate, DEFAULT_CATEGORY};
use crate::render::{self, with_positions};
use crate::todo_list::{lock, today, SearchQuery, SharedTodoList, SortKey};

const DEFAULT_EXPORT_FILE: &str = "tasks_export.csv";

const CHOICES: [(&str, &str); 9] = [
    ("1", "Add Task"),
    ("2", "View Tasks"),
    ("3", "Edit Task"),
    ("4", "Toggle Complete"),
    ("5", "Delete Task"),
    ("6", "Search/Filter Tasks"),
    ("7", "View Statistics"),
    ("8", "Export to CSV"),
    ("9", "Exit"),
];

/// Appends `.csv` unless the name already ends with it.
pub fn export_file_name(name: &str) -> PathBuf {
    let name = if name.trim().is_empty() {
        DEFAULT_EXPORT_FILE
    } else {
        name.trim()
    };
    if name.ends_with(".csv") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}.csv", name))
    }
}

pub struct Menu<R, W> {
    list: SharedTodoList,
    parser: Box<dyn TaskParser>,
    categorizer: Box<dyn Categorizer>,
    default_priority: Priority,
    default_category: String,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    pub fn new(list: SharedTodoList, input: R, output: W) -> Self {
        Self {
            list,
            parser: Box::new(RuleParser::new()),
            categorizer: Box::new(FallbackCategorizer),
            default_priority: Priority::default(),
            default_category: DEFAULT_CATEGORY.to_string(),
            input,
            output,
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn TaskParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_categorizer(mut self, categorizer: Box<dyn Categorizer>) -> Self {
        self.categorizer = categorizer;
        self
    }

    /// Values used when the user leaves priority or category blank.
    pub fn with_defaults(mut self, priority: Priority, category: impl Into<String>) -> Self {
        self.default_priority = priority;
        self.default_category = category.into();
        self
    }

    /// Runs until the user picks Exit or input ends.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            match self.step() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    writeln!(self.output)?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        writeln!(self.output, "Goodbye!")?;
        self.output.flush()
    }

    /// One menu round. `Ok(false)` means exit.
    fn step(&mut self) -> io::Result<bool> {
        self.display_menu()?;
        let choice = self.ask("Enter choice: ")?;
        match choice.as_str() {
            "1" => self.add_task()?,
            "2" => {
                self.show_tasks()?;
            }
            "3" => self.edit_task()?,
            "4" => self.toggle_completed()?,
            "5" => self.delete_task()?,
            "6" => self.search_tasks()?,
            "7" => self.show_stats()?,
            "8" => self.export_tasks()?,
            "9" => return Ok(false),
            _ => writeln!(
                self.output,
                "{}",
                "Invalid choice. Please enter a valid option.".red()
            )?,
        }
        Ok(true)
    }

    fn display_menu(&mut self) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(
            self.output,
            "{}{}{}",
            "=".repeat(10),
            " TO-DO LIST MANAGER ".blue(),
            "=".repeat(10)
        )?;
        for (key, label) in CHOICES {
            writeln!(self.output, "{}. {}", key, label)?;
        }
        writeln!(self.output, "{}", "=".repeat(40))
    }

    /// Prints `prompt` and reads one trimmed line. End of input surfaces as
    /// `UnexpectedEof` so every dialog unwinds back to `run`.
    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_string())
    }

    fn ask_index(&mut self, prompt: &str) -> io::Result<Option<usize>> {
        Ok(self.ask(prompt)?.parse().ok())
    }

    fn ask_priority(&mut self, default: Priority) -> io::Result<Priority> {
        loop {
            let prompt = format!("Priority [high/medium/low] (default={}): ", default);
            let answer = self.ask(&prompt)?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse() {
                Ok(priority) => return Ok(priority),
                Err(_) => render::failure(
                    &mut self.output,
                    "Invalid priority! Choose high, medium, or low",
                )?,
            }
        }
    }

    /// `Ok(None)` for a blank answer; `clear_word` maps to `Some(None)`.
    fn ask_due_date(
        &mut self,
        prompt: &str,
        clear_word: Option<&str>,
    ) -> io::Result<Option<Option<chrono::NaiveDate>>> {
        loop {
            let answer = self.ask(prompt)?;
            if answer.is_empty() {
                return Ok(None);
            }
            if clear_word == Some(answer.as_str()) {
                return Ok(Some(None));
            }
            match parse_due_date(&answer) {
                Ok(date) => return Ok(Some(Some(date))),
                Err(_) => render::failure(&mut self.output, "Invalid date format! Use YYYY-MM-DD")?,
            }
        }
    }

    /// Prints the due-date ordered listing. Returns whether any task exists.
    fn show_tasks(&mut self) -> io::Result<bool> {
        let list = lock(&self.list);
        let rows = with_positions(&list, list.view(None, SortKey::DueDate));
        render::task_table(&mut self.output, &rows, today())?;
        Ok(!rows.is_empty())
    }

    fn add_task(&mut self) -> io::Result<()> {
        let description = self.ask("Enter task: ")?;
        if description.is_empty() {
            return render::failure(&mut self.output, "Description cannot be empty!");
        }

        if looks_like_natural_language(&description) {
            match self.parser.parse(&description) {
                Ok(parsed) => {
                    let category =
                        categorize_or_default(self.categorizer.as_ref(), &parsed.description);
                    let fields = TaskFields {
                        priority: Some(parsed.priority),
                        due_date: parsed.due_date,
                        category: Some(category.clone()),
                        ..Default::default()
                    };

                    let mut list = lock(&self.list);
                    let id = match list.add(parsed.description.as_str(), fields) {
                        Ok(id) => id,
                        Err(e) => return render::failure(&mut self.output, &e.to_string()),
                    };
                    let due = parsed
                        .due_date
                        .map_or_else(|| "No deadline".to_string(), |d| d.to_string());

                    render::success(&mut self.output, &format!("Added: {}", parsed.description))?;
                    writeln!(self.output, "{}", format!("  Due: {}", due).blue())?;
                    writeln!(
                        self.output,
                        "{}",
                        format!("  Priority: {}", parsed.priority).yellow()
                    )?;
                    writeln!(self.output, "{}", format!("  Category: {}", category).cyan())?;
                    if let Ok(prediction) = list.predict_completion_time(id) {
                        writeln!(
                            self.output,
                            "{}",
                            format!("  Predicted time: {}", prediction).magenta()
                        )?;
                    }
                    return Ok(());
                }
                Err(e) => render::notice(
                    &mut self.output,
                    &format!("Could not read that as a sentence ({}), asking instead", e),
                )?,
            }
        }

        let category = self.ask("Category [optional]: ")?;
        let category = if category.is_empty() {
            self.default_category.clone()
        } else {
            category
        };
        let tags = parse_tags(&self.ask("Tags (comma separated) [optional]: ")?);
        let priority = self.ask_priority(self.default_priority)?;
        let due_date = self
            .ask_due_date("Due date (YYYY-MM-DD) [optional]: ", None)?
            .flatten();

        let fields = TaskFields {
            priority: Some(priority),
            due_date,
            category: Some(category),
            tags,
            ..Default::default()
        };
        let result = lock(&self.list).add(description.as_str(), fields);
        match result {
            Ok(_) => render::success(&mut self.output, &format!("Added: {}", description)),
            Err(e) => render::failure(&mut self.output, &e.to_string()),
        }
    }

    fn edit_task(&mut self) -> io::Result<()> {
        if !self.show_tasks()? {
            return Ok(());
        }

        let task = match self.ask_index("Enter task ID to edit: ")? {
            Some(index) => lock(&self.list).get(index).ok().cloned(),
            None => None,
        };
        let Some(task) = task else {
            return render::failure(&mut self.output, "Invalid task ID!");
        };

        let mut update = TaskUpdate::new();

        let description = self.ask(&format!("New description [{}]: ", task.description))?;
        if !description.is_empty() {
            update = update.description(description);
        }

        let category = self.ask(&format!("New category [{}]: ", task.category))?;
        if !category.is_empty() {
            update = update.category(category);
        }

        let tags = self.ask(&format!(
            "New tags (comma separated) [{}]: ",
            task.tags.join(", ")
        ))?;
        if !tags.is_empty() {
            update = update.tags(parse_tags(&tags));
        }

        let priority = self.ask_priority(task.priority)?;
        if priority != task.priority {
            update = update.priority(priority);
        }

        let current_due = task
            .due_date
            .map_or_else(|| "None".to_string(), |d| d.to_string());
        writeln!(self.output, "Current due date: {}", current_due)?;
        if let Some(due_date) =
            self.ask_due_date("Due date (YYYY-MM-DD, '-' to clear) [optional]: ", Some("-"))?
        {
            update = update.due_date(due_date);
        }

        if update.is_empty() {
            return render::notice(&mut self.output, "Nothing to update");
        }

        // Edit by id: another front end may have reordered the list meanwhile.
        let result = lock(&self.list).edit(task.id, update).map(|_| ());
        match result {
            Ok(()) => render::success(&mut self.output, "Task updated successfully!"),
            Err(e) => render::failure(&mut self.output, &e.to_string()),
        }
    }

    fn toggle_completed(&mut self) -> io::Result<()> {
        if !self.show_tasks()? {
            return Ok(());
        }

        let Some(index) = self.ask_index("Enter task ID to toggle: ")? else {
            return render::failure(&mut self.output, "Invalid task ID!");
        };

        let result = {
            let mut list = lock(&self.list);
            list.get(index)
                .map(|task| !task.completed)
                .and_then(|completed| list.mark_completed(index, completed).map(|()| completed))
        };
        match result {
            Ok(true) => render::success(&mut self.output, "Task completed!"),
            Ok(false) => render::success(&mut self.output, "Task marked as incomplete!"),
            Err(_) => render::failure(&mut self.output, "Invalid task ID!"),
        }
    }

    fn delete_task(&mut self) -> io::Result<()> {
        if !self.show_tasks()? {
            return Ok(());
        }

        let result = match self.ask_index("Enter task number to delete: ")? {
            Some(index) => lock(&self.list).delete(index).ok(),
            None => None,
        };
        match result {
            Some(task) => render::success(&mut self.output, &format!("Deleted: {}", task.description)),
            None => render::failure(&mut self.output, "Invalid task number!"),
        }
    }

    fn search_tasks(&mut self) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", "=== SEARCH TASKS ===".blue())?;

        let term = self.ask("Search term [optional]: ")?;
        let category = self.ask("Category [optional]: ")?;
        let tags = parse_tags(&self.ask("Tags (comma separated) [optional]: ")?);

        let priority = if self.ask("Filter by priority? (y/n): ")?.eq_ignore_ascii_case("y") {
            Some(self.ask_priority(self.default_priority)?)
        } else {
            None
        };

        let due_within = self.ask("Due within how many days? [optional]: ")?;
        let due_within_days = if due_within.is_empty() {
            None
        } else {
            match due_within.parse::<u32>() {
                Ok(days) => Some(days),
                Err(_) => return render::failure(&mut self.output, "Invalid number!"),
            }
        };

        let query = SearchQuery {
            term: Some(term).filter(|t| !t.is_empty()),
            category: Some(category).filter(|c| !c.is_empty()),
            tags,
            priority,
            due_within_days,
        };

        let list = lock(&self.list);
        let rows = with_positions(&list, list.search(&query));
        render::search_results(&mut self.output, &rows)
    }

    fn show_stats(&mut self) -> io::Result<()> {
        let (stats, habits) = {
            let list = lock(&self.list);
            (list.stats(), list.analyze_habits())
        };
        render::statistics(&mut self.output, &stats, &habits)
    }

    fn export_tasks(&mut self) -> io::Result<()> {
        let path = export_file_name(&self.ask("Enter filename [tasks_export.csv]: ")?);

        let list = lock(&self.list);
        match export_csv(list.tasks(), &path) {
            Ok(()) => render::success(
                &mut self.output,
                &format!("Exported {} tasks to {}", list.len(), path.display()),
            ),
            Err(e) => render::failure(&mut self.output, &format!("Export failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantError, ParsedTask};
    use crate::storage::JsonStorage;
    use crate::todo_list::TodoList;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_list() -> (SharedTodoList, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(temp_dir.path().join("tasks.json"));
        (TodoList::new(Box::new(storage)).into_shared(), temp_dir)
    }

    fn run_menu(list: &SharedTodoList, script: &str) -> String {
        colored::control::set_override(false);
        let mut output = Vec::new();
        Menu::new(list.clone(), Cursor::new(script.to_string()), &mut output)
            .run()
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    struct FixedParser;

    impl TaskParser for FixedParser {
        fn parse(&self, text: &str) -> Result<ParsedTask, AssistantError> {
            Ok(ParsedTask {
                description: text.replace(" tomorrow", ""),
                due_date: chrono::NaiveDate::from_ymd_opt(2030, 1, 2),
                priority: Priority::High,
            })
        }
    }

    struct Shopping;

    impl Categorizer for Shopping {
        fn categorize(&self, _description: &str) -> Result<String, AssistantError> {
            Ok("Shopping".to_string())
        }
    }

    #[test]
    fn test_exit_and_end_of_input() {
        let (list, _temp_dir) = create_list();
        assert!(run_menu(&list, "9\n").ends_with("Goodbye!\n"));
        assert!(run_menu(&list, "").ends_with("Goodbye!\n"));
        assert!(run_menu(&list, "x\n9\n").contains("Invalid choice"));
    }

    #[test]
    fn test_manual_add() {
        let (list, _temp_dir) = create_list();
        let output = run_menu(&list, "1\nBuy milk\nErrands\nhome, quick\nurgent\nlow\n2030-05-01\n9\n");

        assert!(output.contains("Invalid priority!"));
        assert!(output.contains("✓ Added: Buy milk"));
        let list = lock(&list);
        let task = &list.tasks()[0];
        assert_eq!(task.category, "Errands");
        assert_eq!(task.tags, vec!["home", "quick"]);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.due_date, chrono::NaiveDate::from_ymd_opt(2030, 5, 1));
    }

    #[test]
    fn test_manual_add_uses_defaults() {
        let (list, _temp_dir) = create_list();
        colored::control::set_override(false);
        let mut output = Vec::new();
        Menu::new(list.clone(), Cursor::new("1\nBuy milk\n\n\n\nnot a date\n\n9\n"), &mut output)
            .with_defaults(Priority::High, "Home")
            .run()
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Invalid date format!"));
        let list = lock(&list);
        assert_eq!(list.tasks()[0].category, "Home");
        assert_eq!(list.tasks()[0].priority, Priority::High);
        assert!(list.tasks()[0].due_date.is_none());
    }

    #[test]
    fn test_empty_description_is_rejected() {
        let (list, _temp_dir) = create_list();
        let output = run_menu(&list, "1\n   \n9\n");
        assert!(output.contains("Error: Description cannot be empty!"));
        assert!(lock(&list).is_empty());
    }

    #[test]
    fn test_sentence_add_uses_assistants() {
        let (list, _temp_dir) = create_list();
        colored::control::set_override(false);
        let mut output = Vec::new();
        Menu::new(list.clone(), Cursor::new("1\nbuy eggs tomorrow\n9\n"), &mut output)
            .with_parser(Box::new(FixedParser))
            .with_categorizer(Box::new(Shopping))
            .run()
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("✓ Added: buy eggs"));
        assert!(text.contains("  Due: 2030-01-02"));
        assert!(text.contains("  Category: Shopping"));
        assert!(text.contains("  Predicted time: Insufficient data for prediction"));
        assert_eq!(lock(&list).tasks()[0].priority, Priority::High);
    }

    #[test]
    fn test_edit_keeps_blank_answers() {
        let (list, _temp_dir) = create_list();
        lock(&list)
            .add(
                "Plan trip",
                TaskFields {
                    tags: vec!["travel".to_string()],
                    due_date: chrono::NaiveDate::from_ymd_opt(2030, 1, 1),
                    ..Default::default()
                },
            )
            .unwrap();

        let output = run_menu(&list, "3\n0\n\nLeisure\n\n\n-\n9\n");
        assert!(output.contains("✓ Task updated successfully!"));

        let list = lock(&list);
        let task = &list.tasks()[0];
        assert_eq!(task.description, "Plan trip");
        assert_eq!(task.category, "Leisure");
        assert_eq!(task.tags, vec!["travel"]);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.due_date.is_none());
    }

    #[test]
    fn test_edit_with_no_changes() {
        let (list, _temp_dir) = create_list();
        lock(&list).add("Plan trip", TaskFields::default()).unwrap();
        let output = run_menu(&list, "3\n0\n\n\n\n\n\n9\n");
        assert!(output.contains("Nothing to update"));
    }

    #[test]
    fn test_toggle_and_delete() {
        let (list, _temp_dir) = create_list();
        lock(&list).add("Water plants", TaskFields::default()).unwrap();
        lock(&list).add("Feed cat", TaskFields::default()).unwrap();

        let output = run_menu(&list, "4\n1\n4\n1\n4\n7\n5\nzero\n5\n0\n9\n");
        assert!(output.contains("✓ Task completed!"));
        assert!(output.contains("✓ Task marked as incomplete!"));
        assert!(output.contains("Error: Invalid task ID!"));
        assert!(output.contains("Error: Invalid task number!"));
        assert!(output.contains("✓ Deleted: Water plants"));

        let list = lock(&list);
        assert_eq!(list.len(), 1);
        assert!(!list.tasks()[0].completed);
    }

    #[test]
    fn test_search_dialog() {
        let (list, _temp_dir) = create_list();
        lock(&list)
            .add(
                "Call plumber",
                TaskFields {
                    priority: Some(Priority::High),
                    ..Default::default()
                },
            )
            .unwrap();
        lock(&list).add("Walk dog", TaskFields::default()).unwrap();

        let output = run_menu(&list, "6\nplumber\n\n\ny\nhigh\n\n6\n\n\n\nn\nsoon\n9\n");
        assert!(output.contains("Found 1 tasks:"));
        assert!(output.contains("0. [◻] Call plumber (General)"));
        assert!(output.contains("Error: Invalid number!"));
    }

    #[test]
    fn test_stats_and_empty_view() {
        let (list, _temp_dir) = create_list();
        let output = run_menu(&list, "2\n7\n9\n");
        assert!(output.contains("No tasks found!"));
        assert!(output.contains("=== PRODUCTIVITY STATISTICS ==="));
        assert!(output.contains("Total tasks: 0"));
    }

    #[test]
    fn test_export_dialog() {
        let (list, temp_dir) = create_list();
        lock(&list).add("Buy milk", TaskFields::default()).unwrap();
        let target = temp_dir.path().join("backup");

        let output = run_menu(&list, &format!("8\n{}\n9\n", target.display()));
        assert!(output.contains("✓ Exported 1 tasks to"));
        assert!(temp_dir.path().join("backup.csv").exists());
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name(""), PathBuf::from("tasks_export.csv"));
        assert_eq!(export_file_name("week"), PathBuf::from("week.csv"));
        assert_eq!(export_file_name("week.csv"), PathBuf::from("week.csv"));
    }
}
