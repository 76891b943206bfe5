use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::assistant::{
    categorize_or_default, looks_like_natural_language, Categorizer, FallbackCategorizer,
    RuleParser, TaskParser,
};
use crate::config::{ConfigError, ConfigManager, CONFIG_ENV};
use crate::export::export_csv;
use crate::menu::{export_file_name, Menu};
use crate::models::{parse_due_date, parse_tags, Priority, TaskError, TaskFields, TaskUpdate};
use crate::render::{self, with_positions};
use crate::storage::StorageError;
use crate::todo_list::{today, SearchQuery, SortKey, TodoList};
use crate::voice::{ConsoleSpeech, VoiceAssistant, VoiceSession};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Nothing to update, pass at least one field to change")]
    EmptyUpdate,
}

#[derive(Parser, Debug)]
#[command(name = "trusty_tasks")]
#[command(about = "Personal task tracker with priorities, due dates and habit insights", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Without a subcommand the interactive menu starts
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Task data file for this run, overriding storage.path
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    Task(TaskCommand),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a task. Phrases like "tomorrow" or "next friday" set the due date
    Add {
        description: String,

        #[arg(short, long)]
        priority: Option<Priority>,

        /// Due date as YYYY-MM-DD
        #[arg(short, long, value_parser = parse_due_date)]
        due: Option<NaiveDate>,

        #[arg(short, long)]
        category: Option<String>,

        /// Comma separated tags
        #[arg(short, long)]
        tags: Option<String>,

        /// Store the description exactly as typed
        #[arg(long)]
        raw: bool,
    },

    /// List tasks with their ids
    List {
        /// priority, due-date or added
        #[arg(short, long, default_value = "added")]
        sort: String,

        #[arg(long, conflicts_with = "pending")]
        completed: bool,

        #[arg(long)]
        pending: bool,
    },

    /// Change selected fields of a task
    Edit {
        id: usize,

        #[arg(long)]
        description: Option<String>,

        #[arg(short, long)]
        priority: Option<Priority>,

        #[arg(short, long, value_parser = parse_due_date, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,

        #[arg(short, long)]
        category: Option<String>,

        /// Comma separated tags; an empty value clears them
        #[arg(short, long)]
        tags: Option<String>,

        #[arg(long)]
        completed: Option<bool>,
    },

    /// Mark a task as completed
    Complete {
        id: usize,

        /// Mark it as not completed instead
        #[arg(long)]
        undo: bool,
    },

    /// Record that work on a task has started
    Start { id: usize },

    /// Record that work on a task has ended and complete it
    Finish { id: usize },

    /// Delete a task
    Delete { id: usize },

    /// Search tasks; every given filter must match
    Search {
        /// Text to look for in descriptions
        term: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        /// Matches tasks carrying any of the given tags
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        #[arg(short, long)]
        priority: Option<Priority>,

        /// Only tasks due between today and this many days ahead
        #[arg(long)]
        due_within: Option<u32>,
    },

    /// Show completion statistics and habit analysis
    Stats,

    /// Estimate how long a task will take
    Predict { id: usize },

    /// Export all tasks to CSV
    Export {
        #[arg(short, long, default_value = "tasks_export.csv")]
        output: String,
    },

    /// Voice control from typed commands
    Voice,

    /// Interactive menu
    Menu,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective value of a key
    Get { key: String },
    /// Set a key
    Set { key: String, value: String },
    /// Return a key to its default
    Unset { key: String },
    /// Show defaults and overrides
    List,
}

/// `RUST_LOG` style directives, falling back to `warn` when none are given.
pub fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives)
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ConfigManager::new(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Task(TaskCommand::Menu)) {
        Commands::Config { action } => run_config(&mut config, action),
        Commands::Task(command) => {
            let storage = config.create_storage(cli.data.as_deref())?;
            debug!(location = %storage.location(), "opened task storage");
            run_task(&config, TodoList::new(storage), command)
        }
    }
}

fn run_task(
    config: &ConfigManager,
    mut list: TodoList,
    command: TaskCommand,
) -> Result<(), CliError> {
    let mut out = io::stdout().lock();

    match command {
        TaskCommand::Add {
            description,
            priority,
            due,
            category,
            tags,
            raw,
        } => {
            let fields = TaskFields {
                priority,
                due_date: due,
                category,
                tags: tags.as_deref().map(parse_tags).unwrap_or_default(),
                ..Default::default()
            };
            let parser = RuleParser::new();
            let parser = (!raw && looks_like_natural_language(&description))
                .then_some(&parser as &dyn TaskParser);
            let (description, fields) =
                complete_fields(config, description, fields, parser, &FallbackCategorizer);

            let id = list.add(description.as_str(), fields)?;
            let index = list.index_of(id).unwrap_or(list.len() - 1);
            render::success(&mut out, &format!("Added task {}: {}", index, description))?;
        }
        TaskCommand::List {
            sort,
            completed,
            pending,
        } => {
            let filter = match (completed, pending) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let rows = with_positions(&list, list.view(filter, SortKey::parse(&sort)));
            render::task_table(&mut out, &rows, today())?;
        }
        TaskCommand::Edit {
            id,
            description,
            priority,
            due,
            clear_due,
            category,
            tags,
            completed,
        } => {
            let update = TaskUpdate {
                description,
                completed,
                priority,
                due_date: if clear_due { Some(None) } else { due.map(Some) },
                category,
                tags: tags.as_deref().map(parse_tags),
            };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            let task = list.edit(id, update)?;
            render::success(&mut out, &format!("Updated task {}: {}", id, task.description))?;
        }
        TaskCommand::Complete { id, undo } => {
            list.mark_completed(id, !undo)?;
            let state = if undo { "not completed" } else { "completed" };
            render::success(&mut out, &format!("Task {} marked as {}", id, state))?;
        }
        TaskCommand::Start { id } => {
            list.start(id)?;
            render::success(&mut out, &format!("Started: {}", list.get(id)?.description))?;
        }
        TaskCommand::Finish { id } => {
            list.finish(id)?;
            render::success(&mut out, &format!("Finished: {}", list.get(id)?.description))?;
        }
        TaskCommand::Delete { id } => {
            let task = list.delete(id)?;
            render::success(&mut out, &format!("Deleted: {}", task.description))?;
        }
        TaskCommand::Search {
            term,
            category,
            tags,
            priority,
            due_within,
        } => {
            let query = SearchQuery {
                term,
                category,
                tags,
                priority,
                due_within_days: due_within,
            };
            let rows = with_positions(&list, list.search(&query));
            render::search_results(&mut out, &rows)?;
        }
        TaskCommand::Stats => {
            render::statistics(&mut out, &list.stats(), &list.analyze_habits())?;
        }
        TaskCommand::Predict { id } => {
            let prediction = list.predict_completion_time(id)?;
            render::prediction(&mut out, list.get(id)?, &prediction)?;
        }
        TaskCommand::Export { output } => {
            let path = export_file_name(&output);
            export_csv(list.tasks(), &path)?;
            render::success(
                &mut out,
                &format!("Exported {} tasks to {}", list.len(), path.display()),
            )?;
        }
        TaskCommand::Voice => {
            writeln!(
                out,
                "Supported commands: 'add [task]', 'complete [task number]', 'what are my tasks?', 'exit'"
            )?;
            drop(out);

            let shared = list.into_shared();
            let assistant = VoiceAssistant::new(Arc::clone(&shared), Box::new(RuleParser::new()));
            VoiceSession::start(assistant, ConsoleSpeech::stdio())?.join();
        }
        TaskCommand::Menu => {
            drop(out);
            Menu::new(list.into_shared(), io::stdin().lock(), io::stdout())
                .with_defaults(config.default_priority(), config.default_category())
                .run()?;
        }
    }

    Ok(())
}

/// Fills whatever the flags left open: values read from the sentence first,
/// then the configured defaults.
fn complete_fields(
    config: &ConfigManager,
    description: String,
    mut fields: TaskFields,
    parser: Option<&dyn TaskParser>,
    categorizer: &dyn Categorizer,
) -> (String, TaskFields) {
    let mut description = description;
    if let Some(parser) = parser {
        match parser.parse(&description) {
            Ok(parsed) => {
                description = parsed.description;
                fields.priority = fields.priority.or(Some(parsed.priority));
                fields.due_date = fields.due_date.or(parsed.due_date);
                if fields.category.is_none() {
                    fields.category = Some(categorize_or_default(categorizer, &description));
                }
            }
            Err(e) => warn!(error = %e, "keeping description as typed"),
        }
    }
    fields.priority = fields.priority.or(Some(config.default_priority()));
    fields.category = fields.category.or_else(|| Some(config.default_category()));
    (description, fields)
}

fn run_config(config: &mut ConfigManager, action: ConfigCommand) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    match action {
        ConfigCommand::Get { key } => {
            let value = config.get(&key)?.unwrap_or_else(|| "null".to_string());
            writeln!(out, "{}", value)?;
        }
        ConfigCommand::Set { key, value } => {
            config.set(&key, &value)?;
            render::success(&mut out, &format!("Set {} = {}", key, value))?;
        }
        ConfigCommand::Unset { key } => {
            config.unset(&key)?;
            render::success(&mut out, &format!("Unset {}", key))?;
        }
        ConfigCommand::List => {
            writeln!(out, "Config file: {}", config.path().display())?;
            for (key, value, is_default) in config.list() {
                let source = if is_default { "default" } else { "set" };
                writeln!(out, "{} = {} ({})", key, value, source)?;
            }
        }
    }
    Ok(())
}
