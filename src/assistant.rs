//! Assistant capabilities consumed by the front ends.
//!
//! Hosted services (language models, speech recognisers) plug in behind
//! [`TaskParser`] and [`Categorizer`]. The local implementations here work
//! offline: [`RuleParser`] understands common date phrases and
//! [`FallbackCategorizer`] files everything under the default category.
//! Nothing in this module touches the task list; callers feed the suggested
//! values into the engine themselves.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, Days, Month, Months, NaiveDate, Weekday};
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Priority, DEFAULT_CATEGORY};
use crate::todo_list::today;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssistantError {
    #[error("Assistant unavailable: {0}")]
    Unavailable(String),
    #[error("Could not understand '{0}'")]
    Unrecognized(String),
    #[error("Input closed")]
    InputClosed,
}

/// Field values suggested for a new task.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTask {
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
}

/// Turns free text into task fields.
pub trait TaskParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedTask, AssistantError>;
}

/// Suggests one category for a task description.
pub trait Categorizer: Send + Sync {
    fn categorize(&self, description: &str) -> Result<String, AssistantError>;
}

/// Always answers with the default category.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackCategorizer;

impl Categorizer for FallbackCategorizer {
    fn categorize(&self, _description: &str) -> Result<String, AssistantError> {
        Ok(DEFAULT_CATEGORY.to_string())
    }
}

/// Asks `categorizer` for a category, falling back to the default on error
/// or on a blank answer.
pub fn categorize_or_default(categorizer: &dyn Categorizer, description: &str) -> String {
    match categorizer.categorize(description) {
        Ok(category) if !category.trim().is_empty() => category.trim().to_string(),
        Ok(_) => DEFAULT_CATEGORY.to_string(),
        Err(e) => {
            warn!(error = %e, "categorizer failed, using default category");
            DEFAULT_CATEGORY.to_string()
        }
    }
}

const MONTHS: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";
const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
const CLOCK_TIME: &str = r"\d{1,2}:\d{2}(?:\s?(?:am|pm))?";

static ISO_DATE_REGEX: OnceLock<Regex> = OnceLock::new();
static IN_DAYS_REGEX: OnceLock<Regex> = OnceLock::new();
static RELATIVE_REGEX: OnceLock<Regex> = OnceLock::new();
static MONTH_DAY_REGEX: OnceLock<Regex> = OnceLock::new();
static WEEKDAY_REGEX: OnceLock<Regex> = OnceLock::new();
static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
static ON_DATE_REGEX: OnceLock<Regex> = OnceLock::new();
static AT_TIME_REGEX: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_REGEX: OnceLock<Regex> = OnceLock::new();

fn iso_date_regex() -> &'static Regex {
    ISO_DATE_REGEX.get_or_init(|| {
        Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("Invalid regex pattern")
    })
}

fn in_days_regex() -> &'static Regex {
    IN_DAYS_REGEX
        .get_or_init(|| Regex::new(r"(?i)\bin (\d+) days?\b").expect("Invalid regex pattern"))
}

fn relative_regex() -> &'static Regex {
    RELATIVE_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(today|tonight|tomorrow|next week|next month)\b")
            .expect("Invalid regex pattern")
    })
}

fn month_day_regex() -> &'static Regex {
    MONTH_DAY_REGEX.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b({MONTHS})(?:\s+(\d{{1,2}})(?:st|nd|rd|th)?)?\b"
        ))
        .expect("Invalid regex pattern")
    })
}

fn weekday_regex() -> &'static Regex {
    WEEKDAY_REGEX.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b({WEEKDAYS})\b")).expect("Invalid regex pattern")
    })
}

fn time_regex() -> &'static Regex {
    TIME_REGEX.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b{CLOCK_TIME}\b")).expect("Invalid regex pattern")
    })
}

/// "on" directly introducing a calendar date or weekday.
fn on_date_regex() -> &'static Regex {
    ON_DATE_REGEX.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\bon\s+(?:\d{{4}}-\d{{2}}-\d{{2}}|(?:{MONTHS})(?:\s+\d{{1,2}}(?:st|nd|rd|th)?)?|{WEEKDAYS})\b"
        ))
        .expect("Invalid regex pattern")
    })
}

/// "at" directly introducing a clock time.
fn at_time_regex() -> &'static Regex {
    AT_TIME_REGEX.get_or_init(|| {
        Regex::new(&format!(r"(?i)\bat\s+{CLOCK_TIME}\b")).expect("Invalid regex pattern")
    })
}

fn whitespace_regex() -> &'static Regex {
    WHITESPACE_REGEX.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"))
}

/// Regexes whose matches are stripped from the description, in order.
fn date_phrase_regexes() -> [&'static Regex; 6] {
    [
        iso_date_regex(),
        in_days_regex(),
        relative_regex(),
        month_day_regex(),
        weekday_regex(),
        time_regex(),
    ]
}

/// Whether `text` reads like a sentence worth handing to a [`TaskParser`]
/// rather than a bare description.
pub fn looks_like_natural_language(text: &str) -> bool {
    text.split_whitespace().count() > 1
        && date_phrase_regexes()[..5]
            .iter()
            .any(|regex| regex.is_match(text))
}

/// Offline parser built on regular expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleParser;

impl RuleParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses `text` with relative phrases resolved against `today`.
    pub fn parse_as_of(&self, text: &str, today: NaiveDate) -> Result<ParsedTask, AssistantError> {
        let due_date = detect_due_date(text, today);
        let description = strip_date_phrases(text);
        if description.is_empty() {
            return Err(AssistantError::Unrecognized(text.to_string()));
        }

        let parsed = ParsedTask {
            description,
            due_date,
            priority: detect_priority(text),
        };
        debug!(?parsed, "parsed task text");
        Ok(parsed)
    }
}

impl TaskParser for RuleParser {
    fn parse(&self, text: &str) -> Result<ParsedTask, AssistantError> {
        self.parse_as_of(text, today())
    }
}

fn detect_due_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = iso_date_regex().captures(text) {
        if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
            return Some(date);
        }
    }
    if let Some(caps) = in_days_regex().captures(text) {
        let days: u64 = caps[1].parse().ok()?;
        return today.checked_add_days(Days::new(days));
    }
    if let Some(caps) = relative_regex().captures(text) {
        return match caps[1].to_lowercase().as_str() {
            "today" | "tonight" => Some(today),
            "tomorrow" => today.succ_opt(),
            "next week" => today.checked_add_days(Days::new(7)),
            _ => today.checked_add_months(Months::new(1)),
        };
    }
    if let Some(date) = month_day_regex()
        .captures(text)
        .and_then(|caps| month_day(&caps, today))
    {
        return Some(date);
    }
    weekday_regex()
        .captures(text)
        .and_then(|caps| Weekday::from_str(&caps[1]).ok())
        .and_then(|weekday| next_weekday(today, weekday))
}

/// Next occurrence of a month and day on or after `today`. A month without a
/// day is ignored.
fn month_day(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let month = Month::from_str(&caps[1]).ok()?.number_from_month();
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
    match this_year {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

/// The weekday strictly after `today`; naming today's weekday means a week out.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let current = today.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let ahead = match (target + 7 - current) % 7 {
        0 => 7,
        n => n,
    };
    today.checked_add_days(Days::new(ahead.into()))
}

fn strip_date_phrases(text: &str) -> String {
    let mut description = text.to_string();
    for regex in [on_date_regex(), at_time_regex()]
        .into_iter()
        .chain(date_phrase_regexes())
    {
        description = regex.replace_all(&description, "").into_owned();
    }
    whitespace_regex()
        .replace_all(&description, " ")
        .trim()
        .to_string()
}

fn detect_priority(text: &str) -> Priority {
    let text = text.to_lowercase();
    if ["urgent", "important", "asap"]
        .iter()
        .any(|word| text.contains(word))
    {
        Priority::High
    } else if ["low priority", "when you can"]
        .iter()
        .any(|phrase| text.contains(phrase))
    {
        Priority::Low
    } else {
        Priority::Medium
    }
}
