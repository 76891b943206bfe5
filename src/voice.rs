//! Voice control.
//!
//! [`VoiceAssistant`] turns one utterance into engine calls and a spoken
//! reply. [`VoiceSession`] runs the listen loop on a background thread while
//! other front ends keep using the same [`SharedTodoList`].

use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use regex::Regex;
use tracing::{error, info, warn};

use crate::assistant::{AssistantError, TaskParser};
use crate::models::TaskFields;
use crate::todo_list::{lock, SharedTodoList};

static NUMBER_REGEX: OnceLock<Regex> = OnceLock::new();

/// Microphone and speaker.
pub trait SpeechIo: Send {
    /// Waits for the next utterance. `Ok(None)` means nothing was heard.
    /// [`AssistantError::InputClosed`] ends the session.
    fn transcribe(&mut self) -> Result<Option<String>, AssistantError>;
    fn speak(&mut self, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    Add(String),
    /// Position as shown in the task listing.
    Complete(Option<usize>),
    ListPending,
    Exit,
    Unknown,
}

impl VoiceCommand {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        let has_word = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

        if let Some(position) = words.iter().position(|w| *w == "add") {
            // Keep the caller's casing for the task text.
            let rest: Vec<&str> = text.split_whitespace().skip(position + 1).collect();
            return VoiceCommand::Add(rest.join(" "));
        }
        if has_word(&["complete", "done", "finish"]) {
            let number = NUMBER_REGEX
                .get_or_init(|| Regex::new(r"\d+").expect("Invalid regex pattern"))
                .find(&lower)
                .and_then(|m| m.as_str().parse().ok());
            return VoiceCommand::Complete(number);
        }
        if has_word(&["what"]) && has_word(&["tasks", "task"]) {
            return VoiceCommand::ListPending;
        }
        if has_word(&["exit", "stop", "quit"]) {
            return VoiceCommand::Exit;
        }
        VoiceCommand::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceReply {
    pub speech: String,
    pub keep_listening: bool,
}

impl VoiceReply {
    fn say(speech: impl Into<String>) -> Self {
        Self {
            speech: speech.into(),
            keep_listening: true,
        }
    }
}

pub struct VoiceAssistant {
    list: SharedTodoList,
    parser: Box<dyn TaskParser>,
}

impl VoiceAssistant {
    pub fn new(list: SharedTodoList, parser: Box<dyn TaskParser>) -> Self {
        Self { list, parser }
    }

    pub fn handle(&self, text: &str) -> VoiceReply {
        match VoiceCommand::parse(text) {
            VoiceCommand::Add(task_text) => match self.parser.parse(&task_text) {
                Ok(parsed) => {
                    let fields = TaskFields {
                        priority: Some(parsed.priority),
                        due_date: parsed.due_date,
                        ..Default::default()
                    };
                    match lock(&self.list).add(parsed.description.as_str(), fields) {
                        Ok(_) => VoiceReply::say(format!("Added task: {}", parsed.description)),
                        Err(e) => VoiceReply::say(format!("Error: {}", e)),
                    }
                }
                Err(e) => VoiceReply::say(format!("Error: {}", e)),
            },
            VoiceCommand::Complete(Some(index)) => {
                let mut list = lock(&self.list);
                match list.mark_completed(index, true).and_then(|()| list.get(index)) {
                    Ok(task) => VoiceReply::say(format!("Completed task: {}", task.description)),
                    Err(e) => VoiceReply::say(format!("Error: {}", e)),
                }
            }
            VoiceCommand::Complete(None) => VoiceReply::say("Please specify a task number"),
            VoiceCommand::ListPending => {
                let pending = lock(&self.list)
                    .tasks()
                    .iter()
                    .filter(|task| !task.completed)
                    .count();
                if pending > 0 {
                    VoiceReply::say(format!("You have {} pending tasks", pending))
                } else {
                    VoiceReply::say("No pending tasks! Great job!")
                }
            }
            VoiceCommand::Exit => VoiceReply {
                speech: "Goodbye!".to_string(),
                keep_listening: false,
            },
            VoiceCommand::Unknown => VoiceReply::say("I didn't understand that command"),
        }
    }
}

fn listen<S: SpeechIo>(assistant: &VoiceAssistant, speech: &mut S, active: &AtomicBool) {
    speech.speak("Voice assistant activated. Say 'exit' to stop.");

    while active.load(Ordering::SeqCst) {
        match speech.transcribe() {
            Ok(Some(text)) => {
                info!(command = %text, "voice command");
                let reply = assistant.handle(&text);
                speech.speak(&reply.speech);
                if !reply.keep_listening {
                    break;
                }
            }
            Ok(None) => continue,
            Err(AssistantError::InputClosed) => break,
            Err(AssistantError::Unrecognized(_)) => {
                speech.speak("I didn't understand that, please try again")
            }
            Err(e) => {
                warn!(error = %e, "voice input failed");
                speech.speak("Sorry, I encountered an error");
            }
        }
    }

    active.store(false, Ordering::SeqCst);
}

/// A listen loop running on its own thread.
pub struct VoiceSession {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VoiceSession {
    pub fn start<S>(assistant: VoiceAssistant, mut speech: S) -> io::Result<Self>
    where
        S: SpeechIo + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let handle = thread::Builder::new()
            .name("voice".to_string())
            .spawn(move || listen(&assistant, &mut speech, &flag))?;

        Ok(Self {
            active,
            handle: Some(handle),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Asks the loop to end and waits for it. The loop notices once the
    /// pending transcription returns.
    pub fn stop(mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.wait();
    }

    /// Waits for the loop to end on its own, after "exit" or closed input.
    pub fn join(mut self) {
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("voice thread panicked");
            }
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Typed commands in, printed replies out. Stands in for a microphone and
/// speaker when no audio devices are wired up.
pub struct ConsoleSpeech<R, W> {
    input: R,
    output: W,
}

impl ConsoleSpeech<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleSpeech<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R, W> SpeechIo for ConsoleSpeech<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn transcribe(&mut self) -> Result<Option<String>, AssistantError> {
        write!(self.output, "Listening... > ")
            .and_then(|()| self.output.flush())
            .map_err(|e| AssistantError::Unavailable(e.to_string()))?;

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => Err(AssistantError::InputClosed),
            Ok(_) => {
                let line = line.trim();
                Ok((!line.is_empty()).then(|| line.to_string()))
            }
            Err(e) => Err(AssistantError::Unavailable(e.to_string())),
        }
    }

    fn speak(&mut self, text: &str) {
        if let Err(e) = writeln!(self.output, "{}", text) {
            warn!(error = %e, "speech output failed");
        }
    }
}
