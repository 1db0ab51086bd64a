//! Deploy summary sink
//!
//! Collects the actions, paragraphs, and phase headings emitted during a
//! task and prints them as one block at the end, so CI logs carry a single
//! authoritative account of what happened. Appends are thread-safe; order is
//! append order. Tones are rendering hints, not part of the content.

use std::fmt;
use std::sync::Mutex;

/// Rendering hint for a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Success,
    Warning,
    Failure,
}

/// Terminal classification of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    TimedOut,
    Failure,
}

impl TaskStatus {
    /// Tag value for metrics (`status:<tag>`).
    pub fn metric_tag(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::TimedOut => "timeout",
            TaskStatus::Failure => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "SUCCESS"),
            TaskStatus::TimedOut => write!(f, "TIMED OUT"),
            TaskStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Heading(String),
    Action(String),
    Paragraph { text: String, tone: Tone },
}

/// Thread-safe summary store.
#[derive(Debug, Default)]
pub struct DeploySummary {
    entries: Mutex<Vec<Entry>>,
}

impl DeploySummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a phase started. Headings are logged immediately as well
    /// so progress is visible while the task runs.
    pub fn phase_heading(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("----- {text} -----");
        self.entries.lock().unwrap().push(Entry::Heading(text));
    }

    /// One-line record of something the deploy did.
    pub fn add_action(&self, text: impl Into<String>) {
        self.entries.lock().unwrap().push(Entry::Action(text.into()));
    }

    pub fn add_paragraph(&self, text: impl Into<String>, tone: Tone) {
        self.entries
            .lock()
            .unwrap()
            .push(Entry::Paragraph { text: text.into(), tone });
    }

    /// Phase headings in append order.
    pub fn headings(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Entry::Heading(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Actions in append order.
    pub fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Entry::Action(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Paragraph texts in append order.
    pub fn paragraphs(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Entry::Paragraph { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn render(&self, status: TaskStatus) -> String {
        let entries = self.entries.lock().unwrap();
        let mut out = String::new();
        out.push_str(&format!("{:-^72}\n", format!(" Result: {status} ")));
        for entry in entries.iter() {
            match entry {
                Entry::Heading(_) => {}
                Entry::Action(text) => out.push_str(&format!("- {text}\n")),
                Entry::Paragraph { text, .. } => {
                    out.push('\n');
                    out.push_str(text);
                    out.push('\n');
                }
            }
        }
        out
    }

    pub fn print_summary(&self, status: TaskStatus) {
        println!("{}", self.render(status));
    }
}
