//! Human-readable progress reporting.

use std::sync::Mutex;

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// A stage is starting.
    Status,
    /// The deployment finished.
    Success,
    /// The deployment failed.
    Error,
}

/// Receives stage announcements. Fire-and-forget.
pub trait Reporter {
    fn log(&self, message: &str, level: Level);
}

/// Writes announcements to the terminal and mirrors them to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn log(&self, message: &str, level: Level) {
        match level {
            Level::Status => {
                log::debug!("{}", message);
                println!("{}", message);
            }
            Level::Success => {
                log::info!("{}", message);
                println!("{}", message);
            }
            Level::Error => {
                log::error!("{}", message);
                eprintln!("Error: {}", message);
            }
        }
    }
}

/// Collects announcements in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    entries: Mutex<Vec<(Level, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded so far, oldest first.
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Messages recorded at `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn log(&self, message: &str, level: Level) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn log(&self, message: &str, level: Level) {
        (**self).log(message, level);
    }
}
