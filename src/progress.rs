//! Progress reporting
//!
//! Status lines emitted during a run. Purely observational: nothing a sink
//! does can change the outcome of the run.

use std::sync::Mutex;

const BANNER: &str = "----------------------------------------------------------";

pub trait ProgressSink: Send + Sync {
    /// Start of a stage ("Refreshing region data")
    fn stage(&self, title: &str);

    /// Human-readable status line
    fn line(&self, message: &str);
}

/// Forwards progress to `tracing` at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn stage(&self, title: &str) {
        tracing::info!(stage = %title, "Stage started");
    }

    fn line(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Prints banner-framed progress to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress {
    /// Only print stage banners
    pub quiet: bool,
}

impl ProgressSink for ConsoleProgress {
    fn stage(&self, title: &str) {
        println!("{BANNER}");
        println!("{title}");
        println!("{BANNER}");
    }

    fn line(&self, message: &str) {
        if !self.quiet {
            println!("{message}");
        }
    }
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct CollectingProgress {
    lines: Mutex<Vec<String>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl ProgressSink for CollectingProgress {
    fn stage(&self, title: &str) {
        self.push(format!("== {title}"));
    }

    fn line(&self, message: &str) {
        self.push(message.to_string());
    }
}
