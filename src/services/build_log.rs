//! Append-only, user-facing build log.
//!
//! Separate from the diagnostic `tracing` output: this file holds exactly what
//! the user saw in the output pane, one timestamped line per relayed line, with
//! `[START]`/`[END]` markers around each program run.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

const LINE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const MARKER_TIMESTAMP: &str = "%a %b %e %H:%M:%S %Y";

/// Build log file. The file is opened in append mode for every write, so
/// nothing is held open between lines.
#[derive(Debug, Clone)]
pub struct BuildLog {
    path: Utf8PathBuf,
}

impl BuildLog {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Append `<timestamp> <text>`.
    pub fn append_line(&self, text: &str) -> Result<()> {
        let stamp = Local::now().format(LINE_TIMESTAMP);
        self.write_raw(&format!("{} {}\n", stamp, text))
    }

    /// `[START] <time>` marker for a new program run.
    pub fn write_start_marker(&self) -> Result<()> {
        let now = Local::now().format(MARKER_TIMESTAMP);
        self.write_raw(&format!("[START] {}\n", now))
    }

    /// `[END] <time> - Duration: <secs> seconds`, followed by a blank line.
    pub fn write_end_marker(&self, elapsed: Duration) -> Result<()> {
        let now = Local::now().format(MARKER_TIMESTAMP);
        self.write_raw(&format!(
            "[END] {} - Duration: {:.2} seconds\n\n",
            now,
            elapsed.as_secs_f64()
        ))
    }

    fn write_raw(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {}", parent))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open build log: {}", self.path))?;

        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to write build log: {}", self.path))
    }
}
