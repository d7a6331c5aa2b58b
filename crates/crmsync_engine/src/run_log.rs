//! Terminal run outcomes and the append-only run log.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Terminal status of an entity run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// The replica matches the remote source.
    Ok,
    /// The run failed or left a divergence.
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => f.write_str("OK"),
            RunStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// Result of a full or incremental run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Terminal status.
    pub status: RunStatus,
    /// Local row count at the end of the run (0 when the run failed outright).
    pub count: u64,
    /// Optional human-readable detail.
    pub detail: Option<String>,
}

impl RunOutcome {
    /// A successful outcome.
    pub fn ok(count: u64, detail: Option<String>) -> Self {
        Self {
            status: RunStatus::Ok,
            count,
            detail,
        }
    }

    /// A failed outcome.
    pub fn error(count: u64, detail: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            count,
            detail: Some(detail.into()),
        }
    }

    /// Returns true for [`RunStatus::Ok`].
    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }
}

/// One line of the run log.
#[derive(Debug, Clone)]
pub struct RunLogEntry {
    /// Tenant key.
    pub tenant: String,
    /// Entity table base name.
    pub entity: String,
    /// When the run started.
    pub started: DateTime<Local>,
    /// When the run ended.
    pub finished: DateTime<Local>,
    /// What happened.
    pub outcome: RunOutcome,
}

impl RunLogEntry {
    /// Renders the entry as a single log line, without trailing newline.
    pub fn line(&self) -> String {
        let mut line = format!(
            "[{}] {} | {} | START: {} | END: {} | TOTAL: {} | STATUS: {}",
            self.finished.format("%d/%m/%Y %H:%M:%S"),
            self.tenant.to_uppercase(),
            self.entity.to_uppercase(),
            self.started.format("%H:%M:%S"),
            self.finished.format("%H:%M:%S"),
            self.outcome.count,
            self.outcome.status,
        );
        if let Some(detail) = self.outcome.detail.as_deref().filter(|d| !d.is_empty()) {
            line.push(' ');
            line.push_str(detail);
        }
        line
    }
}

/// Sink for terminal run outcomes.
///
/// # Implementors
///
/// - [`FileRunLog`]
/// - [`MemoryRunLog`]
pub trait RunLog: Send + Sync {
    /// Appends one entry.
    fn append(&self, entry: &RunLogEntry) -> io::Result<()>;
}

/// Appends run log lines to a file.
#[derive(Debug)]
pub struct FileRunLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRunLog {
    /// Creates a run log appending to `path`. The file is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLog for FileRunLog {
    fn append(&self, entry: &RunLogEntry) -> io::Result<()> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.line())
    }
}

/// An in-memory run log for testing.
#[derive(Debug, Default)]
pub struct MemoryRunLog {
    entries: Mutex<Vec<RunLogEntry>>,
}

impl MemoryRunLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, in append order.
    pub fn entries(&self) -> Vec<RunLogEntry> {
        self.entries.lock().clone()
    }

    /// All rendered lines, in append order.
    pub fn lines(&self) -> Vec<String> {
        self.entries.lock().iter().map(RunLogEntry::line).collect()
    }
}

impl RunLog for MemoryRunLog {
    fn append(&self, entry: &RunLogEntry) -> io::Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(outcome: RunOutcome) -> RunLogEntry {
        RunLogEntry {
            tenant: "acme".into(),
            entity: "deals".into(),
            started: Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            finished: Local.with_ymd_and_hms(2024, 5, 1, 10, 2, 30).unwrap(),
            outcome,
        }
    }

    #[test]
    fn line_format() {
        let line = entry(RunOutcome::ok(120, None)).line();
        assert_eq!(
            line,
            "[01/05/2024 10:02:30] ACME | DEALS | START: 10:00:00 | END: 10:02:30 | TOTAL: 120 | STATUS: OK"
        );

        let line = entry(RunOutcome::error(70, "persistent divergence (50)")).line();
        assert!(line.ends_with("TOTAL: 70 | STATUS: ERROR persistent divergence (50)"));
    }

    #[test]
    fn file_log_appends() {
        let dir = TempDir::new().unwrap();
        let log = FileRunLog::new(dir.path().join("sync.log"));

        log.append(&entry(RunOutcome::ok(1, None))).unwrap();
        log.append(&entry(RunOutcome::ok(2, Some("(incremental)".into()))))
            .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("STATUS: OK (incremental)"));
    }

    #[test]
    fn memory_log_keeps_entries() {
        let log = MemoryRunLog::new();
        log.append(&entry(RunOutcome::ok(3, None))).unwrap();
        assert_eq!(log.entries()[0].outcome.count, 3);
        assert_eq!(log.lines().len(), 1);
    }
}
