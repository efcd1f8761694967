//! Daily JSON-lines journal of generation attempts.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Lifecycle events that get journalled.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    /// Request validated and assets stored
    Started,
    /// Backend returned images
    Completed,
    /// Anything after validation went wrong
    Failed,
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// One line of the journal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    /// RFC 3339 time of the event
    pub timestamp: String,
    /// Per-run id
    pub session_id: String,
    /// What happened
    pub status: JournalStatus,
    /// Free-form event details
    pub details: Value,
}

/// Appends entries to `{dir}/generation_{YYYYMMDD}.json`.
#[derive(Clone, Debug)]
pub struct GenerationJournal {
    dir: PathBuf,
}

impl GenerationJournal {
    /// A journal writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("generation_{}.json", date.format("%Y%m%d")))
    }

    /// Records an event. Failures are logged and otherwise ignored.
    pub async fn record(&self, session_id: &str, status: JournalStatus, details: Value) {
        let now = Utc::now();
        let entry = JournalEntry {
            timestamp: now.to_rfc3339(),
            session_id: session_id.to_string(),
            status,
            details,
        };
        let path = self.file_for(now.date_naive());
        if let Err(err) = self.append(&path, &entry).await {
            warn!("Failed to log generation to {}: {}", path.display(), err);
        }
    }

    async fn append(&self, path: &Path, entry: &JournalEntry) -> Result<(), std::io::Error> {
        let mut line = serde_json::to_vec(entry).map_err(std::io::Error::other)?;
        line.push(b'\n');
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }

    /// Counts today's entries with the given status.
    pub async fn count_today(&self, status: JournalStatus) -> Result<usize, std::io::Error> {
        let path = self.file_for(Utc::now().date_naive());
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str::<JournalEntry>(line).ok())
            .filter(|entry| entry.status == status)
            .count())
    }
}
