//! Execution Log - bounded history of task outcomes
//!
//! Records live in memory (most recent `max_in_memory`, oldest evicted first)
//! and are optionally mirrored to `<dir>/<agent>-log.jsonl`, one JSON object
//! per line. The file is opened, appended and closed for every record.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{ExecutionRecord, ExecutionStatus};

/// Default in-memory capacity
pub const DEFAULT_MAX_IN_MEMORY: usize = 1000;

/// Default number of records returned by [`ExecutionLog::get_records`] callers
pub const DEFAULT_RECORD_LIMIT: usize = 50;

struct LogInner {
    records: VecDeque<ExecutionRecord>,
    max_in_memory: usize,
    persist_dir: Option<PathBuf>,
}

impl LogInner {
    fn trim(&mut self) {
        while self.records.len() > self.max_in_memory {
            self.records.pop_front();
        }
    }
}

/// In-memory execution history with an optional JSONL mirror
pub struct ExecutionLog {
    inner: Mutex<LogInner>,
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                records: VecDeque::new(),
                max_in_memory: DEFAULT_MAX_IN_MEMORY,
                persist_dir: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mirror future records into `dir`
    pub fn set_persist_dir(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        debug!(?dir, "ExecutionLog::set_persist_dir: called");
        self.lock().persist_dir = Some(dir);
    }

    /// Change the in-memory capacity, evicting the oldest surplus records
    pub fn set_max_in_memory(&self, max: usize) {
        debug!(max, "ExecutionLog::set_max_in_memory: called");
        let mut inner = self.lock();
        inner.max_in_memory = max;
        inner.trim();
    }

    /// Mirror a record to disk if a persist dir is set, then append it in memory
    ///
    /// Persistence failures are logged and swallowed. A record visible through
    /// the readers has already been written to its file.
    pub async fn record(&self, entry: ExecutionRecord) {
        debug!(task_id = %entry.task_id, status = %entry.status, "ExecutionLog::record: called");
        let persist_dir = self.lock().persist_dir.clone();
        if let Some(dir) = persist_dir {
            if let Err(e) = persist_record(&dir, &entry).await {
                warn!(task_id = %entry.task_id, error = %e, "Failed to persist execution record");
            }
        }

        let mut inner = self.lock();
        inner.records.push_back(entry);
        inner.trim();
    }

    /// The most recent `limit` records, optionally filtered by agent, oldest first
    pub fn get_records(&self, agent_name: Option<&str>, limit: usize) -> Vec<ExecutionRecord> {
        let inner = self.lock();
        let filtered: Vec<&ExecutionRecord> = inner
            .records
            .iter()
            .filter(|r| agent_name.is_none_or(|name| r.agent_name == name))
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).cloned().collect()
    }

    /// Latest record for an agent
    pub fn get_last_record(&self, agent_name: &str) -> Option<ExecutionRecord> {
        self.lock()
            .records
            .iter()
            .rev()
            .find(|r| r.agent_name == agent_name)
            .cloned()
    }

    /// Record counts grouped by status, optionally filtered by agent
    pub fn get_stats(&self, agent_name: Option<&str>) -> BTreeMap<ExecutionStatus, usize> {
        let inner = self.lock();
        tally(
            inner
                .records
                .iter()
                .filter(|r| agent_name.is_none_or(|name| r.agent_name == name)),
        )
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every in-memory record (persisted files are untouched)
    pub fn clear(&self) {
        debug!("ExecutionLog::clear: called");
        self.lock().records.clear();
    }
}

/// Count records by status
pub fn tally<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> BTreeMap<ExecutionStatus, usize> {
    let mut stats = BTreeMap::new();
    for record in records {
        *stats.entry(record.status).or_insert(0) += 1;
    }
    stats
}

/// Path of an agent's persisted log inside `dir`
pub fn log_file_path(dir: impl AsRef<Path>, agent_name: &str) -> PathBuf {
    dir.as_ref().join(format!("{agent_name}-log.jsonl"))
}

async fn persist_record(dir: &Path, entry: &ExecutionRecord) -> eyre::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = log_file_path(dir, &entry.agent_name);
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Read an agent's persisted records
///
/// A missing file yields an empty list; unparseable lines are skipped with a warning.
pub fn read_execution_records(dir: impl AsRef<Path>, agent_name: &str) -> eyre::Result<Vec<ExecutionRecord>> {
    let log_path = log_file_path(dir, agent_name);
    debug!(?log_path, "read_execution_records: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut records = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ExecutionRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line, error = %e, "read_execution_records: failed to parse line");
            }
        }
    }

    debug!(count = records.len(), "read_execution_records: loaded records");
    Ok(records)
}
