use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use netpulse_types::{
    metrics::{LogEntry, MetricSnapshot},
    Result,
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::{Mutex, RwLock},
};
use tracing::{debug, info, warn};

use crate::store_error;

/// Durable record of submitted snapshots with a rolling retention window.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Stamps and stores `snapshot`, then prunes with the store's retention.
    async fn append(&self, snapshot: MetricSnapshot) -> Result<LogEntry>;
    /// Entries for `interface` (all when `None`) at or after `since`,
    /// newest first.
    async fn query(
        &self,
        interface: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEntry>>;
    /// Drops entries whose snapshot is older than `now - retention`.
    async fn prune(&self, retention: Duration) -> Result<usize>;
    fn retention(&self) -> Duration;
}

/// Append-only metrics log, optionally mirrored to a JSON-lines file.
///
/// Writers are serialized through `writer`, so an append and the prune it
/// triggers land as one unit. Readers only take the entries read lock and
/// see the state as of their call.
pub struct MetricsLog {
    entries: RwLock<Vec<LogEntry>>,
    writer: Mutex<Option<PathBuf>>,
    retention: Duration,
}

impl MetricsLog {
    pub const DEFAULT_RETENTION_HOURS: i64 = 24;

    pub fn in_memory(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(None),
            retention,
        }
    }

    /// Opens (or creates) a file-backed log, replaying existing lines.
    /// Corrupt lines are skipped.
    pub async fn open(path: impl AsRef<Path>, retention: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|err| {
                store_error(format!("failed to create {}: {err}", parent.display()))
            })?;
        }

        let mut entries = Vec::new();
        match fs::read_to_string(&path).await {
            Ok(contents) => {
                for (line_no, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogEntry>(line) {
                        Ok(entry) => entries.push(entry),
                        Err(err) => warn!(
                            path = %path.display(),
                            line = line_no + 1,
                            "skipping corrupt metrics log line: {err}"
                        ),
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(store_error(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        }

        let loaded = entries.len();
        let cutoff = Utc::now() - retention;
        entries.retain(|entry| entry.snapshot.timestamp >= cutoff);
        info!(
            path = %path.display(),
            loaded,
            kept = entries.len(),
            "metrics log opened"
        );
        if entries.len() != loaded {
            rewrite(&path, &entries).await?;
        }

        Ok(Self {
            entries: RwLock::new(entries),
            writer: Mutex::new(Some(path)),
            retention,
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Prune while already holding the writer lock. The entries lock is
    /// released before the file is rewritten.
    async fn prune_locked(&self, path: Option<&Path>, retention: Duration) -> Result<usize> {
        let cutoff = Utc::now() - retention;
        let (removed, body) = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|entry| entry.snapshot.timestamp >= cutoff);
            let removed = before - entries.len();
            let body = match path {
                Some(_) if removed > 0 => Some(encode_lines(&entries)?),
                _ => None,
            };
            (removed, body)
        };
        if removed > 0 {
            debug!(removed, "pruned metrics log");
        }
        if let (Some(path), Some(body)) = (path, body) {
            write_body(path, body).await?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl MetricsStore for MetricsLog {
    async fn append(&self, snapshot: MetricSnapshot) -> Result<LogEntry> {
        let writer = self.writer.lock().await;
        let entry = LogEntry {
            recorded_at: Utc::now(),
            snapshot,
        };

        if let Some(path) = writer.as_deref() {
            let mut line = serde_json::to_string(&entry)
                .map_err(|err| store_error(format!("failed to encode log entry: {err}")))?;
            line.push('\n');
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|err| store_error(format!("failed to open {}: {err}", path.display())))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|err| store_error(format!("failed to append log entry: {err}")))?;
            file.flush()
                .await
                .map_err(|err| store_error(format!("failed to flush metrics log: {err}")))?;
        }

        self.entries.write().await.push(entry.clone());
        self.prune_locked(writer.as_deref(), self.retention).await?;
        Ok(entry)
    }

    async fn query(
        &self,
        interface: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEntry>> {
        let mut matching: Vec<LogEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|entry| interface.map_or(true, |name| entry.snapshot.interface == name))
            .filter(|entry| since.map_or(true, |since| entry.snapshot.timestamp >= since))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.snapshot
                .timestamp
                .cmp(&a.snapshot.timestamp)
                .then_with(|| b.recorded_at.cmp(&a.recorded_at))
        });
        Ok(matching)
    }

    async fn prune(&self, retention: Duration) -> Result<usize> {
        let writer = self.writer.lock().await;
        self.prune_locked(writer.as_deref(), retention).await
    }

    fn retention(&self) -> Duration {
        self.retention
    }
}

impl Default for MetricsLog {
    fn default() -> Self {
        Self::in_memory(Duration::hours(Self::DEFAULT_RETENTION_HOURS))
    }
}

async fn rewrite(path: &Path, entries: &[LogEntry]) -> Result<()> {
    write_body(path, encode_lines(entries)?).await
}

fn encode_lines(entries: &[LogEntry]) -> Result<String> {
    let mut body = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|err| store_error(format!("failed to encode log entry: {err}")))?;
        body.push_str(&line);
        body.push('\n');
    }
    Ok(body)
}

/// Replaces the file contents through a temp file and rename.
async fn write_body(path: &Path, body: String) -> Result<()> {
    let tmp = path.with_extension("jsonl.tmp");
    fs::write(&tmp, body)
        .await
        .map_err(|err| store_error(format!("failed to write {}: {err}", tmp.display())))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|err| store_error(format!("failed to replace {}: {err}", path.display())))
}
