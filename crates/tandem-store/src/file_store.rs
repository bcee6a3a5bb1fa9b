use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tandem_domain::{ControlLogStore, DomainError, DomainResult, FieldMap, LogEntry};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub path: PathBuf,

    /// Newest entries kept per save cycle (default: 1000)
    pub max_history: usize,

    /// Entries older than this are pruned (default: 7 days)
    pub retention_days: i64,
}

impl FileStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_history: 1000,
            retention_days: 7,
        }
    }
}

/// File-backed implementation of `ControlLogStore`.
///
/// The whole retained window is rewritten on every append: written to a
/// temporary file, fsynced, then atomically renamed over the destination,
/// so a crash mid-write never leaves a torn file. Only this file is
/// durable; the dedup caches are memory-only.
pub struct FileControlLogStore {
    config: FileStoreConfig,
    entries: Mutex<Vec<LogEntry>>,
}

impl FileControlLogStore {
    /// Open the store, reconstructing the in-memory sequence from the file
    /// if present. A file that fails to parse is non-fatal: the store
    /// starts empty and the broken file stays on disk until the next
    /// successful persist replaces it.
    pub async fn load(config: FileStoreConfig) -> Self {
        let entries = match tokio::fs::read(&config.path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<LogEntry>>(&bytes) {
                Ok(entries) => {
                    info!(
                        count = entries.len(),
                        path = %config.path.display(),
                        "loaded control log"
                    );
                    entries
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %config.path.display(),
                        "control log unreadable, starting empty"
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config.path.display(),
                    "control log unreadable, starting empty"
                );
                Vec::new()
            }
        };

        Self {
            config,
            entries: Mutex::new(entries),
        }
    }

    /// Persist the retained window of `entries` and return it.
    async fn persist(&self, entries: &[LogEntry]) -> DomainResult<Vec<LogEntry>> {
        let retained = retained_window(
            entries,
            Utc::now(),
            self.config.retention_days,
            self.config.max_history,
        );

        let json = serde_json::to_string_pretty(&retained)
            .map_err(|e| DomainError::LogPersistence(e.to_string()))?;

        write_atomically(&self.config.path, json.as_bytes())
            .await
            .map_err(|e| DomainError::LogPersistence(e.to_string()))?;

        debug!(
            count = retained.len(),
            path = %self.config.path.display(),
            "persisted control log"
        );
        Ok(retained)
    }

    /// Flush the current retained window to disk, e.g. at shutdown.
    pub async fn flush(&self) -> DomainResult<()> {
        let mut entries = self.entries.lock().await;
        let retained = self.persist(&entries).await?;
        *entries = retained;
        Ok(())
    }
}

#[async_trait]
impl ControlLogStore for FileControlLogStore {
    async fn append(&self, entry: LogEntry) -> DomainResult<()> {
        let mut entries = self.entries.lock().await;
        entries.push(entry);

        // On a persist failure the full in-memory sequence survives,
        // including the new entry; the next append retries the write.
        let retained = self.persist(&entries).await?;
        *entries = retained;
        Ok(())
    }

    async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }

    async fn history(&self) -> Vec<FieldMap> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| entry.sensor_data.clone())
            .collect()
    }
}

/// Retention filter and count cap. Entries whose timestamp does not parse
/// are conservatively retained rather than dropped.
fn retained_window(
    entries: &[LogEntry],
    now: DateTime<Utc>,
    retention_days: i64,
    max_history: usize,
) -> Vec<LogEntry> {
    let cutoff = now - Duration::days(retention_days);

    let filtered: Vec<LogEntry> = entries
        .iter()
        .filter(|entry| match DateTime::parse_from_rfc3339(&entry.timestamp) {
            Ok(timestamp) => timestamp.with_timezone(&Utc) >= cutoff,
            Err(_) => true,
        })
        .cloned()
        .collect();

    let skip = filtered.len().saturating_sub(max_history);
    filtered.into_iter().skip(skip).collect()
}

/// Write via temp file + fsync + rename so readers and crash recovery only
/// ever see a complete file.
async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await
}
