//! Append-only audit log sink.
//!
//! Generalizes the teacher's in-memory `SecurityPolicy::audit_log`
//! (`Mutex<Vec<AuditEntry>>`, never durable) into a durable,
//! newline-delimited-JSON file with a background writer task, matching
//! `spec.md` §4.5/§9: hot-path writes are offloaded and best-effort, cold
//! paths (shutdown, revocation) are synchronous and never dropped, and a
//! write failure is never allowed to propagate to callers.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::event::{Actor, AuditEvent, AuditResult, DetailValue};

const HOT_PATH_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit log at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read audit log at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

enum WriterMsg {
    Event(AuditEvent),
    FlushAndExit(tokio::sync::oneshot::Sender<()>),
}

/// An append-only sink writing one JSON object per line to a local file
/// under the user's local app data, rotating daily: the teacher's
/// `plugins/logging.rs` uses `tracing_appender::rolling::daily` for its
/// log sink, and this writer follows the same `{prefix}.{YYYY-MM-DD}`
/// naming scheme by hand, since the writer task owns a plain `File`
/// rather than a `tracing` subscriber layer.
pub struct AuditLog {
    dir: PathBuf,
    prefix: String,
    tx: mpsc::Sender<WriterMsg>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLog {
    /// Start the background writer task. `path`'s parent directory holds
    /// the rotated files and its file name is used as the rotation
    /// prefix (e.g. `audit.log` rotates to `audit.log.2026-07-27`).
    pub async fn start(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let prefix = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("audit.log")
            .to_string();

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| AuditError::Open {
                path: dir.clone(),
                source,
            })?;

        let today = Utc::now().date_naive();
        let rotated_path = rotated_path(&dir, &prefix, today);
        let file = open_append(&rotated_path).await.map_err(|source| AuditError::Open {
            path: rotated_path,
            source,
        })?;

        let (tx, rx) = mpsc::channel(HOT_PATH_QUEUE_CAPACITY);
        let writer_task = tokio::spawn(Self::writer_loop(dir.clone(), prefix.clone(), file, today, rx));

        Ok(Self {
            dir,
            prefix,
            tx,
            writer_task: Mutex::new(Some(writer_task)),
        })
    }

    async fn writer_loop(
        dir: PathBuf,
        prefix: String,
        mut file: File,
        mut current_date: NaiveDate,
        mut rx: mpsc::Receiver<WriterMsg>,
    ) {
        while let Some(msg) = rx.recv().await {
            match msg {
                WriterMsg::Event(event) => {
                    let event_date = event.timestamp.date_naive();
                    if event_date != current_date {
                        if let Ok(rolled) = open_append(&rotated_path(&dir, &prefix, event_date)).await {
                            file = rolled;
                            current_date = event_date;
                        }
                    }
                    Self::write_one(&mut file, &event).await;
                }
                WriterMsg::FlushAndExit(done) => {
                    let _ = file.flush().await;
                    let _ = done.send(());
                    break;
                }
            }
        }
    }

    async fn write_one(file: &mut File, event: &AuditEvent) {
        // Never allowed to propagate to callers: a write failure here is
        // swallowed after a best-effort attempt, matching the
        // "Audit-write / Swallowed silently" row in the error table.
        let Ok(mut line) = serde_json::to_string(event) else {
            return;
        };
        line.push('\n');
        let _ = file.write_all(line.as_bytes()).await;
    }

    /// Convenience constructor building an [`AuditEvent`] from its parts and
    /// enqueueing it. Hot-path calls use `try_send`: a full queue drops the
    /// event (after a `log::warn!`) rather than blocking the caller.
    pub async fn log(
        &self,
        actor: Actor,
        action: &str,
        target: Option<&str>,
        result: AuditResult,
        details: HashMap<String, DetailValue>,
    ) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            actor,
            action: action.to_string(),
            target: target.map(|s| s.to_string()),
            result,
            details,
        };
        if self.tx.try_send(WriterMsg::Event(event)).is_err() {
            log::warn!("audit queue full; dropping hot-path event ({action})");
        }
    }

    /// Cold-path logging: never dropped, even if the queue is momentarily
    /// full. Used for shutdown and revocation events.
    pub async fn log_cold(
        &self,
        actor: Actor,
        action: &str,
        target: Option<&str>,
        result: AuditResult,
        details: HashMap<String, DetailValue>,
    ) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            actor,
            action: action.to_string(),
            target: target.map(|s| s.to_string()),
            result,
            details,
        };
        let _ = self.tx.send(WriterMsg::Event(event)).await;
    }

    /// Drain the writer queue synchronously and stop the writer task. Must
    /// be called exactly once, on shutdown.
    pub async fn flush_and_shutdown(&self) {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        if self.tx.send(WriterMsg::FlushAndExit(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
        if let Some(handle) = self.writer_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Tail-scan across rotated files, returning the last `n` events in
    /// chronological order. Scans each day's file oldest-first so the
    /// ring buffer ends up holding the true global tail even when it
    /// spans a rotation boundary.
    pub async fn last_n(&self, n: usize) -> Result<Vec<AuditEvent>, AuditError> {
        let mut dates = rotated_dates(&self.dir, &self.prefix).await?;
        dates.sort_unstable();

        let mut ring: VecDeque<AuditEvent> = VecDeque::with_capacity(n);
        for date in dates {
            scan_file_into_ring(&rotated_path(&self.dir, &self.prefix, date), n, &mut ring).await?;
        }
        Ok(ring.into_iter().collect())
    }
}

fn rotated_path(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{prefix}.{date}"))
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

/// Every rotated file's date, parsed from the `{prefix}.{YYYY-MM-DD}`
/// suffix of its name. Unrelated files in the same directory are
/// ignored.
async fn rotated_dates(dir: &Path, prefix: &str) -> Result<Vec<NaiveDate>, AuditError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(AuditError::Read {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let needle = format!("{prefix}.");
    let mut dates = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| AuditError::Read {
        path: dir.to_path_buf(),
        source,
    })? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if let Some(suffix) = name.strip_prefix(&needle) {
            if let Ok(date) = NaiveDate::parse_from_str(suffix, "%Y-%m-%d") {
                dates.push(date);
            }
        }
    }
    Ok(dates)
}

async fn scan_file_into_ring(
    path: &Path,
    n: usize,
    ring: &mut VecDeque<AuditEvent>,
) -> Result<(), AuditError> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(AuditError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|source| AuditError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if read == 0 {
            break;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<AuditEvent>(trimmed) {
            if ring.len() == n {
                ring.pop_front();
            }
            ring.push_back(event);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn log_then_flush_then_tail_scan_returns_event() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.log");
        let log = AuditLog::start(&path).await.unwrap();
        log.log(
            Actor::Gate,
            "PERMISSION_BLOCKED",
            Some("web_search"),
            AuditResult::Error("Disabled in Settings".to_string()),
            HashMap::new(),
        )
        .await;
        log.flush_and_shutdown().await;

        let events = log.last_n(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "PERMISSION_BLOCKED");

        let today = Utc::now().date_naive();
        assert!(rotated_path(tmp.path(), "audit.log", today).exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn tail_scan_returns_last_n_in_file_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.log");
        let log = AuditLog::start(&path).await.unwrap();
        for i in 0..5 {
            log.log(
                Actor::System,
                "TEST_EVENT",
                Some(&format!("item-{i}")),
                AuditResult::Ok,
                HashMap::new(),
            )
            .await;
        }
        log.flush_and_shutdown().await;

        let events = log.last_n(3).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].target.as_deref(), Some("item-2"));
        assert_eq!(events[1].target.as_deref(), Some("item-3"));
        assert_eq!(events[2].target.as_deref(), Some("item-4"));
    }

    #[tokio::test]
    async fn last_n_on_missing_directory_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("does-not-exist");
        let dates = rotated_dates(&dir, "audit.log").await.unwrap();
        assert!(dates.is_empty());
    }

    #[tokio::test]
    async fn monotonic_timestamps_within_a_single_source() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.log");
        let log = AuditLog::start(&path).await.unwrap();
        for _ in 0..10 {
            log.log(Actor::System, "TICK", None, AuditResult::Ok, HashMap::new())
                .await;
        }
        log.flush_and_shutdown().await;

        let events = log.last_n(100).await.unwrap();
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn cold_path_writes_are_never_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.log");
        let log = AuditLog::start(&path).await.unwrap();
        for i in 0..500 {
            log.log_cold(
                Actor::System,
                "REVOKE_ALL",
                Some(&format!("cohort-{i}")),
                AuditResult::Ok,
                HashMap::new(),
            )
            .await;
        }
        log.flush_and_shutdown().await;
        let events = log.last_n(1000).await.unwrap();
        assert_eq!(events.len(), 500);
    }

    #[tokio::test]
    async fn last_n_reads_across_a_rotation_boundary() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.log");
        let log = AuditLog::start(&path).await.unwrap();
        log.log_cold(
            Actor::System,
            "TODAY_EVENT",
            Some("item-today"),
            AuditResult::Ok,
            HashMap::new(),
        )
        .await;
        log.flush_and_shutdown().await;

        // A prior day's rotated file, written directly to simulate a file
        // left behind by an earlier run.
        let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
        let stale_event = AuditEvent {
            timestamp: yesterday.and_hms_opt(12, 0, 0).unwrap().and_utc(),
            actor: Actor::System,
            action: "YESTERDAY_EVENT".to_string(),
            target: Some("item-yesterday".to_string()),
            result: AuditResult::Ok,
            details: HashMap::new(),
        };
        tokio::fs::write(
            rotated_path(tmp.path(), "audit.log", yesterday),
            format!("{}\n", serde_json::to_string(&stale_event).unwrap()),
        )
        .await
        .unwrap();

        let log = AuditLog::start(&path).await.unwrap();
        let events = log.last_n(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "YESTERDAY_EVENT");
        assert_eq!(events[1].action, "TODAY_EVENT");
    }
}
