//! Owned child-process handle and its on-disk session-state file
//! (`spec.md` §3 `SubprocessHandle`).
//!
//! Grounded in the teacher's `SidecarService` (`Arc<Mutex<Option<Child>>>`,
//! take-then-await-outside-the-lock shutdown), extended with the session
//! file this spec needs for crash-resilient reaping across restarts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Child;
use tokio::sync::Mutex;

use super::errors::SupervisorError;

/// On-disk record of a live voice-host child, written after it becomes
/// ready so a future supervisor instance can reap it if this process
/// crashed without a clean shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub base_url: String,
    pub port: u16,
    pub pid: u32,
    pub updated_at_utc: DateTime<Utc>,
}

impl SessionState {
    pub async fn read(path: &Path) -> Result<Option<SessionState>, SupervisorError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SupervisorError::SessionState {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub async fn write(&self, path: &Path) -> Result<(), SupervisorError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SupervisorError::SessionState {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        let body =
            serde_json::to_string_pretty(self).expect("SessionState always serializes");
        tokio::fs::write(path, body)
            .await
            .map_err(|source| SupervisorError::SessionState {
                path: path.to_path_buf(),
                source,
            })
    }

    pub async fn delete(path: &Path) -> Result<(), SupervisorError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SupervisorError::SessionState {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Best-effort liveness check for a PID recorded in a session file.
/// Unix-only (`kill -0`); on other platforms a stale PID is conservatively
/// assumed dead so reaping never fires spuriously.
#[cfg(unix)]
pub fn is_pid_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_pid_alive(_pid: u32) -> bool {
    false
}

/// Best-effort check that `pid` actually names a process whose executable
/// basename matches `expected_command`. Reaping a PID from a stale JSON
/// session file is dangerous if the PID has since been recycled by an
/// unrelated process — this guard is required before any kill.
#[cfg(target_os = "linux")]
pub fn process_matches_command(pid: u32, expected_command: &str) -> bool {
    let expected_basename = Path::new(expected_command)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(expected_command);
    match std::fs::read_to_string(format!("/proc/{pid}/comm")) {
        Ok(comm) => comm.trim() == expected_basename,
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
pub fn process_matches_command(_pid: u32, _expected_command: &str) -> bool {
    // Best-effort only outside Linux: liveness was already confirmed by
    // `is_pid_alive`; without a portable way to read the executable name
    // here, err toward not reaping rather than guessing.
    false
}

/// Kill a PID and its process-group/tree. Unix sends `SIGKILL` to the
/// PID; a more thorough tree-kill is not needed here because voice hosts
/// are spawned leaf processes with no children of their own.
#[cfg(unix)]
pub async fn kill_pid_tree(pid: u32) {
    let _ = tokio::process::Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .output()
        .await;
}

#[cfg(not(unix))]
pub async fn kill_pid_tree(_pid: u32) {}

/// Owns one child process: its stdio/handle, the port it bound (if any),
/// and the session-state file path used to reap it across restarts.
pub struct SubprocessHandle {
    child: Mutex<Option<Child>>,
    pub session_path: PathBuf,
}

impl SubprocessHandle {
    pub fn new(session_path: impl Into<PathBuf>) -> Self {
        Self {
            child: Mutex::new(None),
            session_path: session_path.into(),
        }
    }

    pub async fn set_child(&self, child: Child) {
        let mut guard = self.child.lock().await;
        *guard = Some(child);
    }

    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(|c| c.id())
    }

    pub async fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the owned child, if any, and delete the session file. Takes
    /// the child out from under the lock before awaiting, per the
    /// teacher's `SidecarService::stop` pattern.
    pub async fn stop(&self) {
        let child_opt = {
            let mut guard = self.child.lock().await;
            guard.take()
        };
        if let Some(mut child) = child_opt {
            let _ = child.kill().await;
        }
        let _ = SessionState::delete(&self.session_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn session_state_round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("voice-host-session.json");
        let state = SessionState {
            base_url: "http://127.0.0.1:8799".to_string(),
            port: 8799,
            pid: 4242,
            updated_at_utc: Utc::now(),
        };
        state.write(&path).await.unwrap();

        let loaded = SessionState::read(&path).await.unwrap().unwrap();
        assert_eq!(loaded.port, 8799);
        assert_eq!(loaded.pid, 4242);
    }

    #[tokio::test]
    async fn missing_session_file_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");
        assert!(SessionState::read(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_session_file_reads_as_none_rather_than_erroring() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("corrupt.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(SessionState::read(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent_on_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");
        SessionState::delete(&path).await.unwrap();
        SessionState::delete(&path).await.unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn current_process_pid_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn absurd_pid_is_not_alive() {
        assert!(!is_pid_alive(u32::MAX));
    }

    #[tokio::test]
    async fn stop_on_empty_handle_is_safe() {
        let tmp = TempDir::new().unwrap();
        let handle = SubprocessHandle::new(tmp.path().join("session.json"));
        handle.stop().await;
        assert!(!handle.is_alive().await);
    }
}
