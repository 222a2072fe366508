//! Atomic in-memory settings handle with change notification
//! (`spec.md` §4.6).
//!
//! A `tokio::sync::watch` channel doubles as both the single-slot atomic
//! swap and the `Changed(newSnapshot)` subscription stream the spec asks
//! for — every subscriber observes either the pre- or post-swap value,
//! never a torn read, and each change is a full replacement rather than a
//! field-level delta.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use super::loader::{load, save, ConfigError};
use super::schema::AppSettings;

pub struct ConfigHandle {
    path: PathBuf,
    tx: watch::Sender<Arc<AppSettings>>,
}

impl ConfigHandle {
    /// Load the initial snapshot from `path` and create the handle.
    pub async fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let settings = Arc::new(load(&path).await?);
        let (tx, _rx) = watch::channel(settings);
        Ok(Self { path, tx })
    }

    /// The currently active snapshot. Cheap `Arc` clone; never torn.
    pub fn current(&self) -> Arc<AppSettings> {
        self.tx.borrow().clone()
    }

    /// A receiver that observes every subsequent replacement. The first
    /// `.changed()` await resolves on the *next* swap, not the current
    /// value — callers that also want the current value should read it
    /// via [`ConfigHandle::current`] first.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppSettings>> {
        self.tx.subscribe()
    }

    /// Persist `new_settings` to disk, then swap the in-memory snapshot
    /// and notify subscribers. The disk write happens first so a crash
    /// mid-swap never leaves subscribers observing a value that was never
    /// durably saved.
    pub async fn replace(&self, new_settings: AppSettings) -> Result<(), ConfigError> {
        save(&self.path, &new_settings).await?;
        let _ = self.tx.send(Arc::new(new_settings));
        Ok(())
    }
}
