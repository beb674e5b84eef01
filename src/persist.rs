//! Debounced snapshotting and priority-ordered restore of wizard state.
//!
//! Writes are last-write-wins through a debounce window; a write that would
//! persist an inconsistent combination (the initial stage with a package
//! already selected, which would falsely signal "not started") is suppressed
//! outright. Restore walks a fixed priority ladder where a `Final` snapshot
//! always wins: a reload must never lose a completed result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::stage::WizardStage;
use crate::state::WizardState;

/// Storage slot key for the main wizard snapshot.
pub const WIZARD_SNAPSHOT_KEY: &str = "wizard";

/// A serializable projection of wizard state plus its write timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub written_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: WizardState,
}

impl PersistedSnapshot {
    pub fn capture(state: &WizardState) -> Self {
        Self {
            written_at: Utc::now(),
            state: state.clone(),
        }
    }
}

/// Keyed string-slot storage behind the persistence layer.
///
/// The file backend is the production default; the in-memory backend backs
/// tests and headless runs.
pub trait SnapshotBackend: Send + Sync {
    fn save(&self, key: &str, payload: &str) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key under a base directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl SnapshotBackend for FileBackend {
    fn save(&self, key: &str, payload: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create snapshot dir: {}", self.dir.display()))?;
        let path = self.path_for(key);
        std::fs::write(&path, payload)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove snapshot: {}", path.display()))?;
        }
        Ok(())
    }
}

/// In-memory storage for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn save(&self, key: &str, payload: &str) -> Result<()> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Debounced writer and priority-ordered reader for the wizard snapshot slot.
pub struct PersistenceStore {
    backend: Arc<dyn SnapshotBackend>,
    debounce: Duration,
    last_write: Option<Instant>,
}

impl PersistenceStore {
    pub fn new(backend: Arc<dyn SnapshotBackend>, debounce: Duration) -> Self {
        Self {
            backend,
            debounce,
            last_write: None,
        }
    }

    /// Shared storage handle, for components persisting their own slots.
    pub fn backend(&self) -> Arc<dyn SnapshotBackend> {
        Arc::clone(&self.backend)
    }

    /// Offer a snapshot write. Returns whether it was persisted; writes
    /// inside the debounce window or suppressed as inconsistent are dropped
    /// (a later write carries the newer state anyway).
    pub fn offer(&mut self, state: &WizardState) -> Result<bool> {
        if let Some(last) = self.last_write {
            if last.elapsed() < self.debounce {
                return Ok(false);
            }
        }
        self.write(state)
    }

    /// Write immediately, bypassing the debounce (teardown, terminal events).
    pub fn flush(&mut self, state: &WizardState) -> Result<bool> {
        self.write(state)
    }

    fn write(&mut self, state: &WizardState) -> Result<bool> {
        if Self::suppressed(state) {
            debug!(stage = ?state.stage, "suppressing inconsistent snapshot write");
            return Ok(false);
        }
        let snapshot = PersistedSnapshot::capture(state);
        let payload =
            serde_json::to_string(&snapshot).context("Failed to serialize wizard snapshot")?;
        self.backend.save(WIZARD_SNAPSHOT_KEY, &payload)?;
        self.last_write = Some(Instant::now());
        Ok(true)
    }

    /// A snapshot claiming "not started" while a package is already selected
    /// would corrupt resumability; never persist that combination.
    fn suppressed(state: &WizardState) -> bool {
        state.stage == WizardStage::initial() && state.selected_package.is_some()
    }

    /// Restore the persisted snapshot, applying the priority ladder:
    ///
    /// 1. `Final` snapshot — restore unconditionally, no further checks
    /// 2. initial stage with no package — fresh start, discard
    /// 3. no package and stage past package selection — inconsistent, discard
    /// 4. `Completed` marker — finished project, force restart, discard
    /// 5. anything else — restore
    ///
    /// Structural failures (unreadable or malformed payload) discard the
    /// snapshot and fall back to default state without user interruption.
    pub fn restore(&self) -> Result<Option<WizardState>> {
        let Some(payload) = self.backend.load(WIZARD_SNAPSHOT_KEY)? else {
            return Ok(None);
        };

        let snapshot: PersistedSnapshot = match serde_json::from_str(&payload) {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "discarding malformed wizard snapshot");
                return Ok(None);
            }
        };
        let state = snapshot.state;

        if state.stage == WizardStage::Final {
            return Ok(Some(state));
        }
        if state.stage == WizardStage::initial() && state.selected_package.is_none() {
            debug!("discarding fresh-start snapshot");
            return Ok(None);
        }
        if state.selected_package.is_none() && state.stage != WizardStage::PackageSelection {
            warn!(stage = ?state.stage, "discarding snapshot with no package past selection");
            return Ok(None);
        }
        if state.stage == WizardStage::Completed {
            debug!("discarding completed-project snapshot, forcing restart");
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Drop the persisted slot entirely.
    pub fn clear(&self) -> Result<()> {
        self.backend.remove(WIZARD_SNAPSHOT_KEY)
    }
}
