//! Drives the 13 audit categories to completion from stream events.
//!
//! Jobs are created once at pipeline initialization and only ever mutated or
//! reset, never deleted. At most one job is in progress at a time (a frame
//! opening a new category supersedes a job left in progress), progress is
//! clamped and non-decreasing while a job runs, and duplicate terminal events
//! (replays after a reconnect, races near the all-complete boundary) are
//! ignored rather than re-applied.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::WizardError;
use crate::persist::SnapshotBackend;
use crate::stage::CATEGORY_COUNT;
use crate::stream::StreamFrame;

use super::categories::{index_for_key, CATEGORIES};

/// Debounce window for progress snapshots.
pub const SNAPSHOT_DEBOUNCE: Duration = Duration::from_secs(2);

/// A progress snapshot older than this is stale and discarded on restore.
pub const SNAPSHOT_MAX_AGE: chrono::Duration = chrono::Duration::hours(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// Per-category progress record. One of 13, fixed canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryJob {
    pub key: String,
    pub name: String,
    pub index: usize,
    pub status: JobStatus,
    pub progress: f64,
    pub check_scores: BTreeMap<String, f64>,
    pub error: Option<String>,
}

impl CategoryJob {
    fn fresh(index: usize) -> Self {
        let def = &CATEGORIES[index];
        Self {
            key: def.key.to_string(),
            name: def.name.to_string(),
            index,
            status: JobStatus::Pending,
            progress: 0.0,
            check_scores: BTreeMap::new(),
            error: None,
        }
    }
}

/// Start/end-bounded record of one category's execution, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    pub index: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome of applying one frame, for the orchestrator's advance decisions.
#[derive(Debug, Clone, PartialEq)]
pub enum InvestigationUpdate {
    Progress { index: usize, progress: f64 },
    Completed { index: usize, all_complete: bool },
    Failed { index: usize, message: String },
    /// Frame did not target a live job (unknown category, duplicate
    /// completion, update for a frozen failed job).
    Ignored,
}

/// Serialized form of the 13-job array in its storage slot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressSnapshot {
    topic: String,
    written_at: DateTime<Utc>,
    jobs: Vec<CategoryJob>,
}

pub struct InvestigationPipeline {
    topic: String,
    jobs: Arc<Mutex<Vec<CategoryJob>>>,
    phases: Vec<PhaseRecord>,
    backend: Option<Arc<dyn SnapshotBackend>>,
    last_snapshot: Option<Instant>,
}

impl InvestigationPipeline {
    /// Create the pipeline with all 13 jobs pending. `backend` enables
    /// debounced progress persistence keyed by the topic.
    pub fn new(topic: impl Into<String>, backend: Option<Arc<dyn SnapshotBackend>>) -> Self {
        let jobs = (0..CATEGORY_COUNT).map(CategoryJob::fresh).collect();
        Self {
            topic: topic.into(),
            jobs: Arc::new(Mutex::new(jobs)),
            phases: Vec::new(),
            backend,
            last_snapshot: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn lock_jobs(&self) -> MutexGuard<'_, Vec<CategoryJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current job array, canonical order.
    pub fn jobs(&self) -> Vec<CategoryJob> {
        self.lock_jobs().clone()
    }

    pub fn phase_records(&self) -> &[PhaseRecord] {
        &self.phases
    }

    /// First job not yet complete, canonical order.
    pub fn first_incomplete(&self) -> Option<usize> {
        self.lock_jobs()
            .iter()
            .position(|j| j.status != JobStatus::Complete)
    }

    pub fn all_complete(&self) -> bool {
        self.lock_jobs().iter().all(|j| j.status == JobStatus::Complete)
    }

    /// A probe the auto-advance guard can run at fire time to re-verify
    /// completeness against live data (events race near the boundary).
    pub fn completion_probe(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let jobs = Arc::clone(&self.jobs);
        move || {
            jobs.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .all(|j| j.status == JobStatus::Complete)
        }
    }

    /// Merge one stream frame into the job it targets.
    pub fn apply(&mut self, frame: &StreamFrame) -> InvestigationUpdate {
        let Some(index) = Self::resolve_index(frame) else {
            debug!(stage = ?frame.stage, "frame targets no known category");
            return InvestigationUpdate::Ignored;
        };

        let update = {
            // Lock through a local handle so phase records stay mutable.
            let jobs_arc = Arc::clone(&self.jobs);
            let mut jobs = jobs_arc.lock().unwrap_or_else(PoisonError::into_inner);

            if frame.is_error() {
                let message = frame
                    .error_text()
                    .unwrap_or("investigation category failed")
                    .to_string();
                let job = &mut jobs[index];
                if job.status == JobStatus::Complete {
                    return InvestigationUpdate::Ignored;
                }
                job.status = JobStatus::Failed;
                job.error = Some(message.clone());
                // Progress stays frozen at its last value.
                warn!(category = %job.key, %message, "category failed");
                self.close_phase(index);
                InvestigationUpdate::Failed { index, message }
            } else {
                match jobs[index].status {
                    // Duplicate events after completion (reconnect replays,
                    // out-of-order boundary events) must not re-fire.
                    JobStatus::Complete => return InvestigationUpdate::Ignored,
                    // A failed job is frozen until an explicit resume.
                    JobStatus::Failed => return InvestigationUpdate::Ignored,
                    JobStatus::Pending => {
                        // The stream is sequential: opening a new category
                        // supersedes any job still marked in progress. Its
                        // progress is kept and it re-opens on the next frame
                        // that targets it.
                        for pos in 0..jobs.len() {
                            if pos != index && jobs[pos].status == JobStatus::InProgress {
                                jobs[pos].status = JobStatus::Pending;
                                self.close_phase(pos);
                            }
                        }
                        jobs[index].status = JobStatus::InProgress;
                        self.phases.push(PhaseRecord {
                            index,
                            started_at: Utc::now(),
                            finished_at: None,
                        });
                    }
                    JobStatus::InProgress => {}
                }

                let job = &mut jobs[index];
                if let Some(raw) = frame.category_progress {
                    let clamped = raw.clamp(0.0, 100.0);
                    // Non-decreasing while in progress.
                    job.progress = job.progress.max(clamped);
                }
                if let Some(scores) = &frame.check_scores {
                    // Union merge: incoming keys overwrite, others persist.
                    for (k, v) in scores {
                        job.check_scores.insert(k.clone(), *v);
                    }
                }

                if job.progress >= 100.0 {
                    job.status = JobStatus::Complete;
                    let all_complete = jobs.iter().all(|j| j.status == JobStatus::Complete);
                    self.close_phase(index);
                    info!(category = %CATEGORIES[index].key, "category complete");
                    InvestigationUpdate::Completed { index, all_complete }
                } else {
                    InvestigationUpdate::Progress {
                        index,
                        progress: jobs[index].progress,
                    }
                }
            }
        };

        if let Err(err) = self.maybe_snapshot() {
            warn!(%err, "progress snapshot failed");
        }
        update
    }

    fn resolve_index(frame: &StreamFrame) -> Option<usize> {
        if let Some(index) = frame.category_index {
            return (index < CATEGORY_COUNT).then_some(index);
        }
        frame.stage.as_deref().and_then(index_for_key)
    }

    fn close_phase(&mut self, index: usize) {
        if let Some(rec) = self
            .phases
            .iter_mut()
            .rev()
            .find(|r| r.index == index && r.finished_at.is_none())
        {
            rec.finished_at = Some(Utc::now());
        }
    }

    /// Reset exactly one job for a user-triggered retry, leaving every other
    /// job untouched. The caller re-issues the backend request with this
    /// index as the resume point.
    pub fn resume_category(&mut self, index: usize) -> Result<(), WizardError> {
        if index >= CATEGORY_COUNT {
            return Err(WizardError::Validation(format!(
                "category index {index} out of range"
            )));
        }
        {
            let mut jobs = self.lock_jobs();
            jobs[index] = CategoryJob::fresh(index);
        }
        self.phases.retain(|r| r.index != index);
        info!(index, "category reset for resume");
        self.snapshot_now()?;
        Ok(())
    }

    fn snapshot_key(&self) -> String {
        format!("investigation:{}", self.topic)
    }

    fn maybe_snapshot(&mut self) -> Result<()> {
        if self.backend.is_none() {
            return Ok(());
        }
        if let Some(last) = self.last_snapshot {
            if last.elapsed() < SNAPSHOT_DEBOUNCE {
                return Ok(());
            }
        }
        self.snapshot_now()
    }

    /// Persist the full 13-job array immediately (reconnect boundaries,
    /// teardown, explicit resume).
    pub fn snapshot_now(&mut self) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let snapshot = ProgressSnapshot {
            topic: self.topic.clone(),
            written_at: Utc::now(),
            jobs: self.jobs(),
        };
        let payload = serde_json::to_string(&snapshot)
            .context("Failed to serialize investigation progress")?;
        backend.save(&self.snapshot_key(), &payload)?;
        self.last_snapshot = Some(Instant::now());
        Ok(())
    }

    /// Restore a prior progress snapshot for this topic, if it is fresh and
    /// structurally valid. Returns whether anything was restored; an invalid
    /// snapshot is discarded without error.
    pub fn try_restore(&mut self) -> Result<bool> {
        let Some(backend) = &self.backend else {
            return Ok(false);
        };
        let Some(payload) = backend.load(&self.snapshot_key())? else {
            return Ok(false);
        };

        let snapshot: ProgressSnapshot = match serde_json::from_str(&payload) {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "discarding malformed investigation snapshot");
                return Ok(false);
            }
        };
        if snapshot.topic != self.topic {
            debug!(stored = %snapshot.topic, "snapshot topic mismatch, discarding");
            return Ok(false);
        }
        if Utc::now() - snapshot.written_at > SNAPSHOT_MAX_AGE {
            debug!("investigation snapshot too old, discarding");
            return Ok(false);
        }
        if !Self::structurally_valid(&snapshot.jobs) {
            warn!("investigation snapshot failed structural checks, discarding");
            return Ok(false);
        }

        *self.lock_jobs() = snapshot.jobs;
        info!(topic = %self.topic, "restored investigation progress");
        Ok(true)
    }

    fn structurally_valid(jobs: &[CategoryJob]) -> bool {
        jobs.len() == CATEGORY_COUNT
            && jobs.iter().enumerate().all(|(i, j)| {
                j.index == i && (0.0..=100.0).contains(&j.progress)
            })
    }
}
