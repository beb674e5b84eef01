//! Wires the wizard together: bytes from the backend flow through the
//! ingestor into the pipelines, pipeline updates feed the auto-advance
//! guard, committed stages are snapshotted, and reconnection with
//! resume-from-category keeps a run alive across network drops.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::advance::AutoAdvanceGuard;
use crate::backend::{Backend, GenerationRequest, InvestigationRequest};
use crate::errors::{backend_error, WizardError};
use crate::generation::{GeneratedArtifact, GenerationPipeline};
use crate::history::HistoryStack;
use crate::investigation::{CategoryJob, InvestigationPipeline, InvestigationUpdate};
use crate::persist::PersistenceStore;
use crate::stage::WizardStage;
use crate::state::StageController;
use crate::stream::{BackoffConfig, IngestItem, ReconnectionManager, StreamIngestor};

/// Tunable delays and budgets. Defaults match production behavior; tests
/// shrink them.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Delay before the confirmed advance to the next category.
    pub advance_delay: Duration,
    /// Grace delay before the advance into the build stage.
    pub build_grace: Duration,
    /// Hard wall-clock bound on the whole generation run.
    pub generation_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            advance_delay: Duration::from_millis(1500),
            build_grace: Duration::from_millis(750),
            generation_timeout: Duration::from_secs(300),
            backoff: BackoffConfig::default(),
        }
    }
}

/// The client-side orchestration root.
pub struct Orchestrator {
    controller: StageController,
    guard: AutoAdvanceGuard,
    store: PersistenceStore,
    history: HistoryStack,
    backend: Arc<dyn Backend>,
    config: WizardConfig,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn Backend>, store: PersistenceStore, config: WizardConfig) -> Self {
        Self {
            controller: StageController::new(),
            guard: AutoAdvanceGuard::new(),
            store,
            history: HistoryStack::default(),
            backend,
            config,
        }
    }

    /// Cloneable handle to the live wizard state.
    pub fn controller(&self) -> StageController {
        self.controller.clone()
    }

    pub fn guard(&self) -> &AutoAdvanceGuard {
        &self.guard
    }

    /// Restore a persisted wizard snapshot, if one survives the restore
    /// priority ladder. Returns whether anything was restored.
    pub fn resume_from_snapshot(&mut self) -> Result<bool, WizardError> {
        match self.store.restore()? {
            Some(state) => {
                info!(stage = ?state.stage, "resuming wizard from snapshot");
                Ok(self.controller.replace(state))
            }
            None => Ok(false),
        }
    }

    /// Record the current state as an undo point.
    pub fn checkpoint(&mut self) {
        self.history.push(&self.controller.state());
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(state) => self.controller.replace(state),
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(state) => self.controller.replace(state),
            None => false,
        }
    }

    /// Cancel pending timers and flush state. Call on navigation away or
    /// disposal; open streams are dropped with the pending run futures.
    pub fn teardown(&mut self) {
        self.guard.cancel();
        if let Err(err) = self.store.flush(&self.controller.state()) {
            warn!(%err, "final snapshot flush failed");
        }
    }

    /// Run the 13-category investigation to completion, resuming from a
    /// prior progress snapshot for this topic when one is valid.
    pub async fn run_investigation(
        &mut self,
        topic: &str,
        descriptors: Value,
    ) -> Result<Vec<CategoryJob>, WizardError> {
        let mut pipeline = InvestigationPipeline::new(topic, Some(self.store.backend()));
        if pipeline.try_restore()? {
            info!(topic, "continuing investigation from persisted progress");
        }
        self.drive_investigation(&mut pipeline, topic, &descriptors).await?;
        self.finish_investigation(pipeline)
    }

    /// Retry a single failed category: reset only that job, then re-issue
    /// the request carrying the resume index. The other twelve jobs keep
    /// their state (restored from the progress snapshot).
    pub async fn retry_category(
        &mut self,
        topic: &str,
        descriptors: Value,
        index: usize,
    ) -> Result<Vec<CategoryJob>, WizardError> {
        let mut pipeline = InvestigationPipeline::new(topic, Some(self.store.backend()));
        pipeline.try_restore()?;
        pipeline.resume_category(index)?;
        self.drive_investigation(&mut pipeline, topic, &descriptors).await?;
        self.finish_investigation(pipeline)
    }

    fn finish_investigation(
        &mut self,
        pipeline: InvestigationPipeline,
    ) -> Result<Vec<CategoryJob>, WizardError> {
        let jobs = pipeline.jobs();
        self.controller.set_investigation_results(jobs.clone());
        if let Err(err) = self.store.flush(&self.controller.state()) {
            warn!(%err, "snapshot flush after investigation failed");
        }
        Ok(jobs)
    }

    async fn drive_investigation(
        &mut self,
        pipeline: &mut InvestigationPipeline,
        topic: &str,
        descriptors: &Value,
    ) -> Result<(), WizardError> {
        let Some(first) = pipeline.first_incomplete() else {
            debug!("all categories already complete, nothing to drive");
            return Ok(());
        };
        if let Some(stage) = WizardStage::for_category(first) {
            if !self.controller.current().is_category() {
                self.controller.transition(stage);
            }
        }

        let mut reconnect = ReconnectionManager::new(self.config.backoff);
        let mut resume_from = Some(first).filter(|&i| i > 0);

        'connect: loop {
            let request = InvestigationRequest {
                topic: topic.to_string(),
                descriptors: descriptors.clone(),
                resume_from,
            };
            let mut stream = match self.backend.start_investigation(&request).await {
                Ok(stream) => {
                    reconnect.mark_connected();
                    stream
                }
                Err(err) => {
                    // Persist last-known progress before anything surfaces.
                    pipeline.snapshot_now()?;
                    if err.is_retryable() {
                        if let Some(delay) = reconnect.next_delay() {
                            sleep(delay).await;
                            continue 'connect;
                        }
                        return Err(WizardError::Connection {
                            attempts: reconnect.attempts_made(),
                        });
                    }
                    return Err(err);
                }
            };

            let mut ingestor = StreamIngestor::new();
            loop {
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        for item in ingestor.feed(&chunk) {
                            self.handle_investigation_item(pipeline, item);
                        }
                    }
                    Some(Err(err)) => {
                        warn!(%err, "investigation stream read failed");
                        pipeline.snapshot_now()?;
                        resume_from = pipeline.first_incomplete();
                        match reconnect.next_delay() {
                            Some(delay) => {
                                sleep(delay).await;
                                continue 'connect;
                            }
                            None => {
                                return Err(WizardError::Connection {
                                    attempts: reconnect.attempts_made(),
                                })
                            }
                        }
                    }
                    None => {
                        for item in ingestor.finish() {
                            self.handle_investigation_item(pipeline, item);
                        }
                        pipeline.snapshot_now()?;
                        return Ok(());
                    }
                }
            }
        }
    }

    fn handle_investigation_item(
        &mut self,
        pipeline: &mut InvestigationPipeline,
        item: IngestItem,
    ) {
        let IngestItem::Frame(frame) = item else {
            // Parse errors are counted by the ingestor and never abort.
            return;
        };

        match pipeline.apply(&frame) {
            InvestigationUpdate::Completed { index, all_complete } => {
                let Some(from) = WizardStage::for_category(index) else {
                    return;
                };
                if all_complete {
                    // The set is complete no matter which index landed last
                    // (events arrive out of order near the boundary): a
                    // pending next-category advance is stale, replace it
                    // with the build transition. The probe re-verifies
                    // completeness at fire time.
                    self.guard.cancel();
                    let probe = pipeline.completion_probe();
                    self.guard.schedule_decision(
                        self.controller.clone(),
                        self.config.build_grace,
                        move |ctl| {
                            let current = ctl.current();
                            (probe() && current.is_category())
                                .then_some((current, WizardStage::Build))
                        },
                    );
                } else if let Some(next) = WizardStage::for_category(index + 1) {
                    self.guard.schedule(
                        self.controller.clone(),
                        from,
                        next,
                        self.config.advance_delay,
                    );
                }
            }
            InvestigationUpdate::Failed { index, message } => {
                warn!(index, %message, "category failed; single-category retry available");
            }
            InvestigationUpdate::Progress { .. } | InvestigationUpdate::Ignored => {}
        }

        if let Err(err) = self.store.offer(&self.controller.state()) {
            warn!(%err, "debounced wizard snapshot failed");
        }
    }

    /// Run the generation job under the hard wall-clock timeout. Dropping
    /// the timed-out future aborts the underlying stream.
    pub async fn run_generation(&mut self) -> Result<GeneratedArtifact, WizardError> {
        let request = {
            let state = self.controller.state();
            GenerationRequest {
                requirements: state.requirements,
                investigation: state.investigation_results.unwrap_or_default(),
                design_template: state.design_template,
                content_template: state.content_template,
            }
        };
        if self.controller.current() != WizardStage::Build {
            self.controller.transition(WizardStage::Build);
        }

        let budget = self.config.generation_timeout;
        match tokio::time::timeout(budget, self.drive_generation(&request)).await {
            Ok(Ok(artifact)) => {
                self.controller.set_artifact(artifact.clone());
                self.controller.transition(WizardStage::Review);
                if let Err(err) = self.store.flush(&self.controller.state()) {
                    warn!(%err, "snapshot flush after generation failed");
                }
                Ok(artifact)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(?budget, "generation timed out, stream aborted");
                Err(WizardError::Timeout(budget))
            }
        }
    }

    async fn drive_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedArtifact, WizardError> {
        let mut reconnect = ReconnectionManager::new(self.config.backoff);
        let mut pipeline = GenerationPipeline::new();

        'connect: loop {
            let mut stream = match self.backend.start_generation(request).await {
                Ok(stream) => {
                    reconnect.mark_connected();
                    stream
                }
                Err(err) => {
                    if err.is_retryable() {
                        if let Some(delay) = reconnect.next_delay() {
                            sleep(delay).await;
                            continue 'connect;
                        }
                        return Err(WizardError::Connection {
                            attempts: reconnect.attempts_made(),
                        });
                    }
                    return Err(err);
                }
            };

            let mut ingestor = StreamIngestor::new();
            loop {
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        for item in ingestor.feed(&chunk) {
                            if let IngestItem::Frame(frame) = item {
                                if let Some(artifact) = pipeline.apply(&frame)? {
                                    return Ok(artifact);
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(%err, "generation stream read failed");
                        match reconnect.next_delay() {
                            Some(delay) => {
                                sleep(delay).await;
                                continue 'connect;
                            }
                            None => {
                                return Err(WizardError::Connection {
                                    attempts: reconnect.attempts_made(),
                                })
                            }
                        }
                    }
                    None => {
                        for item in ingestor.finish() {
                            if let IngestItem::Frame(frame) = item {
                                if let Some(artifact) = pipeline.apply(&frame)? {
                                    return Ok(artifact);
                                }
                            }
                        }
                        // Truncated stream: worth a fresh attempt.
                        return Err(WizardError::Backend {
                            message: "generation stream ended without a completion payload"
                                .into(),
                            retryable: true,
                        });
                    }
                }
            }
        }
    }

    /// One chat-refinement round against the current artifact.
    pub async fn refine_with_chat(&mut self, message: &str) -> Result<Value, WizardError> {
        let artifact = self
            .controller
            .state()
            .artifact
            .ok_or_else(|| backend_error("invalid request: no artifact to refine"))?;
        self.controller.record_message("user", message);
        let reply = self.backend.chat_refinement(message, &artifact).await?;
        if let Some(text) = reply.get("reply").and_then(Value::as_str) {
            self.controller.record_message("assistant", text);
        }
        Ok(reply)
    }

    /// Package the generated artifact into a downloadable archive.
    pub async fn download_package(&self) -> Result<Vec<u8>, WizardError> {
        let artifact = self
            .controller
            .state()
            .artifact
            .ok_or_else(|| backend_error("invalid request: no artifact to package"))?;
        self.backend.package_download(&artifact).await
    }
}
