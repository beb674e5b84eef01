//! The wizard state aggregate and its owning controller.
//!
//! `WizardState` is the aggregate root: every other component reads and
//! writes wizard data through a [`StageController`] handle. The controller
//! wraps the state in `Arc<Mutex<_>>` so that decisions scheduled earlier
//! (auto-advance timers, reconnect callbacks) are always applied against the
//! state as it is *now*, never against a value captured when the callback was
//! registered.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::generation::GeneratedArtifact;
use crate::investigation::CategoryJob;
use crate::stage::WizardStage;

/// One entry in the wizard's chat/message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The aggregate wizard state.
///
/// Field set matches the persisted snapshot schema one-to-one; the snapshot
/// is this struct plus a write timestamp (see `persist`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub stage: WizardStage,
    /// Ordered back-navigation history, oldest first.
    pub stage_history: Vec<WizardStage>,
    pub current_page: Option<String>,
    pub selected_package: Option<String>,
    /// Opaque requirements gathered from the user; never interpreted here.
    pub requirements: Map<String, Value>,
    pub message_log: Vec<ChatMessage>,
    pub design_template: Option<String>,
    pub content_template: Option<String>,
    pub image_source: Option<String>,
    pub redesign_count: u32,
    pub artifact: Option<GeneratedArtifact>,
    pub investigation_results: Option<Vec<CategoryJob>>,
    pub page_keywords: Vec<String>,
    pub generated_images: Vec<String>,
    /// Opaque SEO assessment payload from the backend.
    pub seo_assessment: Option<Value>,
    pub redo_requests: Vec<String>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            stage: WizardStage::initial(),
            stage_history: Vec::new(),
            current_page: None,
            selected_package: None,
            requirements: Map::new(),
            message_log: Vec::new(),
            design_template: None,
            content_template: None,
            image_source: None,
            redesign_count: 0,
            artifact: None,
            investigation_results: None,
            page_keywords: Vec::new(),
            generated_images: Vec::new(),
            seo_assessment: None,
            redo_requests: Vec::new(),
        }
    }
}

/// Cloneable handle owning the wizard state machine.
#[derive(Debug, Clone, Default)]
pub struct StageController {
    inner: Arc<Mutex<WizardState>>,
}

impl StageController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a controller around restored state.
    pub fn from_state(state: WizardState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WizardState> {
        // Wizard state stays usable even if a panicking task poisoned it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> WizardStage {
        self.lock().stage
    }

    /// Clone of the full state, for snapshotting.
    pub fn state(&self) -> WizardState {
        self.lock().clone()
    }

    /// Read through the live state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&WizardState) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate the live state.
    pub fn update<R>(&self, f: impl FnOnce(&mut WizardState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Commit a stage transition, pushing the current stage onto history.
    pub fn transition(&self, next: WizardStage) {
        let mut state = self.lock();
        let from = state.stage;
        if from == next {
            return;
        }
        state.stage_history.push(from);
        state.stage = next;
        // Re-entering template selection counts as a redesign pass.
        if next == WizardStage::TemplateSelection && state.stage_history.contains(&next) {
            state.redesign_count += 1;
        }
        debug!(?from, to = ?next, "stage transition");
    }

    /// Commit a transition only if the current stage still equals `from` at
    /// the moment this runs. This is the only entry point scheduled decisions
    /// may use; it re-reads the live stage instead of trusting a value
    /// captured at schedule time.
    pub fn transition_if_current(&self, from: WizardStage, next: WizardStage) -> bool {
        {
            let state = self.lock();
            if state.stage != from {
                debug!(expected = ?from, actual = ?state.stage, "stale transition dropped");
                return false;
            }
        }
        self.transition(next);
        true
    }

    /// Navigate backwards: pop explicit history, or fall back to the
    /// canonical previous stage when history was cleared.
    pub fn back(&self) -> Option<WizardStage> {
        let mut state = self.lock();
        let prev = match state.stage_history.pop() {
            Some(prev) => prev,
            None => state.stage.prev_in_order()?,
        };
        state.stage = prev;
        Some(prev)
    }

    /// Reset to a fresh wizard. Refuses when the current stage is terminal:
    /// a reload must never lose a completed result. The terminal check
    /// dominates everything else on this path.
    pub fn reset(&self) -> bool {
        let mut state = self.lock();
        if state.stage.is_terminal() {
            debug!(stage = ?state.stage, "reset refused on terminal stage");
            return false;
        }
        *state = WizardState::default();
        true
    }

    /// Replace live state wholesale (snapshot restore, undo/redo). Refused
    /// while on a terminal stage for the same reason as [`reset`].
    ///
    /// [`reset`]: StageController::reset
    pub fn replace(&self, new_state: WizardState) -> bool {
        let mut state = self.lock();
        if state.stage.is_terminal() && !new_state.stage.is_terminal() {
            debug!(stage = ?state.stage, "replace refused on terminal stage");
            return false;
        }
        *state = new_state;
        true
    }

    pub fn select_package(&self, package: impl Into<String>) {
        self.lock().selected_package = Some(package.into());
    }

    pub fn select_templates(&self, design: impl Into<String>, content: impl Into<String>) {
        let mut state = self.lock();
        state.design_template = Some(design.into());
        state.content_template = Some(content.into());
    }

    pub fn set_investigation_results(&self, jobs: Vec<CategoryJob>) {
        self.lock().investigation_results = Some(jobs);
    }

    pub fn set_artifact(&self, artifact: GeneratedArtifact) {
        self.lock().artifact = Some(artifact);
    }

    pub fn record_message(&self, role: impl Into<String>, content: impl Into<String>) {
        self.lock().message_log.push(ChatMessage {
            role: role.into(),
            content: content.into(),
        });
    }
}
