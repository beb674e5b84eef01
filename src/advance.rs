//! Single-flight, cancellable auto-advance between completed stages.
//!
//! The in-flight flag and pending task handle are fields of the guard
//! instance, shared only through its own `Arc`. Commit goes through
//! [`StageController::transition_if_current`], which re-reads the live stage
//! at fire time; a user navigating away during the delay makes the commit a
//! no-op rather than a stale transition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::stage::WizardStage;
use crate::state::StageController;

#[derive(Debug, Default)]
struct GuardInner {
    in_flight: bool,
    pending: Option<JoinHandle<()>>,
}

/// At most one scheduled transition exists at a time.
#[derive(Debug, Clone, Default)]
pub struct AutoAdvanceGuard {
    inner: Arc<Mutex<GuardInner>>,
}

impl AutoAdvanceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GuardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a transition is currently scheduled and un-fired.
    pub fn is_pending(&self) -> bool {
        self.lock().in_flight
    }

    /// Schedule `from -> to` after `delay`. Returns `false` without
    /// scheduling when another transition is already pending. Commits only
    /// if the wizard is still on `from` when the delay elapses.
    pub fn schedule(
        &self,
        controller: StageController,
        from: WizardStage,
        to: WizardStage,
        delay: Duration,
    ) -> bool {
        self.schedule_if(controller, from, to, delay, || true)
    }

    /// Like [`schedule`], with an extra predicate re-evaluated at fire time.
    ///
    /// [`schedule`]: AutoAdvanceGuard::schedule
    pub fn schedule_if<F>(
        &self,
        controller: StageController,
        from: WizardStage,
        to: WizardStage,
        delay: Duration,
        check: F,
    ) -> bool
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.schedule_decision(controller, delay, move |ctl| {
            (check() && ctl.current() == from).then_some((from, to))
        })
    }

    /// Most general form: `decide` runs against the live controller at fire
    /// time and returns the transition to commit, or `None` to drop it. Used
    /// for the build transition, which re-verifies that all 13 categories
    /// are still complete when the grace delay elapses and advances from
    /// whatever category stage the wizard is on by then.
    pub fn schedule_decision<F>(
        &self,
        controller: StageController,
        delay: Duration,
        decide: F,
    ) -> bool
    where
        F: FnOnce(&StageController) -> Option<(WizardStage, WizardStage)> + Send + 'static,
    {
        let mut guard = self.lock();
        if guard.in_flight {
            debug!("advance already pending, not scheduling");
            return false;
        }
        guard.in_flight = true;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
                guard.in_flight = false;
                guard.pending = None;
            }
            match decide(&controller) {
                Some((from, to)) => {
                    if controller.transition_if_current(from, to) {
                        debug!(?from, ?to, "auto-advance committed");
                    }
                }
                None => debug!("advance dropped at fire time"),
            }
        });
        guard.pending = Some(handle);
        true
    }

    /// Cancel any pending transition (user declined the confirmation, or
    /// teardown). Safe to call when nothing is pending.
    pub fn cancel(&self) {
        let mut guard = self.lock();
        if let Some(handle) = guard.pending.take() {
            handle.abort();
            debug!("pending auto-advance cancelled");
        }
        guard.in_flight = false;
    }
}
