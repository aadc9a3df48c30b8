//! The experiment façade: reusable scenario descriptions and per-trial
//! instances.
//!
//! An [`ExperimentBuilder`] bundles the three pieces the pool needs to run a
//! scenario thousands of times: a factory for fresh per-trial state, a
//! capture-free constructor that registers actions against a work queue, and
//! a predicate judging the terminal state. The split exists to make the
//! classic mistake hard: the state factory and the predicate may capture, but
//! the build step is a plain `fn`, so anything an action touches has to arrive
//! through the [`TrialState`] handle, so nothing can leak between trials.

use crate::action::{ActionResult, RunnableActionSet};
use crate::work_queue::WorkQueue;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Handle to one trial's state, shared by every action in the trial.
///
/// Internally an `Rc<RefCell<S>>`: a trial is single-threaded, so this is the
/// whole synchronization story. Keep accesses inside [`TrialState::with`] and
/// never hold one across a suspension point.
pub struct TrialState<S> {
    inner: Rc<RefCell<S>>,
}

impl<S> TrialState<S> {
    pub fn new(state: S) -> Self {
        TrialState {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// Run `f` with exclusive access to the state.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }
}

impl<S: Clone> TrialState<S> {
    /// A copy of the current state.
    pub fn snapshot(&self) -> S {
        self.inner.borrow().clone()
    }
}

impl<S> Clone for TrialState<S> {
    fn clone(&self) -> Self {
        TrialState {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// The capture-free build step: construct the trial's action set against the
/// given queue and register its actions, pulling state from the handle.
pub type BuildFn<S> = fn(Arc<WorkQueue>, &TrialState<S>) -> RunnableActionSet;

/// A reusable scenario description. Shared across workers; each trial gets a
/// fresh [`Experiment`] from it.
pub struct ExperimentBuilder<S> {
    state: Box<dyn Fn() -> S + Send + Sync>,
    build: BuildFn<S>,
    check: Box<dyn Fn(ActionResult, &S) -> bool + Send + Sync>,
}

impl<S> ExperimentBuilder<S> {
    /// `state` makes fresh per-trial state, `build` registers the actions,
    /// and `check` judges the terminal state (`true` = acceptable).
    pub fn new(
        state: impl Fn() -> S + Send + Sync + 'static,
        build: BuildFn<S>,
        check: impl Fn(ActionResult, &S) -> bool + Send + Sync + 'static,
    ) -> Self {
        ExperimentBuilder {
            state: Box::new(state),
            build,
            check: Box::new(check),
        }
    }

    /// Instantiate one trial with fresh state.
    pub fn trial(&self) -> Experiment<'_, S> {
        Experiment {
            builder: self,
            state: TrialState::new((self.state)()),
            phase: TrialPhase::Initialized,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TrialPhase {
    Initialized,
    Running,
    Checked,
}

/// One trial: fresh state bound to a work queue, built then checked exactly
/// once.
pub struct Experiment<'e, S> {
    builder: &'e ExperimentBuilder<S>,
    state: TrialState<S>,
    phase: TrialPhase,
}

impl<S> Experiment<'_, S> {
    /// Build the action set for this trial against `queue`.
    pub fn build(&mut self, queue: Arc<WorkQueue>) -> RunnableActionSet {
        assert_eq!(self.phase, TrialPhase::Initialized, "trial already built");
        self.phase = TrialPhase::Running;
        (self.builder.build)(queue, &self.state)
    }

    /// Judge the trial's terminal state.
    pub fn check(&mut self, result: ActionResult) -> bool {
        assert_eq!(
            self.phase,
            TrialPhase::Running,
            "check() requires a built, finished trial"
        );
        self.phase = TrialPhase::Checked;
        let state = self.state.inner.borrow();
        (self.builder.check)(result, &state)
    }
}
