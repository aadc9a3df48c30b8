//! spindle - deterministic model checker for cooperative concurrent programs
//!
//! A scenario is a set of **actions**: cooperative, suspendable routines with
//! explicit yield points. spindle runs the scenario over and over, steering
//! every yield point through a lazily built **choice tree** until every
//! interleaving (and every manual [`ActionCtx::choice`] branch) has been
//! visited, checking a user predicate against each terminal state. The first
//! interleaving that fails the predicate is returned as a [`Path`], a byte
//! sequence that deterministically replays it.
//!
//! This crate provides:
//! - **[`WorkQueue`]**: the choice-tree enumerator: a depth-first cursor over
//!   a lazily discovered tree, with stealable unexplored branches
//! - **[`RunnableActionSet`]**: the cooperative scheduler driving one trial's
//!   actions, one choice-tree decision per suspension
//! - **[`WorkQueueManager`]** / **[`Pool`]**: parallel exploration across
//!   worker threads with work stealing, termination detection, and
//!   short-circuit once a bad path is found
//! - **[`ExperimentBuilder`]**: the scenario façade keeping per-trial state
//!   from leaking between trials
//!
//! # Quick Start
//!
//! ```rust
//! use spindle::{ActionCtx, ActionResult, ExperimentBuilder, Pool, RunnableActionSet, TrialState};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Counters {
//!     a: i32,
//!     b: i32,
//! }
//!
//! async fn add_a(ctx: ActionCtx, state: TrialState<Counters>) {
//!     ctx.bg().await;
//!     state.with(|c| c.a += 1);
//!     ctx.bg().await;
//!     state.with(|c| c.b += c.a);
//! }
//!
//! async fn add_b(ctx: ActionCtx, state: TrialState<Counters>) {
//!     ctx.bg().await;
//!     state.with(|c| c.a += 2);
//! }
//!
//! let experiment = Arc::new(ExperimentBuilder::new(
//!     Counters::default,
//!     |queue, state| {
//!         let mut actions = RunnableActionSet::new(queue);
//!         actions.add_action(add_a, state.clone());
//!         actions.add_action(add_b, state.clone());
//!         actions
//!     },
//!     // b depends on interleaving; a does not.
//!     |result, state| result == ActionResult::Ok && state.a == 3,
//! ));
//!
//! let pool = Pool::new(2);
//! assert!(pool.run(experiment).is_none());
//! ```
//!
//! # Replaying a failure
//!
//! A returned [`Path`] prints as `{c0, c1, ...}` and parses back from that
//! form; feed it to [`Pool::run_from`] to pin the search to the failing
//! subtree.

pub mod action;
pub mod experiment;
pub mod manager;
pub mod path;
pub mod pool;
pub mod report;
pub mod work_queue;

pub use action::{ActionCtx, ActionResult, Bg, RunnableActionSet};
pub use experiment::{BuildFn, Experiment, ExperimentBuilder, TrialState};
pub use manager::WorkQueueManager;
pub use path::{Choice, Path, PathParseError};
pub use pool::Pool;
pub use report::{CheckResult, CheckStats};
pub use work_queue::WorkQueue;
