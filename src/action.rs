//! The cooperative action scheduler.
//!
//! A [`RunnableActionSet`] drives one trial: a set of suspendable actions
//! multiplexed onto one thread, where every suspension point is a decision
//! consumed from the trial's [`WorkQueue`]. Actions are plain `async fn`s: the
//! set is their executor, and the only wakeups are the ones the choice
//! tree dictates, so wakers are ignored.
//!
//! Actions must be capture-free: they are replayed many times against fresh
//! per-trial state, and anything captured from an enclosing scope would leak
//! between trials. [`RunnableActionSet::add_action`] takes a function pointer
//! rather than a closure bound to make that a compile error; trial state
//! travels through the explicit argument instead.

use crate::path::Choice;
use crate::work_queue::WorkQueue;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// Terminal status of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionResult {
    /// Every action ran to completion.
    Ok = 0,
    /// The decision bound was reached with actions still runnable.
    Timeout = 1,
}

type ActionFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Shared between the set and the [`ActionCtx`] handles held by its actions.
struct SetCore {
    queue: Arc<WorkQueue>,
    decision_count: usize,
}

/// Resumption is driven entirely by the choice tree; nothing ever needs to
/// wake a task from outside.
struct IgnoredWake;

impl Wake for IgnoredWake {
    fn wake(self: Arc<Self>) {}
}

/// The handle an action uses to talk to its scheduler. Cheap to clone; valid
/// only for the trial it was created in.
#[derive(Clone)]
pub struct ActionCtx {
    core: Rc<RefCell<SetCore>>,
}

impl ActionCtx {
    /// Suspend, re-joining the runnable set. The set resumes this action in
    /// some later decision step; which one is exactly what the checker
    /// enumerates.
    #[must_use = "bg() suspends only when awaited"]
    pub fn bg(&self) -> Bg {
        Bg { yielded: false }
    }

    /// A manual non-deterministic branch: consumes one decision and returns
    /// the chosen index in `0..option_count`. Does not suspend.
    pub fn choice(&self, option_count: u8) -> Choice {
        let (height, queue) = {
            let mut core = self.core.borrow_mut();
            let height = core.decision_count;
            core.decision_count += 1;
            (height, Arc::clone(&core.queue))
        };
        queue.get_choice(height, option_count)
    }
}

/// The suspension primitive: pending on the first poll, ready on the second.
pub struct Bg {
    yielded: bool,
}

impl Future for Bg {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}

/// One trial's scheduler: the runnable actions plus the work queue that
/// decides, at every step, which of them runs next.
pub struct RunnableActionSet {
    core: Rc<RefCell<SetCore>>,
    runnable: Vec<ActionFuture>,
    max_decisions: usize,
    waker: Waker,
}

impl RunnableActionSet {
    /// A set with no decision bound.
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self::with_max_decisions(queue, usize::MAX)
    }

    /// A set that gives up with [`ActionResult::Timeout`] after
    /// `max_decisions` decisions. Use for scenarios that may not terminate
    /// under every interleaving.
    pub fn with_max_decisions(queue: Arc<WorkQueue>, max_decisions: usize) -> Self {
        RunnableActionSet {
            core: Rc::new(RefCell::new(SetCore {
                queue,
                decision_count: 0,
            })),
            runnable: Vec::new(),
            max_decisions,
            waker: Waker::from(Arc::new(IgnoredWake)),
        }
    }

    /// Register an action and run it eagerly until its first suspension.
    /// An action that never suspends completes right here, consuming no
    /// decisions.
    ///
    /// `action` must be a plain function (or non-capturing closure); pass
    /// whatever trial state it needs through `arg`.
    ///
    /// # Panics
    ///
    /// If any decision has already been consumed. Actions join before the
    /// trial starts, not during it.
    pub fn add_action<A, F>(&mut self, action: fn(ActionCtx, A) -> F, arg: A)
    where
        F: Future<Output = ()> + 'static,
    {
        assert_eq!(
            self.core.borrow().decision_count,
            0,
            "actions must be added before the trial consumes decisions"
        );
        let ctx = ActionCtx {
            core: Rc::clone(&self.core),
        };
        let mut future: ActionFuture = Box::pin(action(ctx, arg));
        let mut cx = Context::from_waker(&self.waker);
        if future.as_mut().poll(&mut cx).is_pending() {
            self.runnable.push(future);
        }
    }

    /// Drive the trial to completion (or to the decision bound).
    ///
    /// # Panics
    ///
    /// If decisions were already consumed before `run()`. Each set runs
    /// exactly one trial.
    pub fn run(&mut self) -> ActionResult {
        assert_eq!(
            self.core.borrow().decision_count,
            0,
            "run() must start from a fresh set"
        );
        while !self.runnable.is_empty() && self.core.borrow().decision_count < self.max_decisions {
            self.run_next_decision();
        }
        if self.runnable.is_empty() {
            ActionResult::Ok
        } else {
            debug_assert_eq!(self.core.borrow().decision_count, self.max_decisions);
            ActionResult::Timeout
        }
    }

    /// Decisions consumed so far in this trial.
    pub fn decisions(&self) -> usize {
        self.core.borrow().decision_count
    }

    /// One scheduling decision: ask the tree which runnable action goes next,
    /// then resume it until it suspends (re-joining at the tail) or returns.
    fn run_next_decision(&mut self) {
        let count = self.runnable.len();
        assert!(
            count <= Choice::MAX as usize,
            "more than {} runnable actions",
            Choice::MAX
        );
        let height = {
            let mut core = self.core.borrow_mut();
            let height = core.decision_count;
            core.decision_count += 1;
            height
        };
        let queue = Arc::clone(&self.core.borrow().queue);
        let choice = queue.get_choice(height, count as u8);

        let mut action = self.runnable.remove(choice as usize);
        let mut cx = Context::from_waker(&self.waker);
        if action.as_mut().poll(&mut cx).is_pending() {
            self.runnable.push(action);
        }
    }
}
