//! The parallel driver: a pool of persistent workers that explore disjoint
//! subtrees of a scenario's choice tree.
//!
//! Workers are spawned once, at [`Pool::new`], and parked between searches;
//! each [`Pool::run`] installs a fresh [`WorkQueueManager`] seeded with the
//! initial path, wakes the workers, and rendezvouses with them on a barrier
//! when the search completes. Dropping the pool joins every worker.

use crate::action::ActionResult;
use crate::experiment::ExperimentBuilder;
use crate::manager::WorkQueueManager;
use crate::path::Path;
use crate::report::{CheckResult, CheckStats};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::{Arc, Barrier};
use std::thread;
use tracing::debug;

/// Per-worker tallies, merged into [`CheckStats`] by the coordinator.
#[derive(Debug, Default)]
struct WorkerStats {
    trials: usize,
    decisions: usize,
    timeouts: usize,
}

/// Everything one search shares between the coordinator and the workers.
struct Search<S> {
    manager: WorkQueueManager,
    experiment: Arc<ExperimentBuilder<S>>,
    /// Sized to workers + coordinator; crossing it means the search is over.
    barrier: Barrier,
    /// First failing path observed, if any.
    bad_path: Mutex<Option<Path>>,
    worker_stats: Sender<WorkerStats>,
}

struct PoolState<S> {
    /// Bumped per search so a worker never re-enters one it already finished.
    generation: u64,
    search: Option<Arc<Search<S>>>,
    shutdown: bool,
}

struct PoolShared<S> {
    state: Mutex<PoolState<S>>,
    search_ready: Condvar,
}

/// A fixed set of worker threads for running searches.
///
/// The pool is generic over the per-trial state type `S`; one pool can run
/// any number of searches over experiments with that state.
pub struct Pool<S: 'static> {
    shared: Arc<PoolShared<S>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl<S: 'static> Pool<S> {
    /// A pool with `n_workers` threads; `0` means one per available core.
    pub fn new(n_workers: usize) -> Self {
        let n_workers = if n_workers == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            n_workers
        };

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                generation: 0,
                search: None,
                shutdown: false,
            }),
            search_ready: Condvar::new(),
        });

        let workers = (0..n_workers)
            .map(|worker_id| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(&shared, worker_id))
            })
            .collect();

        Pool { shared, workers }
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Exhaustively check `experiment` from the tree root. Returns the first
    /// failing path observed, or `None` if every interleaving passes.
    pub fn run(&self, experiment: Arc<ExperimentBuilder<S>>) -> Option<Path> {
        self.run_from(experiment, Path::new())
    }

    /// Like [`Pool::run`], but explores only the subtree under
    /// `initial_path`. Pass a previously found bad path to replay it.
    pub fn run_from(&self, experiment: Arc<ExperimentBuilder<S>>, initial_path: Path) -> Option<Path> {
        self.check_from(experiment, initial_path).into_bad_path()
    }

    /// Exhaustively check `experiment`, returning the outcome with search
    /// statistics.
    pub fn check(&self, experiment: Arc<ExperimentBuilder<S>>) -> CheckResult {
        self.check_from(experiment, Path::new())
    }

    /// [`Pool::check`] restricted to the subtree under `initial_path`.
    pub fn check_from(
        &self,
        experiment: Arc<ExperimentBuilder<S>>,
        initial_path: Path,
    ) -> CheckResult {
        let n_workers = self.workers.len();
        let (stats_tx, stats_rx) = crossbeam_channel::bounded(n_workers);
        let search = Arc::new(Search {
            manager: WorkQueueManager::new(n_workers, initial_path),
            experiment,
            barrier: Barrier::new(n_workers + 1),
            bad_path: Mutex::new(None),
            worker_stats: stats_tx,
        });

        {
            let mut state = self.shared.state.lock();
            assert!(state.search.is_none(), "pool already has a search running");
            state.generation += 1;
            state.search = Some(Arc::clone(&search));
            self.shared.search_ready.notify_all();
        }

        search.barrier.wait();
        self.shared.state.lock().search = None;

        let mut stats = CheckStats {
            workers: n_workers,
            steals: search.manager.steals(),
            ..CheckStats::default()
        };
        for worker in stats_rx.try_iter() {
            stats.trials += worker.trials;
            stats.decisions += worker.decisions;
            stats.timeouts += worker.timeouts;
        }
        debug!(
            trials = stats.trials,
            decisions = stats.decisions,
            steals = stats.steals,
            "search finished"
        );

        let bad_path = search.bad_path.lock().take();
        match bad_path {
            Some(path) => CheckResult::Violation { path, stats },
            None => CheckResult::Pass { stats },
        }
    }
}

impl<S: 'static> Drop for Pool<S> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            debug_assert!(state.search.is_none(), "pool dropped mid-search");
            state.shutdown = true;
            self.shared.search_ready.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop<S>(shared: &PoolShared<S>, worker_id: usize) {
    let mut seen_generation = 0;
    loop {
        let search = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if state.generation != seen_generation {
                    if let Some(search) = state.search.as_ref() {
                        seen_generation = state.generation;
                        break Arc::clone(search);
                    }
                }
                shared.search_ready.wait(&mut state);
            }
        };
        run_search(&search, worker_id);
        search.barrier.wait();
    }
}

/// One worker's half of a search: acquire a queue, run trials along it until
/// it is exhausted, advertise leftovers, repeat until nothing is left.
fn run_search<S>(search: &Search<S>, worker_id: usize) {
    let mut stats = WorkerStats::default();
    while let Some(queue) = search.manager.get_work_queue(worker_id) {
        debug_assert!(!queue.done());

        // A panic anywhere in a trial (action body, build, or check) is a
        // scenario bug; unwinding would strand the other workers at the
        // barrier, so fail the whole process instead.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut trial = search.experiment.trial();
            let mut actions = trial.build(Arc::clone(&queue));
            let result = actions.run();
            let decisions = actions.decisions();
            (result, decisions, trial.check(result))
        }));
        let (result, decisions, acceptable) = match outcome {
            Ok(trial_outcome) => trial_outcome,
            Err(_) => {
                eprintln!("spindle: trial panicked at path {}", queue.current_path());
                process::abort();
            }
        };

        stats.trials += 1;
        stats.decisions += decisions;
        if result == ActionResult::Timeout {
            stats.timeouts += 1;
        }

        if !acceptable {
            let mut bad_path = search.bad_path.lock();
            if bad_path.is_none() {
                *bad_path = Some(queue.current_path());
                debug!(worker = worker_id, path = %queue.current_path(), "found bad path");
            }
            drop(bad_path);
            search.manager.shortcircuit_done();
        }

        queue.advance_cursor();
        if !queue.done() {
            search.manager.mark_self_as_stealable(worker_id);
        }
    }
    let _ = search.worker_stats.send(stats);
}
