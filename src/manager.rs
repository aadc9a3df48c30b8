//! The steal pool: hands each worker a [`WorkQueue`] and coordinates
//! stealing and collective termination.
//!
//! Workers that run out of work park in [`WorkQueueManager::get_work_queue`]
//! until either another worker advertises a stealable queue or every worker
//! is parked at once. The latter is the termination condition: nobody has
//! work and nobody can produce any, so the search is complete.
//!
//! Lock order: the manager lock may be taken before a slot lock, and a
//! queue's cursor lock is only ever taken with neither held. In particular a
//! thief identifies its victim under the manager lock but calls
//! [`WorkQueue::steal_work`] after releasing it.

use crate::path::Path;
use crate::work_queue::WorkQueue;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One worker's entry in the pool: its current queue plus the advertisement
/// flag. The flag is atomic so `mark_self_as_stealable` can bail without the
/// manager lock when the queue is already advertised.
struct QueueState {
    slot: Mutex<Option<Arc<WorkQueue>>>,
    in_steal_queue: AtomicBool,
}

struct ManagerShared {
    /// Indices of queues advertised as having stealable work, oldest first.
    stealable: VecDeque<usize>,
    /// Workers currently blocked in the steal path. A worker probing a victim
    /// (between picking the FIFO head and learning the outcome) is *not*
    /// counted; otherwise the other workers could observe `== n` mid-probe
    /// and terminate a search that still has work.
    pending_steals: usize,
    /// Latched by `shortcircuit_done`; blocks further advertisement.
    shortcircuit: bool,
    /// Successful steals, for the run report.
    steals: usize,
}

/// Owns the per-worker queues and the steal/termination protocol.
pub struct WorkQueueManager {
    queues: Vec<QueueState>,
    shared: Mutex<ManagerShared>,
    work_available: Condvar,
}

impl WorkQueueManager {
    /// A pool of `n_queues` workers. Queue 0 starts with the whole subtree
    /// under `initial_path`; the rest start empty and acquire work by
    /// stealing.
    pub fn new(n_queues: usize, initial_path: Path) -> Self {
        assert!(n_queues >= 1, "a search needs at least one worker");
        let queues = (0..n_queues)
            .map(|idx| QueueState {
                slot: Mutex::new(
                    (idx == 0).then(|| Arc::new(WorkQueue::rooted(initial_path.clone()))),
                ),
                in_steal_queue: AtomicBool::new(false),
            })
            .collect();
        WorkQueueManager {
            queues,
            shared: Mutex::new(ManagerShared {
                stealable: VecDeque::new(),
                pending_steals: 0,
                shortcircuit: false,
                steals: 0,
            }),
            work_available: Condvar::new(),
        }
    }

    /// Number of worker slots.
    pub fn n_queues(&self) -> usize {
        self.queues.len()
    }

    /// Successful steals so far.
    pub fn steals(&self) -> usize {
        self.shared.lock().steals
    }

    /// Worker `idx`'s next queue: its own if it still has work, otherwise a
    /// queue stolen from another worker. Returns `None` once the whole search
    /// is complete (every worker is parked here and nothing is stealable).
    pub fn get_work_queue(&self, idx: usize) -> Option<Arc<WorkQueue>> {
        if let Some(queue) = self.queues[idx].slot.lock().clone() {
            if !queue.done() {
                return Some(queue);
            }
        }

        let n_workers = self.queues.len();
        let mut shared = self.shared.lock();
        shared.pending_steals += 1;
        loop {
            while shared.stealable.is_empty() && shared.pending_steals < n_workers {
                self.work_available.wait(&mut shared);
            }
            if shared.pending_steals == n_workers {
                debug!(worker = idx, "all workers idle, search complete");
                self.work_available.notify_all();
                return None;
            }

            let victim = *shared.stealable.front().expect("non-empty past the wait loop");
            let victim_queue = self.queues[victim].slot.lock().clone();
            shared.pending_steals -= 1;
            drop(shared);
            let stolen = victim_queue.and_then(|queue| queue.steal_work());
            shared = self.shared.lock();

            match stolen {
                Some(queue) => {
                    let queue = Arc::new(queue);
                    *self.queues[idx].slot.lock() = Some(Arc::clone(&queue));
                    self.queues[idx].in_steal_queue.store(false, Ordering::Release);
                    shared.steals += 1;
                    debug!(
                        worker = idx,
                        victim,
                        prefix = %queue.committed_prefix(),
                        "stole subtree"
                    );
                    return Some(queue);
                }
                None => {
                    shared.pending_steals += 1;
                    // The victim had nothing to give. Retire its entry unless
                    // another failed thief beat us to it.
                    if shared.stealable.front() == Some(&victim) {
                        shared.stealable.pop_front();
                        self.queues[victim].in_steal_queue.store(false, Ordering::Release);
                    }
                }
            }
        }
    }

    /// Advertise worker `idx`'s queue as stealable. Call after
    /// `advance_cursor` whenever the queue is not done. Idempotent; ignored
    /// after shortcircuit.
    pub fn mark_self_as_stealable(&self, idx: usize) {
        let state = &self.queues[idx];
        if state.in_steal_queue.load(Ordering::Acquire) {
            return;
        }
        let mut shared = self.shared.lock();
        if shared.shortcircuit {
            return;
        }
        state.in_steal_queue.store(true, Ordering::Release);
        shared.stealable.push_back(idx);
        self.work_available.notify_all();
    }

    /// Stop handing out new subtrees: a bad path has been found. Workers
    /// drain the queues they already hold, then the pool terminates through
    /// the all-idle condition.
    pub fn shortcircuit_done(&self) {
        let mut shared = self.shared.lock();
        shared.stealable.clear();
        shared.shortcircuit = true;
        debug!("shortcircuit: no further subtrees will be handed out");
        self.work_available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn seeded_queue_goes_to_worker_zero() {
        let manager = WorkQueueManager::new(2, Path::from([1]));
        let queue = manager.get_work_queue(0).expect("seeded");
        assert_eq!(queue.committed_prefix(), &Path::from([1]));
    }

    #[test]
    fn single_worker_terminates_when_its_queue_is_done() {
        let manager = WorkQueueManager::new(1, Path::new());
        let queue = manager.get_work_queue(0).expect("seeded");
        queue.get_choice(0, 1);
        queue.advance_cursor();
        assert!(queue.done());
        assert!(manager.get_work_queue(0).is_none());
    }

    #[test]
    fn second_worker_steals_an_advertised_branch() {
        let manager = WorkQueueManager::new(2, Path::new());
        let queue = manager.get_work_queue(0).expect("seeded");
        queue.get_choice(0, 3);
        queue.advance_cursor();
        manager.mark_self_as_stealable(0);

        // Worker 1 has no queue; the advertised branch is waiting for it.
        let stolen = manager.get_work_queue(1).expect("stealable branch");
        assert_eq!(stolen.committed_prefix(), &Path::from([2]));
        assert_eq!(manager.steals(), 1);

        // The owner's cursor moved on independently.
        assert_eq!(queue.current_path(), Path::from([1]));
    }

    #[test]
    fn exhausted_victim_is_retired_from_the_fifo() {
        let manager = WorkQueueManager::new(2, Path::new());
        let queue = manager.get_work_queue(0).expect("seeded");
        // A single-branch node: advertised, but nothing to steal. Worker 0
        // then finishes entirely, so worker 1's failed probe must retire the
        // entry and fall through to termination alongside worker 0.
        queue.get_choice(0, 1);
        manager.mark_self_as_stealable(0);
        queue.advance_cursor();
        assert!(queue.done());

        thread::scope(|scope| {
            let handles = [
                scope.spawn(|| manager.get_work_queue(0).is_none()),
                scope.spawn(|| manager.get_work_queue(1).is_none()),
            ];
            for handle in handles {
                assert!(handle.join().unwrap());
            }
        });
    }

    #[test]
    fn shortcircuit_clears_the_fifo_and_blocks_marks() {
        let manager = WorkQueueManager::new(2, Path::new());
        let queue = manager.get_work_queue(0).expect("seeded");
        queue.get_choice(0, 3);
        queue.advance_cursor();
        manager.mark_self_as_stealable(0);
        manager.shortcircuit_done();
        manager.mark_self_as_stealable(0);

        // Nothing stealable: both workers run out together.
        thread::scope(|scope| {
            let handles = [
                scope.spawn(|| manager.get_work_queue(1).is_none()),
                scope.spawn(|| {
                    // Drain worker 0's remaining leaves first.
                    while let Some(queue) = manager.get_work_queue(0) {
                        queue.get_choice(0, 3);
                        queue.advance_cursor();
                    }
                    true
                }),
            ];
            for handle in handles {
                assert!(handle.join().unwrap());
            }
        });
    }

    #[test]
    fn two_workers_split_a_tree_and_terminate() {
        let manager = Arc::new(WorkQueueManager::new(2, Path::new()));
        let total: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|idx| {
                    let manager = Arc::clone(&manager);
                    scope.spawn(move || {
                        let mut leaves = 0;
                        while let Some(queue) = manager.get_work_queue(idx) {
                            // Fixed 3x3x3 tree.
                            queue.get_choice(0, 3);
                            queue.get_choice(1, 3);
                            queue.get_choice(2, 3);
                            leaves += 1;
                            queue.advance_cursor();
                            if !queue.done() {
                                manager.mark_self_as_stealable(idx);
                            }
                        }
                        leaves
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(total, 27);
    }
}
