//! The choice-tree enumerator.
//!
//! A [`WorkQueue`] is one worker's traversal of a subtree of the search
//! space. The tree is never materialized up front: nodes appear on demand as
//! [`WorkQueue::get_choice`] is called, and each node remembers the siblings
//! it has not yet visited. [`WorkQueue::advance_cursor`] steps the traversal
//! to the next leaf in depth-first order, and [`WorkQueue::steal_work`] splits
//! off the shallowest unexplored sibling as a fresh queue for another worker.
//!
//! The two operations deliberately take siblings from opposite ends of the
//! pending work: `advance_cursor` continues at the deepest branch point
//! (classic DFS), while `steal_work` hands out a branch as close to the root
//! as possible (the largest subtree it can give away), leaving the owner
//! working near the leaves.

use crate::path::{Choice, Path};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};

/// One node on the current cursor: the branch being explored plus the
/// siblings still to visit there. `remaining` is kept in visit order with the
/// next candidate at the tail.
struct PassedChoice {
    current: Choice,
    remaining: SmallVec<[Choice; 8]>,
    /// Branch count reported when this node was first discovered. Revisits
    /// along the same path must report the same count.
    n_opts: u8,
}

/// The mutable tail of the traversal: everything beyond the committed prefix.
#[derive(Default)]
struct Cursor {
    passed: Vec<PassedChoice>,
}

/// An in-progress depth-first traversal of the subtree rooted at a committed
/// prefix.
///
/// Owned by a single worker, which is the only caller of `get_choice` and
/// `advance_cursor`; any thread may concurrently call `steal_work`. All
/// access to the cursor goes through the internal mutex; the committed
/// prefix is immutable and read without it.
pub struct WorkQueue {
    /// Prefix from the global root to this subtree's root. The queue is done
    /// once everything under this prefix has been visited.
    committed: Path,
    cursor: Mutex<Cursor>,
    done: AtomicBool,
}

impl WorkQueue {
    /// A traversal of the whole tree.
    pub fn new() -> Self {
        Self::rooted(Path::new())
    }

    /// A traversal of the subtree under `committed_prefix`.
    pub fn rooted(committed_prefix: Path) -> Self {
        WorkQueue {
            committed: committed_prefix,
            cursor: Mutex::new(Cursor::default()),
            done: AtomicBool::new(false),
        }
    }

    /// The branch to take at depth `height` on the current path.
    ///
    /// `height` must equal the cursor depth: replays return the recorded
    /// choice, and a call one past the deepest recorded node discovers a new
    /// node with `n_opts` branches (visited 0 first).
    ///
    /// Only the owning worker may call this.
    ///
    /// # Panics
    ///
    /// On `n_opts == 0`, on a skipped depth, or on a revisit whose branch
    /// count disagrees with the one recorded at discovery. These are bugs in
    /// the driving scenario, not recoverable conditions.
    pub fn get_choice(&self, height: usize, n_opts: u8) -> Choice {
        assert!(n_opts >= 1, "a decision needs at least one option");
        if height < self.committed.len() {
            let choice = self.committed[height];
            assert!(
                choice < n_opts,
                "committed choice {choice} at depth {height} out of range for {n_opts} options"
            );
            return choice;
        }

        let index = height - self.committed.len();
        let mut cursor = self.cursor.lock();
        if let Some(entry) = cursor.passed.get(index) {
            assert_eq!(
                entry.n_opts, n_opts,
                "branch count at depth {height} changed between visits ({} vs {n_opts})",
                entry.n_opts
            );
            return entry.current;
        }

        assert_eq!(
            index,
            cursor.passed.len(),
            "get_choice at depth {height} skipped over undiscovered nodes"
        );
        // Tail-popped later, so store n_opts-1 .. 1: choice 0 now, 1 next.
        let remaining = (1..n_opts).rev().collect();
        cursor.passed.push(PassedChoice {
            current: 0,
            remaining,
            n_opts,
        });
        0
    }

    /// Move the cursor to the next unvisited leaf, depth-first. Call once per
    /// completed trial. When the last leaf under the committed prefix has been
    /// visited this latches `done`.
    pub fn advance_cursor(&self) {
        let mut cursor = self.cursor.lock();
        while let Some(entry) = cursor.passed.last_mut() {
            if let Some(next) = entry.remaining.pop() {
                entry.current = next;
                return;
            }
            cursor.passed.pop();
        }
        // Nothing pending at any depth: the subtree is exhausted.
        self.done.store(true, Ordering::Release);
    }

    /// Split off an unexplored branch as a new queue, or `None` if the
    /// traversal is done or has not yet produced a branch to share.
    ///
    /// The stolen queue's committed prefix is the current path down to the
    /// shallowest node with pending siblings, ending in the sibling taken.
    /// The owner keeps its cursor; only that node's pending set shrinks.
    pub fn steal_work(&self) -> Option<WorkQueue> {
        let mut cursor = self.cursor.lock();
        if self.done.load(Ordering::Acquire) {
            return None;
        }

        // The branch points nearest the root may already be exhausted (or
        // fully stolen); walk down until one still has a sibling to give.
        let mut prefix = self.committed.clone();
        for entry in cursor.passed.iter_mut() {
            match entry.remaining.pop() {
                None => prefix.push(entry.current),
                Some(sibling) => {
                    prefix.push(sibling);
                    return Some(WorkQueue::rooted(prefix));
                }
            }
        }
        None
    }

    /// Whether the subtree under the committed prefix is fully explored.
    /// Monotone: once true, stays true.
    pub fn done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Depth of the current cursor (committed prefix plus discovered nodes).
    pub fn decision_count(&self) -> usize {
        self.committed.len() + self.cursor.lock().passed.len()
    }

    /// The full path of the current cursor.
    pub fn current_path(&self) -> Path {
        let cursor = self.cursor.lock();
        let mut path = self.committed.clone();
        for entry in &cursor.passed {
            path.push(entry.current);
        }
        path
    }

    /// The immutable prefix this traversal is rooted at.
    pub fn committed_prefix(&self) -> &Path {
        &self.committed
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
