//! Search outcomes and aggregate statistics.

use crate::path::Path;
use serde::{Deserialize, Serialize};

/// Totals across all workers of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStats {
    /// Worker threads that participated.
    pub workers: usize,
    /// Trials (leaves) executed.
    pub trials: usize,
    /// Decisions consumed across all trials.
    pub decisions: usize,
    /// Trials that hit their decision bound.
    pub timeouts: usize,
    /// Successful subtree steals between workers.
    pub steals: usize,
}

/// Outcome of one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckResult {
    /// Every explored interleaving satisfied the predicate.
    Pass { stats: CheckStats },
    /// Some interleaving failed the predicate; `path` replays it.
    Violation { path: Path, stats: CheckStats },
}

impl CheckResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckResult::Pass { .. })
    }

    pub fn stats(&self) -> &CheckStats {
        match self {
            CheckResult::Pass { stats } | CheckResult::Violation { stats, .. } => stats,
        }
    }

    /// The failing path, if any.
    pub fn into_bad_path(self) -> Option<Path> {
        match self {
            CheckResult::Pass { .. } => None,
            CheckResult::Violation { path, .. } => Some(path),
        }
    }
}
