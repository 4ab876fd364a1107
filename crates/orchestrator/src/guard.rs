//! Finalize guard: makes the expensive finalize step run at most once
//! per job across overlapping poll ticks.
//!
//! `downloading` holds jobs whose finalize is in flight; `finalized`
//! holds jobs whose finalize already succeeded. A tick may start
//! finalize only when the job is in neither set. The check and the
//! insert happen in one call under the scheduler lock with no await in
//! between.

use std::collections::HashSet;

use genjobs_core::types::JobId;

#[derive(Debug, Default)]
pub struct DedupGuard {
    downloading: HashSet<JobId>,
    finalized: HashSet<JobId>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the finalize step for `id`.
    ///
    /// Returns `false` if another tick is finalizing or already finalized it.
    pub fn begin_finalize(&mut self, id: &JobId) -> bool {
        if self.is_claimed(id) {
            return false;
        }
        self.downloading.insert(id.clone());
        true
    }

    /// Release the claim taken by [`begin_finalize`](Self::begin_finalize).
    pub fn complete_finalize(&mut self, id: &JobId, success: bool) {
        self.downloading.remove(id);
        if success {
            self.finalized.insert(id.clone());
        }
    }

    /// Finalize is running or already done for `id`.
    pub fn is_claimed(&self, id: &JobId) -> bool {
        self.downloading.contains(id) || self.finalized.contains(id)
    }

    pub fn is_downloading(&self, id: &JobId) -> bool {
        self.downloading.contains(id)
    }

    pub fn is_finalized(&self, id: &JobId) -> bool {
        self.finalized.contains(id)
    }

    /// Drop every trace of `id`.
    pub fn forget(&mut self, id: &JobId) {
        self.downloading.remove(id);
        self.finalized.remove(id);
    }

    pub fn clear(&mut self) {
        self.downloading.clear();
        self.finalized.clear();
    }
}
