//! In-flight job registry
//!
//! Maps a page index to the single render job pending or running for it. A
//! job collects the waiters interested in its outcome; a second request for
//! the same page attaches to the existing job instead of queueing another
//! decode.

use crate::cancel::CancellationToken;
use crate::ticket::RenderOutcome;
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::Sender;

/// Unique job identifier
pub type JobId = u64;

/// One party interested in a page render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

impl WaiterId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waiter#{}", self.0)
    }
}

pub(crate) struct InFlightJob {
    pub job_id: JobId,
    pub token: CancellationToken,
    pub waiters: HashMap<WaiterId, Sender<RenderOutcome>>,
}

impl InFlightJob {
    pub fn new(job_id: JobId, token: CancellationToken) -> Self {
        Self { job_id, token, waiters: HashMap::new() }
    }

    /// Deliver `outcome` to every waiter still attached.
    ///
    /// A waiter whose ticket was dropped simply misses it.
    pub fn notify_all(&mut self, outcome: &RenderOutcome) -> usize {
        let waiters = self.waiters.len();
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(outcome.clone());
        }
        waiters
    }
}

/// Pending and running jobs keyed by page index.
#[derive(Default)]
pub(crate) struct InFlightRegistry {
    jobs: HashMap<u32, InFlightJob>,
}

impl InFlightRegistry {
    pub fn get_mut(&mut self, page_index: u32) -> Option<&mut InFlightJob> {
        self.jobs.get_mut(&page_index)
    }

    pub fn insert(&mut self, page_index: u32, job: InFlightJob) {
        self.jobs.insert(page_index, job);
    }

    /// Whether `job_id` is still the registered job for `page_index`.
    pub fn is_current(&self, page_index: u32, job_id: JobId) -> bool {
        self.jobs.get(&page_index).is_some_and(|job| job.job_id == job_id)
    }

    /// Remove the job for `page_index`, but only if it is `job_id`.
    pub fn take_current(&mut self, page_index: u32, job_id: JobId) -> Option<InFlightJob> {
        if self.is_current(page_index, job_id) {
            self.jobs.remove(&page_index)
        } else {
            None
        }
    }

    /// Fire every token and tell every waiter it was cancelled. Jobs stay
    /// registered until the lane tears them down, so a new request can still
    /// revive them. Returns the number of jobs cancelled.
    pub fn cancel_all(&mut self) -> usize {
        for job in self.jobs.values_mut() {
            job.token.cancel();
            job.notify_all(&RenderOutcome::Cancelled);
        }
        self.jobs.len()
    }

    /// Cancel and forget every job.
    pub fn drain(&mut self) -> usize {
        let cancelled = self.cancel_all();
        self.jobs.clear();
        cancelled
    }

    pub fn contains(&self, page_index: u32) -> bool {
        self.jobs.contains_key(&page_index)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.jobs.keys().copied().collect();
        pages.sort_unstable();
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn job_with_waiters(
        job_id: JobId,
        count: u64,
    ) -> (InFlightJob, Vec<mpsc::Receiver<RenderOutcome>>) {
        let mut job = InFlightJob::new(job_id, CancellationToken::new());
        let mut receivers = Vec::new();
        for id in 0..count {
            let (sender, receiver) = mpsc::channel();
            job.waiters.insert(WaiterId::new(id), sender);
            receivers.push(receiver);
        }
        (job, receivers)
    }

    #[test]
    fn test_notify_all_reaches_every_waiter() {
        let (mut job, receivers) = job_with_waiters(1, 3);

        assert_eq!(job.notify_all(&RenderOutcome::Cancelled), 3);
        assert!(job.waiters.is_empty());
        for receiver in receivers {
            assert!(receiver.try_recv().unwrap().is_cancelled());
        }
    }

    #[test]
    fn test_take_current_checks_job_id() {
        let mut registry = InFlightRegistry::default();
        let (job, _receivers) = job_with_waiters(5, 1);
        registry.insert(2, job);

        assert!(registry.take_current(2, 4).is_none());
        assert!(registry.contains(2));
        assert!(registry.take_current(2, 5).is_some());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_cancel_all_keeps_jobs_for_revival() {
        let mut registry = InFlightRegistry::default();
        let (job, receivers) = job_with_waiters(1, 2);
        let token = job.token.clone();
        registry.insert(0, job);

        assert_eq!(registry.cancel_all(), 1);

        assert!(token.is_cancelled());
        assert_eq!(registry.pages(), vec![0]);
        assert!(registry.get_mut(0).unwrap().waiters.is_empty());
        assert!(receivers.iter().all(|r| r.try_recv().unwrap().is_cancelled()));
    }

    #[test]
    fn test_drain_forgets_jobs() {
        let mut registry = InFlightRegistry::default();
        registry.insert(0, job_with_waiters(1, 0).0);
        registry.insert(3, job_with_waiters(2, 0).0);

        assert_eq!(registry.drain(), 2);
        assert_eq!(registry.len(), 0);
    }
}
