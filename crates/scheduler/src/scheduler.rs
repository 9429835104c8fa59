//! Render scheduler
//!
//! Turns page requests into decodes on the lane. Requests for a cached page
//! resolve at once; requests for a page already in flight attach to that job.
//! Finished bitmaps are stored in the page cache in the same critical section
//! that retires the job, so a page is always either in flight, cached, or
//! absent.

use crate::cancel::CancellationToken;
use crate::inflight::{InFlightJob, InFlightRegistry, JobId, WaiterId};
use crate::lane::{self, LaneCommand, RenderJob};
use crate::ticket::{PageRequest, RenderError, RenderOutcome, RenderTicket};
use log::{debug, info, warn};
use parking_lot::Mutex;
use pdf_reader_cache::PageCache;
use pdf_reader_render::{
    BackendError, Bitmap, DecoderBackend, DecoderError, DocumentInfo, DocumentSource, ErrorKind,
};
use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Statistics about scheduler operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total requests received
    pub requests: u64,

    /// Requests answered straight from the cache
    pub cache_hits: u64,

    /// Requests attached to a job already in flight
    pub dedup_attaches: u64,

    /// Decodes the lane started
    pub decodes_started: u64,

    /// Jobs that produced a bitmap
    pub completed: u64,

    /// Jobs that failed
    pub failed: u64,

    /// Jobs torn down after cancellation or document replacement
    pub cancelled: u64,

    /// Jobs currently registered
    pub in_flight: usize,
}

impl SchedulerStats {
    /// Requests that did not need a decode of their own.
    pub fn decodes_avoided(&self) -> u64 {
        self.cache_hits + self.dedup_attaches
    }
}

struct SchedulerState {
    lane: mpsc::Sender<LaneCommand>,
    /// Bumped on every open and close; jobs from older generations are dropped.
    generation: u64,
    next_job_id: JobId,
    next_waiter_id: u64,
    registry: InFlightRegistry,
    viewport: u32,
    document: Option<DocumentInfo>,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn next_waiter(&mut self) -> WaiterId {
        let waiter = WaiterId::new(self.next_waiter_id);
        self.next_waiter_id += 1;
        waiter
    }

    /// Forget every job of the current document and start a new generation.
    fn reset_document(&mut self) -> u64 {
        let cancelled = self.registry.drain();
        if cancelled > 0 {
            debug!("cancelled {cancelled} in-flight renders for document change");
        }
        self.stats.cancelled += cancelled as u64;
        self.generation += 1;
        self.document = None;
        self.generation
    }

    fn is_current(&self, job: &RenderJob) -> bool {
        self.generation == job.generation
            && self.registry.is_current(job.request.page_index, job.job_id)
    }

    fn tear_down(&mut self, job: &RenderJob) {
        let page_index = job.request.page_index;
        if let Some(mut entry) = self.registry.take_current(page_index, job.job_id) {
            entry.notify_all(&RenderOutcome::Cancelled);
            self.stats.cancelled += 1;
            debug!("dropped cancelled render of page {page_index}");
        }
    }
}

/// State shared between the scheduler handle and the lane.
///
/// Lock order: scheduler state, then cache.
pub(crate) struct Shared {
    state: Mutex<SchedulerState>,
    cache: PageCache,
}

impl Shared {
    /// Checkpoint before a job starts. Returns `false` if the job is stale or
    /// was cancelled, in which case it is already torn down.
    pub(crate) fn begin_job(&self, job: &RenderJob) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(job) {
            debug!("skipping stale render of page {}", job.request.page_index);
            return false;
        }
        if job.token.is_cancelled() {
            state.tear_down(job);
            return false;
        }

        state.stats.decodes_started += 1;
        debug!(
            "decoding page {} at {}x{}",
            job.request.page_index, job.request.width, job.request.height
        );
        true
    }

    /// Retire a job with the lane's result. Returns the job if it must run
    /// again because it was revived after the decode observed cancellation.
    pub(crate) fn finish_job(
        &self,
        job: RenderJob,
        result: Result<Bitmap, DecoderError>,
    ) -> Option<RenderJob> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let page_index = job.request.page_index;

        if !state.is_current(&job) {
            debug!("discarding stale result for page {page_index}");
            return None;
        }
        if job.token.is_cancelled() {
            state.tear_down(&job);
            return None;
        }
        if matches!(&result, Err(err) if err.is_cancelled()) {
            debug!("page {page_index} was requested again while cancelling, re-running");
            return Some(job);
        }

        let mut entry = state.registry.take_current(page_index, job.job_id)?;
        match result {
            Ok(bitmap) => {
                self.cache.put(page_index, bitmap.clone(), state.viewport);
                state.stats.completed += 1;
                let waiters = entry.notify_all(&RenderOutcome::Rendered(bitmap));
                debug!("page {page_index} ready for {waiters} waiters");
            }
            Err(err) => {
                warn!("render of page {page_index} failed: {err}");
                state.stats.failed += 1;
                let error = RenderError::from_decoder(page_index, &err);
                entry.notify_all(&RenderOutcome::Failed(error));
            }
        }
        None
    }
}

/// Deduplicating page render scheduler
///
/// Owns the decode lane. Every public method returns promptly; decodes happen
/// on the lane and reach callers through [`RenderTicket`]s.
///
/// # Example
///
/// ```
/// use pdf_reader_cache::PageCache;
/// use pdf_reader_render::SyntheticBackend;
/// use pdf_reader_scheduler::{PageRequest, RenderScheduler};
///
/// let backend = SyntheticBackend::new().with_document("report.pdf", 3);
/// let scheduler = RenderScheduler::new(move || Ok(backend), PageCache::default()).unwrap();
/// scheduler.open("report.pdf").unwrap();
///
/// let ticket = scheduler.request(PageRequest::new(0, 100, 140));
/// let outcome = ticket.wait();
/// assert_eq!(outcome.bitmap().map(|bitmap| bitmap.width()), Some(100));
/// ```
pub struct RenderScheduler {
    shared: Arc<Shared>,
    lane: Option<JoinHandle<()>>,
}

impl RenderScheduler {
    /// Start the decode lane. `factory` builds the backend on the lane thread.
    pub fn new<B, F>(factory: F, cache: PageCache) -> io::Result<Self>
    where
        B: DecoderBackend + 'static,
        F: FnOnce() -> Result<B, BackendError> + Send + 'static,
    {
        let (sender, commands) = mpsc::channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                lane: sender,
                generation: 0,
                next_job_id: 0,
                next_waiter_id: 0,
                registry: InFlightRegistry::default(),
                viewport: 0,
                document: None,
                stats: SchedulerStats::default(),
            }),
            cache,
        });

        let lane = lane::spawn(factory, shared.clone(), commands)?;
        Ok(Self { shared, lane: Some(lane) })
    }

    /// Open a document, replacing the current one.
    ///
    /// Every in-flight request is cancelled and the cache cleared before the
    /// lane switches documents.
    pub fn open(&self, source: impl Into<DocumentSource>) -> Result<DocumentInfo, RenderError> {
        let source = source.into();
        let title = source.title();
        let (reply, response) = mpsc::channel();

        let generation = {
            let mut state = self.shared.state.lock();
            let generation = state.reset_document();
            self.shared.cache.clear();
            state
                .lane
                .send(LaneCommand::Open { source, reply })
                .map_err(|_| RenderError::lane_stopped(0))?;
            generation
        };

        match response.recv().map_err(|_| RenderError::lane_stopped(0))? {
            Ok(info) => {
                let mut state = self.shared.state.lock();
                if state.generation == generation {
                    state.document = Some(info.clone());
                }
                Ok(info)
            }
            Err(err) => {
                warn!("failed to open {title}: {err}");
                Err(RenderError::new(0, ErrorKind::Open, err.to_string()))
            }
        }
    }

    /// Close the current document. Idempotent.
    pub fn close(&self) {
        let (reply, done) = mpsc::channel();
        {
            let mut state = self.shared.state.lock();
            state.reset_document();
            self.shared.cache.clear();
            if state.lane.send(LaneCommand::Close { reply }).is_err() {
                return;
            }
        }
        let _ = done.recv();
    }

    /// Ask for a page.
    ///
    /// Cached pages resolve immediately. A page already in flight gains
    /// another waiter and no second decode; a cancelled job is revived.
    pub fn request(&self, request: PageRequest) -> RenderTicket {
        let page_index = request.page_index;
        let (sender, receiver) = mpsc::channel();

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        state.stats.requests += 1;
        let waiter = state.next_waiter();
        let ticket = RenderTicket::new(page_index, waiter, receiver);

        if let Some(bitmap) = self.shared.cache.get(page_index) {
            state.stats.cache_hits += 1;
            let _ = sender.send(RenderOutcome::Rendered(bitmap));
            return ticket;
        }

        if let Some(job) = state.registry.get_mut(page_index) {
            if job.token.is_cancelled() {
                job.token.reset();
                debug!("revived render of page {page_index}");
            }
            job.waiters.insert(waiter, sender);
            state.stats.dedup_attaches += 1;
            debug!("{waiter} attached to in-flight render of page {page_index}");
            return ticket;
        }

        let job_id = state.next_job_id;
        state.next_job_id += 1;
        let token = CancellationToken::new();
        let mut entry = InFlightJob::new(job_id, token.clone());
        entry.waiters.insert(waiter, sender);
        state.registry.insert(page_index, entry);

        let job = RenderJob { job_id, generation: state.generation, request, token };
        if state.lane.send(LaneCommand::Render(job)).is_err() {
            if let Some(mut entry) = state.registry.take_current(page_index, job_id) {
                entry.notify_all(&RenderOutcome::Failed(RenderError::lane_stopped(page_index)));
            }
        }

        ticket
    }

    /// Withdraw one waiter. The job's token fires when its last waiter
    /// leaves. Returns `false` if the waiter was not attached to that page.
    pub fn cancel(&self, page_index: u32, waiter: WaiterId) -> bool {
        let mut state = self.shared.state.lock();
        let Some(job) = state.registry.get_mut(page_index) else {
            return false;
        };
        let Some(sender) = job.waiters.remove(&waiter) else {
            return false;
        };

        let _ = sender.send(RenderOutcome::Cancelled);
        if job.waiters.is_empty() {
            job.token.cancel();
            debug!("cancelled render of page {page_index}");
        }
        true
    }

    /// Cancel every in-flight job. Returns the number of jobs cancelled.
    pub fn cancel_all(&self) -> usize {
        self.shared.state.lock().registry.cancel_all()
    }

    pub fn document(&self) -> Option<DocumentInfo> {
        self.shared.state.lock().document.clone()
    }

    /// Page count of the open document, 0 if none.
    pub fn page_count(&self) -> u32 {
        self.shared.state.lock().document.as_ref().map_or(0, |info| info.page_count)
    }

    /// Set the viewport position used when finished pages are cached.
    pub fn set_viewport(&self, position: u32) {
        self.shared.state.lock().viewport = position;
    }

    pub fn viewport(&self) -> u32 {
        self.shared.state.lock().viewport
    }

    pub fn cache(&self) -> &PageCache {
        &self.shared.cache
    }

    pub fn is_in_flight(&self, page_index: u32) -> bool {
        self.shared.state.lock().registry.contains(page_index)
    }

    pub fn in_flight_pages(&self) -> Vec<u32> {
        self.shared.state.lock().registry.pages()
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats { in_flight: state.registry.len(), ..state.stats }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.reset_document();
            let _ = state.lane.send(LaneCommand::Shutdown);
        }

        if let Some(lane) = self.lane.take() {
            if lane.join().is_err() {
                warn!("render lane panicked");
            }
        }
        info!("render scheduler stopped");
    }
}
