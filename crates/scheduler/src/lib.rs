//! PDF Reader Scheduler Library
//!
//! Deduplicating, cancellable page rendering on a single decode lane.
//!
//! Every page has at most one render job. Further requests for the same page
//! attach to it as waiters, and a job whose last waiter leaves is cancelled
//! cooperatively. Finished pages land in a shared [`pdf_reader_cache::PageCache`].
//!
//! # Example
//!
//! ```
//! use pdf_reader_cache::PageCache;
//! use pdf_reader_render::SyntheticBackend;
//! use pdf_reader_scheduler::{PageRequest, RenderOutcome, RenderScheduler};
//!
//! let backend = SyntheticBackend::new().with_document("slides.pdf", 4);
//! let scheduler = RenderScheduler::new(move || Ok(backend), PageCache::new(2)).unwrap();
//! scheduler.open("slides.pdf").unwrap();
//!
//! // Two callers, one decode.
//! let a = scheduler.request(PageRequest::new(1, 200, 280));
//! let b = scheduler.request(PageRequest::new(1, 200, 280));
//!
//! assert!(matches!(a.wait(), RenderOutcome::Rendered(_)));
//! assert!(matches!(b.wait(), RenderOutcome::Rendered(_)));
//! ```

mod cancel;
mod inflight;
mod lane;
mod scheduler;
mod ticket;

// Re-export public API
pub use cancel::CancellationToken;
pub use inflight::{JobId, WaiterId};
pub use scheduler::{RenderScheduler, SchedulerStats};
pub use ticket::{PageRequest, RenderError, RenderOutcome, RenderTicket};
