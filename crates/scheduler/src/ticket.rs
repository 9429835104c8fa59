//! Render requests, outcomes and tickets

use crate::inflight::WaiterId;
use pdf_reader_render::{Bitmap, DecoderError, ErrorKind};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A page the caller wants decoded at a given pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub page_index: u32,
    pub width: u32,
    pub height: u32,
}

impl PageRequest {
    pub fn new(page_index: u32, width: u32, height: u32) -> Self {
        Self { page_index, width, height }
    }
}

/// Failure delivered to every waiter of a page.
///
/// Document-level failures (opening, or rendering with nothing open) carry
/// [`ErrorKind::Open`]; their page index is 0 when no page was involved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error on page {page_index}: {message}")]
pub struct RenderError {
    pub page_index: u32,
    pub kind: ErrorKind,
    pub message: String,
}

impl RenderError {
    pub fn new(page_index: u32, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { page_index, kind, message: message.into() }
    }

    pub(crate) fn from_decoder(page_index: u32, err: &DecoderError) -> Self {
        Self::new(page_index, err.kind().unwrap_or(ErrorKind::Decode), err.to_string())
    }

    pub(crate) fn lane_stopped(page_index: u32) -> Self {
        Self::new(page_index, ErrorKind::Open, "render lane is not running")
    }
}

/// How a request ended.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered(Bitmap),
    Failed(RenderError),
    /// The request was withdrawn or its document replaced. Not a failure.
    Cancelled,
}

impl RenderOutcome {
    pub fn bitmap(&self) -> Option<&Bitmap> {
        match self {
            RenderOutcome::Rendered(bitmap) => Some(bitmap),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderOutcome::Cancelled)
    }
}

/// Handle to one waiter's interest in a page render.
///
/// The outcome is delivered exactly once. A ticket whose job was dropped
/// without an outcome reports [`RenderOutcome::Cancelled`].
#[derive(Debug)]
pub struct RenderTicket {
    page_index: u32,
    waiter: WaiterId,
    receiver: Receiver<RenderOutcome>,
}

impl RenderTicket {
    pub(crate) fn new(
        page_index: u32,
        waiter: WaiterId,
        receiver: Receiver<RenderOutcome>,
    ) -> Self {
        Self { page_index, waiter, receiver }
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// Identity used to withdraw this ticket with `RenderScheduler::cancel`.
    pub fn waiter(&self) -> WaiterId {
        self.waiter
    }

    /// Non-blocking poll. Returns `None` while the render is pending.
    pub fn try_outcome(&self) -> Option<RenderOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(RenderOutcome::Cancelled),
        }
    }

    /// Block until the outcome arrives.
    pub fn wait(self) -> RenderOutcome {
        self.receiver.recv().unwrap_or(RenderOutcome::Cancelled)
    }

    /// Block for at most `timeout`. Returns `None` if nothing arrived in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RenderOutcome> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(RenderOutcome::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_reader_render::RgbaImage;
    use std::sync::mpsc;

    #[test]
    fn test_ticket_pending_then_ready() {
        let (sender, receiver) = mpsc::channel();
        let ticket = RenderTicket::new(2, WaiterId::new(7), receiver);

        assert!(ticket.try_outcome().is_none());
        sender.send(RenderOutcome::Rendered(Bitmap::new(2, RgbaImage::new(2, 2)))).unwrap();

        let outcome = ticket.try_outcome().expect("outcome should be ready");
        assert_eq!(outcome.bitmap().map(Bitmap::page_index), Some(2));
        assert_eq!(ticket.waiter(), WaiterId::new(7));
    }

    #[test]
    fn test_dropped_sender_reads_as_cancelled() {
        let (sender, receiver) = mpsc::channel::<RenderOutcome>();
        let ticket = RenderTicket::new(0, WaiterId::new(1), receiver);
        drop(sender);

        assert!(ticket.try_outcome().is_some_and(|outcome| outcome.is_cancelled()));
        assert!(ticket.wait().is_cancelled());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let (_sender, receiver) = mpsc::channel::<RenderOutcome>();
        let ticket = RenderTicket::new(0, WaiterId::new(1), receiver);

        assert!(ticket.wait_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_render_error_from_decoder() {
        let err = DecoderError::IndexOutOfRange { index: 9, page_count: 3 };
        let render_error = RenderError::from_decoder(9, &err);

        assert_eq!(render_error.kind, ErrorKind::Index);
        assert_eq!(render_error.page_index, 9);
        assert!(render_error.message.contains("out of range"));
    }
}
