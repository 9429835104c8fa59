//! Display slots
//!
//! A slot is a recycled list cell. It remembers which page it is bound to
//! and a generation that changes on every bind and unbind, so a result meant
//! for an earlier binding is recognised and dropped.

use crate::error::PageError;
use pdf_reader_render::Bitmap;
use pdf_reader_scheduler::{RenderOutcome, RenderTicket};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// What a slot currently shows.
#[derive(Debug, Clone)]
pub enum SlotState {
    Unbound,
    /// Loading indicator.
    AwaitingRender { page_index: u32 },
    Displayed { page_index: u32, bitmap: Bitmap },
    /// Per-page error indicator.
    Failed { page_index: u32, error: PageError },
}

impl SlotState {
    pub fn page_index(&self) -> Option<u32> {
        match self {
            SlotState::Unbound => None,
            SlotState::AwaitingRender { page_index }
            | SlotState::Displayed { page_index, .. }
            | SlotState::Failed { page_index, .. } => Some(*page_index),
        }
    }
}

pub(crate) struct PendingRender {
    pub page_index: u32,
    pub generation: u64,
    pub ticket: RenderTicket,
}

pub struct DisplaySlot {
    width: u32,
    bound_page: Option<u32>,
    generation: u64,
    state: SlotState,
    pending: Option<PendingRender>,
}

impl DisplaySlot {
    pub(crate) fn new(width: u32) -> Self {
        Self { width, bound_page: None, generation: 0, state: SlotState::Unbound, pending: None }
    }

    /// Laid-out width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn bound_page(&self) -> Option<u32> {
        self.bound_page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        match &self.state {
            SlotState::Displayed { bitmap, .. } => Some(bitmap),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SlotState::AwaitingRender { .. })
    }

    /// Caption shown under the page, numbered from 1.
    pub fn label(&self) -> Option<String> {
        self.bound_page.map(|page| format!("Page {}", page + 1))
    }

    pub(crate) fn set_width(&mut self, width: u32) {
        self.width = width;
    }

    pub(crate) fn bind(&mut self, page_index: u32) -> u64 {
        self.generation += 1;
        self.bound_page = Some(page_index);
        self.state = SlotState::AwaitingRender { page_index };
        self.generation
    }

    pub(crate) fn unbind(&mut self) {
        self.generation += 1;
        self.bound_page = None;
        self.state = SlotState::Unbound;
    }

    pub(crate) fn is_current(&self, page_index: u32, generation: u64) -> bool {
        self.bound_page == Some(page_index) && self.generation == generation
    }

    pub(crate) fn await_render(&mut self, generation: u64, ticket: RenderTicket) {
        self.pending = Some(PendingRender { page_index: ticket.page_index(), generation, ticket });
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingRender> {
        self.pending.take()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending render if its outcome has arrived.
    pub(crate) fn poll(&mut self) -> Option<(PendingRender, RenderOutcome)> {
        let outcome = self.pending.as_ref()?.ticket.try_outcome()?;
        let pending = self.pending.take()?;
        Some((pending, outcome))
    }

    pub(crate) fn show(&mut self, bitmap: Bitmap) {
        if let Some(page_index) = self.bound_page {
            self.state = SlotState::Displayed { page_index, bitmap };
        }
    }

    pub(crate) fn fail(&mut self, error: PageError) {
        if let Some(page_index) = self.bound_page {
            self.state = SlotState::Failed { page_index, error };
        }
    }
}

impl fmt::Debug for DisplaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplaySlot")
            .field("width", &self.width)
            .field("bound_page", &self.bound_page)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("pending", &self.pending.as_ref().map(|p| p.page_index))
            .finish()
    }
}
