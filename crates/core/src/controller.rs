//! Page list controller
//!
//! Binds recycled display slots to pages. A bind checks the page cache
//! first and otherwise asks the render scheduler for the page; finished
//! renders are applied in [`PageListController::pump`], and only to slots
//! still bound to the page at the same generation.

use crate::config::ReaderConfig;
use crate::error::{ControllerError, PageError};
use crate::session::ViewerState;
use crate::slot::{DisplaySlot, SlotId};
use log::{debug, info, warn};
use pdf_reader_cache::PageCache;
use pdf_reader_render::{
    BackendError, DecoderBackend, DocumentInfo, DocumentSource, PdfiumBackend,
};
use pdf_reader_scheduler::{PageRequest, RenderOutcome, RenderScheduler};
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

/// Receives every page that failed to render, once per failure.
pub type ErrorCallback = Box<dyn FnMut(&PageError) + Send>;

const PUMP_INTERVAL: Duration = Duration::from_millis(1);

pub struct PageListController {
    config: ReaderConfig,
    scheduler: RenderScheduler,
    slots: BTreeMap<SlotId, DisplaySlot>,
    next_slot_id: u64,
    state: ViewerState,
    on_error: Option<ErrorCallback>,
}

impl PageListController {
    /// Create a controller whose decode lane builds its backend with
    /// `factory`.
    pub fn new<B, F>(config: ReaderConfig, factory: F) -> Result<Self, ControllerError>
    where
        B: DecoderBackend + 'static,
        F: FnOnce() -> Result<B, BackendError> + Send + 'static,
    {
        config.validate()?;
        let scheduler = RenderScheduler::new(factory, PageCache::new(config.max_cached_pages))?;

        Ok(Self {
            config,
            scheduler,
            slots: BTreeMap::new(),
            next_slot_id: 0,
            state: ViewerState::Idle,
            on_error: None,
        })
    }

    /// Create a controller rendering through PDFium.
    pub fn with_pdfium(config: ReaderConfig) -> Result<Self, ControllerError> {
        let library_dir = config.pdfium_library_dir.clone();
        Self::new(config, move || PdfiumBackend::bind(library_dir.as_deref()))
    }

    pub fn set_error_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&PageError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
    }

    /// Open a document, replacing the current one.
    ///
    /// All slots are unbound. On failure the session moves to
    /// [`ViewerState::Error`]; opening another document is still allowed.
    pub fn open_document(
        &mut self,
        source: impl Into<DocumentSource>,
    ) -> Result<DocumentInfo, ControllerError> {
        let source = source.into();
        info!("opening {}", source.title());
        self.state = ViewerState::Loading;
        self.release_slots();

        match self.scheduler.open(source) {
            Ok(info) => {
                self.state = ViewerState::Loaded(info.clone());
                Ok(info)
            }
            Err(err) => {
                self.state = ViewerState::error(&err.message);
                Err(ControllerError::Open(err))
            }
        }
    }

    pub fn add_slot(&mut self, width: u32) -> SlotId {
        let id = SlotId::new(self.next_slot_id);
        self.next_slot_id += 1;
        self.slots.insert(id, DisplaySlot::new(width));
        id
    }

    /// Change a slot's width. Takes effect on its next render request.
    pub fn resize_slot(&mut self, slot_id: SlotId, width: u32) -> Result<(), ControllerError> {
        self.slot_mut(slot_id)?.set_width(width);
        Ok(())
    }

    pub fn remove_slot(&mut self, slot_id: SlotId) -> Result<(), ControllerError> {
        self.unbind(slot_id)?;
        self.slots.remove(&slot_id);
        Ok(())
    }

    /// Bind a slot to a page.
    ///
    /// Cached pages show at once; otherwise the slot shows its loading state
    /// until [`pump`](Self::pump) delivers the render. The previous binding's
    /// interest is withdrawn.
    pub fn bind(&mut self, slot_id: SlotId, page_index: u32) -> Result<(), ControllerError> {
        let slot = self.slots.get_mut(&slot_id).ok_or(ControllerError::UnknownSlot(slot_id))?;
        if let Some(pending) = slot.take_pending() {
            self.scheduler.cancel(pending.page_index, pending.ticket.waiter());
        }

        let generation = slot.bind(page_index);
        self.scheduler.set_viewport(page_index);

        if let Some(bitmap) = self.scheduler.cache().get(page_index) {
            debug!("{slot_id} shows cached page {page_index}");
            slot.show(bitmap);
            return Ok(());
        }

        let size = self.config.target_size(slot.width());
        let ticket = self.scheduler.request(PageRequest::new(page_index, size.width, size.height));
        slot.await_render(generation, ticket);
        Ok(())
    }

    /// Detach a slot from its page. A decode other slots still wait for
    /// keeps running.
    pub fn unbind(&mut self, slot_id: SlotId) -> Result<(), ControllerError> {
        let slot = self.slots.get_mut(&slot_id).ok_or(ControllerError::UnknownSlot(slot_id))?;
        if let Some(pending) = slot.take_pending() {
            self.scheduler.cancel(pending.page_index, pending.ticket.waiter());
        }
        slot.unbind();
        Ok(())
    }

    /// Apply finished renders to their slots. Returns how many slots changed.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        let mut failures = Vec::new();

        for (slot_id, slot) in self.slots.iter_mut() {
            let Some((pending, outcome)) = slot.poll() else {
                continue;
            };
            if !slot.is_current(pending.page_index, pending.generation) {
                debug!("{slot_id} dropped stale result for page {}", pending.page_index);
                continue;
            }

            match outcome {
                RenderOutcome::Rendered(bitmap) => {
                    slot.show(bitmap);
                    applied += 1;
                }
                RenderOutcome::Failed(err) => {
                    let error = PageError::from(err);
                    slot.fail(error.clone());
                    failures.push(error);
                    applied += 1;
                }
                RenderOutcome::Cancelled => {
                    // Still bound to the page, so it still needs a bitmap.
                    debug!("{slot_id} re-requests cancelled page {}", pending.page_index);
                    if let Some(bitmap) = self.scheduler.cache().get(pending.page_index) {
                        slot.show(bitmap);
                        applied += 1;
                        continue;
                    }
                    let size = self.config.target_size(slot.width());
                    let request = PageRequest::new(pending.page_index, size.width, size.height);
                    slot.await_render(pending.generation, self.scheduler.request(request));
                }
            }
        }

        for error in &failures {
            self.report(error);
        }
        applied
    }

    /// Pump until no slot waits for a render. Returns `false` on timeout.
    pub fn pump_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.pending_slots() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(PUMP_INTERVAL);
        }
    }

    /// Move the viewport used to decide which cached pages to evict.
    pub fn scroll_to(&mut self, position: u32) {
        self.scheduler.set_viewport(position);
    }

    /// Cancel everything, drop cached pages and close the document.
    pub fn shutdown(&mut self) {
        self.release_slots();
        self.scheduler.close();
        self.state = ViewerState::Idle;
        info!("page list shut down");
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn slot(&self, slot_id: SlotId) -> Option<&DisplaySlot> {
        self.slots.get(&slot_id)
    }

    pub fn slot_ids(&self) -> Vec<SlotId> {
        self.slots.keys().copied().collect()
    }

    /// Number of slots waiting for a render.
    pub fn pending_slots(&self) -> usize {
        self.slots.values().filter(|slot| slot.has_pending()).count()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn cache(&self) -> &PageCache {
        self.scheduler.cache()
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    fn slot_mut(&mut self, slot_id: SlotId) -> Result<&mut DisplaySlot, ControllerError> {
        self.slots.get_mut(&slot_id).ok_or(ControllerError::UnknownSlot(slot_id))
    }

    fn release_slots(&mut self) {
        for slot in self.slots.values_mut() {
            if let Some(pending) = slot.take_pending() {
                self.scheduler.cancel(pending.page_index, pending.ticket.waiter());
            }
            if slot.bound_page().is_some() {
                slot.unbind();
            }
        }
    }

    fn report(&mut self, error: &PageError) {
        warn!("page {} failed ({}): {}", error.page_index, error.kind, error.message);
        if let Some(callback) = self.on_error.as_mut() {
            callback(error);
        }
    }
}
