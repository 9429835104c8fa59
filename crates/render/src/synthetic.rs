//! In-memory decoding backend.
//!
//! Serves named documents with a fixed page count and renders blank pages with
//! a thin border, the same placeholder look the default engine uses when no
//! real rasterizer is available. Failure injection, decode delays and a decode
//! gate make it usable for driving the scheduler deterministically, and the
//! [`BackendProbe`] records what the decoder actually did.

use crate::backend::{BackendError, DecoderBackend, DocumentSource, NativeDocument, NativePage};
use crate::bitmap::{PageSize, RgbaImage};
use image::Rgba;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const LETTER: PageSize = PageSize { width: 612, height: 792 };
const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// Counters describing what the backend was asked to do.
#[derive(Debug, Default)]
pub struct BackendProbe {
    decodes: Mutex<HashMap<u32, usize>>,
    decode_started: Condvar,
    open_pages: AtomicUsize,
    max_open_pages: AtomicUsize,
    pages_closed: AtomicUsize,
    documents_opened: AtomicUsize,
    documents_closed: AtomicUsize,
}

impl BackendProbe {
    fn record_decode(&self, page_index: u32) {
        let mut decodes = self.decodes.lock();
        *decodes.entry(page_index).or_insert(0) += 1;
        self.decode_started.notify_all();
    }

    fn page_opened(&self) {
        let open = self.open_pages.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_open_pages.fetch_max(open, Ordering::AcqRel);
    }

    fn page_closed(&self) {
        self.open_pages.fetch_sub(1, Ordering::AcqRel);
        self.pages_closed.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of render calls that reached the backend for `page_index`.
    pub fn decode_count(&self, page_index: u32) -> usize {
        self.decodes.lock().get(&page_index).copied().unwrap_or(0)
    }

    pub fn total_decodes(&self) -> usize {
        self.decodes.lock().values().sum()
    }

    /// Block until at least `count` decodes have started, or `timeout` passes.
    pub fn wait_for_decodes(&self, count: usize, timeout: Duration) -> bool {
        let mut decodes = self.decodes.lock();
        let deadline = std::time::Instant::now() + timeout;
        while decodes.values().sum::<usize>() < count {
            if self.decode_started.wait_until(&mut decodes, deadline).timed_out() {
                return decodes.values().sum::<usize>() >= count;
            }
        }
        true
    }

    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::Acquire)
    }

    /// Highest number of native pages ever open at the same time.
    pub fn max_open_pages(&self) -> usize {
        self.max_open_pages.load(Ordering::Acquire)
    }

    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::Acquire)
    }

    pub fn documents_opened(&self) -> usize {
        self.documents_opened.load(Ordering::Acquire)
    }

    pub fn documents_closed(&self) -> usize {
        self.documents_closed.load(Ordering::Acquire)
    }
}

/// Holds renders until released.
#[derive(Debug, Clone, Default)]
pub struct DecodeGate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl DecodeGate {
    /// A gate that blocks every render until [`DecodeGate::open`] is called.
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, signal) = &*self.state;
        *open.lock() = true;
        signal.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.state.0.lock()
    }

    fn wait(&self) {
        let (open, signal) = &*self.state;
        let mut open = open.lock();
        while !*open {
            signal.wait(&mut open);
        }
    }
}

#[derive(Debug, Clone)]
struct DocumentSpec {
    page_count: u32,
    page_size: PageSize,
    failing_pages: HashSet<u32>,
    failing_close: bool,
}

impl DocumentSpec {
    fn new(page_count: u32) -> Self {
        Self { page_count, page_size: LETTER, failing_pages: HashSet::new(), failing_close: false }
    }
}

/// Backend serving documents registered by path.
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    documents: HashMap<PathBuf, DocumentSpec>,
    probe: Arc<BackendProbe>,
    decode_delay: Duration,
    gate: Option<DecodeGate>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a letter-sized document of `page_count` pages under `path`.
    pub fn with_document(mut self, path: impl Into<PathBuf>, page_count: u32) -> Self {
        self.documents.insert(path.into(), DocumentSpec::new(page_count));
        self
    }

    pub fn with_page_size(mut self, path: impl Into<PathBuf>, size: PageSize) -> Self {
        let path: PathBuf = path.into();
        if let Some(spec) = self.documents.get_mut(&path) {
            spec.page_size = size;
        }
        self
    }

    /// Make every render of `page_index` in `path` fail.
    pub fn with_failing_page(mut self, path: impl Into<PathBuf>, page_index: u32) -> Self {
        let path: PathBuf = path.into();
        if let Some(spec) = self.documents.get_mut(&path) {
            spec.failing_pages.insert(page_index);
        }
        self
    }

    /// Make closing the document at `path` report an error.
    pub fn with_failing_close(mut self, path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        if let Some(spec) = self.documents.get_mut(&path) {
            spec.failing_close = true;
        }
        self
    }

    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    pub fn with_gate(mut self, gate: DecodeGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn probe(&self) -> Arc<BackendProbe> {
        self.probe.clone()
    }
}

impl DecoderBackend for SyntheticBackend {
    type Document = SyntheticDocument;

    fn open(&mut self, source: &DocumentSource) -> Result<SyntheticDocument, BackendError> {
        let path = match source {
            DocumentSource::Path(path) => path,
            DocumentSource::Bytes(_) => {
                return Err(BackendError::new("synthetic backend only serves named documents"))
            }
        };

        let spec = self
            .documents
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("cannot read {}", path.display())))?;

        self.probe.documents_opened.fetch_add(1, Ordering::AcqRel);

        Ok(SyntheticDocument {
            spec,
            probe: self.probe.clone(),
            decode_delay: self.decode_delay,
            gate: self.gate.clone(),
        })
    }
}

pub struct SyntheticDocument {
    spec: DocumentSpec,
    probe: Arc<BackendProbe>,
    decode_delay: Duration,
    gate: Option<DecodeGate>,
}

impl NativeDocument for SyntheticDocument {
    type Page<'a> = SyntheticPage<'a>;

    fn page_count(&self) -> u32 {
        self.spec.page_count
    }

    fn open_page(&mut self, index: u32) -> Result<SyntheticPage<'_>, BackendError> {
        if index >= self.spec.page_count {
            return Err(BackendError::new(format!("no page {index}")));
        }

        self.probe.page_opened();
        Ok(SyntheticPage { index, document: self })
    }

    fn close(self) -> Result<(), BackendError> {
        self.probe.documents_closed.fetch_add(1, Ordering::AcqRel);
        if self.spec.failing_close {
            return Err(BackendError::new("document refused to close"));
        }
        Ok(())
    }
}

pub struct SyntheticPage<'a> {
    index: u32,
    document: &'a SyntheticDocument,
}

impl NativePage for SyntheticPage<'_> {
    fn size(&self) -> PageSize {
        self.document.spec.page_size
    }

    fn render(&mut self, width: u32, height: u32) -> Result<RgbaImage, BackendError> {
        let document = self.document;
        document.probe.record_decode(self.index);

        if let Some(gate) = &document.gate {
            gate.wait();
        }
        if !document.decode_delay.is_zero() {
            thread::sleep(document.decode_delay);
        }

        if document.spec.failing_pages.contains(&self.index) {
            return Err(BackendError::new(format!("corrupt content stream on page {}", self.index)));
        }

        let mut image = RgbaImage::from_pixel(width, height, PAPER);
        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        Ok(image)
    }

    fn close(self) -> Result<(), BackendError> {
        self.document.probe.page_closed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_unknown_document_cannot_be_opened() {
        let mut backend = SyntheticBackend::new().with_document("a.pdf", 1);
        assert!(backend.open(&DocumentSource::from("b.pdf")).is_err());
        assert!(backend.open(&DocumentSource::from(vec![1, 2, 3])).is_err());
        assert!(backend.open(&DocumentSource::from("a.pdf")).is_ok());
    }

    #[test]
    fn test_render_draws_border() {
        let mut backend = SyntheticBackend::new().with_document("a.pdf", 1);
        let mut document = backend.open(&DocumentSource::from("a.pdf")).unwrap();
        let mut page = document.open_page(0).unwrap();

        let image = page.render(10, 10).unwrap();
        page.close().unwrap();

        assert_eq!(*image.get_pixel(0, 0), BORDER);
        assert_eq!(*image.get_pixel(5, 5), PAPER);
    }

    #[test]
    fn test_gate_holds_render_until_opened() {
        let gate = DecodeGate::closed();
        let backend = SyntheticBackend::new().with_document("a.pdf", 1).with_gate(gate.clone());
        let probe = backend.probe();

        let worker = thread::spawn(move || {
            let mut backend = backend;
            let mut document = backend.open(&DocumentSource::from("a.pdf")).unwrap();
            let mut page = document.open_page(0).unwrap();
            let image = page.render(8, 8);
            page.close().unwrap();
            image.is_ok()
        });

        assert!(probe.wait_for_decodes(1, Duration::from_secs(5)));
        assert!(!gate.is_open());
        gate.open();

        assert!(worker.join().unwrap());
        assert_eq!(probe.open_pages(), 0);
    }

    #[test]
    fn test_wait_for_decodes_times_out() {
        let probe = BackendProbe::default();
        let started = Instant::now();
        assert!(!probe.wait_for_decodes(1, Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
