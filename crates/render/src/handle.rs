//! Page decoder handle
//!
//! Wraps the single open document of a viewer. Every render opens the native
//! page, renders it and closes it again, so at most one page object is ever
//! open. The handle is not meant to be shared; the render scheduler owns it on
//! its decode lane.

use crate::backend::{
    CancelCheck, DecoderBackend, DocumentSource, NativeDocument, NativePage, NeverCancel,
};
use crate::bitmap::{Bitmap, PageSize};
use log::{debug, info, warn};
use std::fmt;

/// Metadata probed when a document is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: String,
    pub page_count: u32,
    /// Natural size of page 0.
    pub first_page: PageSize,
}

/// Error class reported to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Document could not be opened; fatal to the session.
    Open,
    /// A single page failed to decode.
    Decode,
    /// Page index outside the document.
    Index,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Open => write!(f, "open"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecoderError {
    #[error("failed to open document: {0}")]
    Open(String),
    #[error("no document is open")]
    NotOpen,
    #[error("page {index} out of range (page_count={page_count})")]
    IndexOutOfRange { index: u32, page_count: u32 },
    #[error("failed to render page {index}: {message}")]
    Decode { index: u32, message: String },
    #[error("invalid render size {width}x{height} for page {index}")]
    InvalidSize { index: u32, width: u32, height: u32 },
    #[error("render of page {index} was cancelled")]
    Cancelled { index: u32 },
}

impl DecoderError {
    /// Error class for reporting. Cancellation is not a failure and has none.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DecoderError::Open(_) | DecoderError::NotOpen => Some(ErrorKind::Open),
            DecoderError::IndexOutOfRange { .. } => Some(ErrorKind::Index),
            DecoderError::Decode { .. } | DecoderError::InvalidSize { .. } => {
                Some(ErrorKind::Decode)
            }
            DecoderError::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecoderError::Cancelled { .. })
    }
}

struct OpenDocument<D> {
    native: D,
    info: DocumentInfo,
}

/// Exclusive owner of one open document.
pub struct PageDecoder<B: DecoderBackend> {
    backend: B,
    document: Option<OpenDocument<B::Document>>,
}

impl<B: DecoderBackend> PageDecoder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, document: None }
    }

    /// Open `source`, closing whatever was open before.
    ///
    /// Fails with [`DecoderError::Open`] if the backend cannot read the source
    /// or the document has no pages.
    pub fn open(&mut self, source: &DocumentSource) -> Result<DocumentInfo, DecoderError> {
        self.close();

        let mut native =
            self.backend.open(source).map_err(|err| DecoderError::Open(err.to_string()))?;

        match Self::probe(&mut native, source) {
            Ok(info) => {
                info!(
                    "opened document {} ({} pages, first page {}x{})",
                    info.title, info.page_count, info.first_page.width, info.first_page.height
                );
                self.document = Some(OpenDocument { native, info: info.clone() });
                Ok(info)
            }
            Err(err) => {
                if let Err(close_err) = native.close() {
                    warn!("failed to release rejected document: {close_err}");
                }
                Err(err)
            }
        }
    }

    fn probe(
        native: &mut B::Document,
        source: &DocumentSource,
    ) -> Result<DocumentInfo, DecoderError> {
        let page_count = native.page_count();
        if page_count == 0 {
            return Err(DecoderError::Open("document has no pages".to_owned()));
        }

        let page = native
            .open_page(0)
            .map_err(|err| DecoderError::Open(format!("failed to probe first page: {err}")))?;
        let first_page = page.size();
        if let Err(err) = page.close() {
            warn!("failed to close probed page 0: {err}");
        }

        Ok(DocumentInfo { title: source.title(), page_count, first_page })
    }

    /// Render page `index` into a `width` x `height` raster.
    pub fn render_page(
        &mut self,
        index: u32,
        width: u32,
        height: u32,
    ) -> Result<Bitmap, DecoderError> {
        self.render_page_cancellable(index, width, height, &NeverCancel)
    }

    /// Render with cancellation checkpoints before the page is opened, between
    /// opening and rendering, and after rendering. The native page is closed
    /// on every path.
    pub fn render_page_cancellable(
        &mut self,
        index: u32,
        width: u32,
        height: u32,
        cancel: &dyn CancelCheck,
    ) -> Result<Bitmap, DecoderError> {
        let document = self.document.as_mut().ok_or(DecoderError::NotOpen)?;

        let page_count = document.info.page_count;
        if index >= page_count {
            return Err(DecoderError::IndexOutOfRange { index, page_count });
        }
        if width == 0 || height == 0 {
            return Err(DecoderError::InvalidSize { index, width, height });
        }
        if cancel.is_cancelled() {
            return Err(DecoderError::Cancelled { index });
        }

        let mut page = document
            .native
            .open_page(index)
            .map_err(|err| DecoderError::Decode { index, message: err.to_string() })?;

        let rendered = if cancel.is_cancelled() {
            Err(DecoderError::Cancelled { index })
        } else {
            page.render(width, height)
                .map_err(|err| DecoderError::Decode { index, message: err.to_string() })
        };

        if let Err(err) = page.close() {
            warn!("failed to close page {index}: {err}");
        }

        let image = rendered?;
        if cancel.is_cancelled() {
            return Err(DecoderError::Cancelled { index });
        }

        debug!("decoded page {index} at {width}x{height}");
        Ok(Bitmap::new(index, image))
    }

    /// Release the open document, if any. Never fails; cleanup errors are
    /// logged.
    pub fn close(&mut self) {
        if let Some(document) = self.document.take() {
            let title = document.info.title;
            match document.native.close() {
                Ok(()) => info!("closed document {title}"),
                Err(err) => warn!("failed to close document {title}: {err}"),
            }
        }
    }

    /// Number of pages, 0 when nothing is open.
    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |document| document.info.page_count)
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn info(&self) -> Option<&DocumentInfo> {
        self.document.as_ref().map(|document| &document.info)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: DecoderBackend> Drop for PageDecoder<B> {
    fn drop(&mut self) {
        self.close();
    }
}
