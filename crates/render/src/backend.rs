//! Decoding backend seam.
//!
//! A backend opens documents; a document opens pages; a page renders into an
//! RGBA raster. `NativeDocument::open_page` borrows the document mutably, so a
//! document can never have two native pages open at once.

use crate::bitmap::{PageSize, RgbaImage};
use std::path::{Path, PathBuf};

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl DocumentSource {
    /// Display title: the file name for paths, a generic title otherwise.
    pub fn title(&self) -> String {
        match self {
            DocumentSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "PDF Document".to_owned()),
            DocumentSource::Bytes(_) => "PDF Document".to_owned(),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for DocumentSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<&str> for DocumentSource {
    fn from(value: &str) -> Self {
        Self::Path(PathBuf::from(value))
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Failure reported by a backend. Backends are opaque, so only the message
/// survives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub trait DecoderBackend {
    type Document: NativeDocument;

    fn open(&mut self, source: &DocumentSource) -> Result<Self::Document, BackendError>;
}

pub trait NativeDocument {
    type Page<'a>: NativePage
    where
        Self: 'a;

    fn page_count(&self) -> u32;

    fn open_page(&mut self, index: u32) -> Result<Self::Page<'_>, BackendError>;

    fn close(self) -> Result<(), BackendError>
    where
        Self: Sized;
}

pub trait NativePage {
    /// Natural page size at 1:1 scale.
    fn size(&self) -> PageSize;

    fn render(&mut self, width: u32, height: u32) -> Result<RgbaImage, BackendError>;

    fn close(self) -> Result<(), BackendError>
    where
        Self: Sized;
}

/// Cooperative cancellation checkpoint used between native calls.
pub trait CancelCheck {
    fn is_cancelled(&self) -> bool;
}

/// Checkpoint that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelCheck for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}
