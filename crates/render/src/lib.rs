//! PDF Reader Render Library
//!
//! Page decoding for the scrolling page list: a single-document decoder handle
//! that opens one native page at a time, on top of a pluggable backend.

pub mod backend;
pub mod bitmap;
pub mod handle;
pub mod pdfium;
pub mod synthetic;

pub use backend::{
    BackendError, CancelCheck, DecoderBackend, DocumentSource, NativeDocument, NativePage,
    NeverCancel,
};
pub use bitmap::{Bitmap, PageSize, RgbaImage};
pub use handle::{DecoderError, DocumentInfo, ErrorKind, PageDecoder};
pub use pdfium::{PdfiumBackend, PdfiumDocument, PdfiumPage};
pub use synthetic::{BackendProbe, DecodeGate, SyntheticBackend};
