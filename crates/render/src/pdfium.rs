//! PDFium decoding backend
//!
//! Provides the production backend on top of `pdfium-render`.

use crate::backend::{BackendError, DecoderBackend, DocumentSource, NativeDocument, NativePage};
use crate::bitmap::{PageSize, RgbaImage};
use log::debug;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Process-wide PDFium binding, shared by every backend.
static PDFIUM: OnceLock<Pdfium> = OnceLock::new();

/// Backend bound to a PDFium shared library.
///
/// The library binding lives for the rest of the process, which lets opened
/// documents borrow it for `'static`.
pub struct PdfiumBackend {
    pdfium: &'static Pdfium,
}

impl PdfiumBackend {
    /// Bind PDFium, loading the library on first use.
    ///
    /// Search order:
    /// 1. `library_dir`, when given
    /// 2. Executable's directory (for app bundles: .app/Contents/MacOS/)
    /// 3. Current working directory
    /// 4. System library paths
    ///
    /// Once loaded the library is reused, and later `library_dir` values are
    /// ignored.
    pub fn bind(library_dir: Option<&Path>) -> Result<Self, BackendError> {
        if let Some(pdfium) = PDFIUM.get() {
            return Ok(Self { pdfium });
        }

        let pdfium = Self::bind_library(library_dir)?;
        // A concurrent bind may have won; its binding is kept and ours dropped.
        let _ = PDFIUM.set(pdfium);
        PDFIUM
            .get()
            .map(|pdfium| Self { pdfium })
            .ok_or_else(|| BackendError::new("pdfium binding unavailable"))
    }

    fn bind_library(library_dir: Option<&Path>) -> Result<Pdfium, BackendError> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = library_dir {
            candidates.push(dir.to_path_buf());
        }
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(dir);
        }
        candidates.push(PathBuf::from("./"));

        for dir in &candidates {
            match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
                Ok(bindings) => {
                    debug!("bound pdfium from {}", dir.display());
                    return Ok(Pdfium::new(bindings));
                }
                Err(err) => debug!("pdfium not found in {}: {err}", dir.display()),
            }
        }

        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|err| BackendError::new(format!("failed to bind pdfium library: {err}")))
    }
}

impl DecoderBackend for PdfiumBackend {
    type Document = PdfiumDocument;

    fn open(&mut self, source: &DocumentSource) -> Result<PdfiumDocument, BackendError> {
        let pdfium = self.pdfium;
        let document = match source {
            DocumentSource::Path(path) => pdfium.load_pdf_from_file(path, None),
            DocumentSource::Bytes(bytes) => pdfium.load_pdf_from_byte_vec(bytes.clone(), None),
        }
        .map_err(|err| BackendError::new(err.to_string()))?;

        Ok(PdfiumDocument { document })
    }
}

pub struct PdfiumDocument {
    document: PdfDocument<'static>,
}

impl NativeDocument for PdfiumDocument {
    type Page<'a> = PdfiumPage<'a>;

    fn page_count(&self) -> u32 {
        self.document.pages().len() as u32
    }

    fn open_page(&mut self, index: u32) -> Result<PdfiumPage<'_>, BackendError> {
        let index = u16::try_from(index)
            .map_err(|_| BackendError::new(format!("page index {index} exceeds pdfium range")))?;
        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|err| BackendError::new(err.to_string()))?;

        Ok(PdfiumPage { page })
    }

    fn close(self) -> Result<(), BackendError> {
        drop(self.document);
        Ok(())
    }
}

/// An open PDFium page; the native page is released when this is closed.
pub struct PdfiumPage<'a> {
    page: PdfPage<'a>,
}

impl NativePage for PdfiumPage<'_> {
    fn size(&self) -> PageSize {
        PageSize::new(
            self.page.width().value.round().max(0.0) as u32,
            self.page.height().value.round().max(0.0) as u32,
        )
    }

    fn render(&mut self, width: u32, height: u32) -> Result<RgbaImage, BackendError> {
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = self
            .page
            .render_with_config(&config)
            .map_err(|err| BackendError::new(err.to_string()))?;

        let rendered_width = bitmap.width().max(0) as u32;
        let rendered_height = bitmap.height().max(0) as u32;

        RgbaImage::from_raw(rendered_width, rendered_height, bitmap.as_rgba_bytes().to_vec())
            .ok_or_else(|| {
                BackendError::new(format!(
                    "pdfium returned a short buffer for {rendered_width}x{rendered_height}"
                ))
            })
    }

    fn close(self) -> Result<(), BackendError> {
        drop(self.page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_reuses_process_binding() {
        // Needs a PDFium library on the search path.
        let Ok(first) = PdfiumBackend::bind(None) else {
            return;
        };
        let second = PdfiumBackend::bind(Some(Path::new("/nonexistent"))).unwrap();
        assert!(std::ptr::eq(first.pdfium, second.pdfium));
    }
}
