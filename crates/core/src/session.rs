//! Viewer session state

use pdf_reader_render::DocumentInfo;

/// Message shown when an open failure carries no text of its own.
pub const DEFAULT_OPEN_ERROR: &str = "Failed to load PDF";

/// Whole-document state of the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewerState {
    /// No document.
    #[default]
    Idle,
    /// A document is being opened.
    Loading,
    Loaded(DocumentInfo),
    /// The last open failed. Another document can still be opened.
    Error { message: String },
}

impl ViewerState {
    pub(crate) fn error(message: &str) -> Self {
        let message = if message.trim().is_empty() { DEFAULT_OPEN_ERROR } else { message };
        ViewerState::Error { message: message.to_owned() }
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        match self {
            ViewerState::Loaded(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ViewerState::Loaded(_))
    }

    pub fn page_count(&self) -> u32 {
        self.document().map_or(0, |info| info.page_count)
    }
}
