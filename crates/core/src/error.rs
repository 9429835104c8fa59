//! Error types for the page list

use crate::config::ConfigError;
use crate::slot::SlotId;
use pdf_reader_render::ErrorKind;
use pdf_reader_scheduler::RenderError;
use std::io;

/// A page that could not be shown, as reported to the error callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("page {page_index}: {message}")]
pub struct PageError {
    pub page_index: u32,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<RenderError> for PageError {
    fn from(err: RenderError) -> Self {
        Self { page_index: err.page_index, kind: err.kind, message: err.message }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("failed to open document: {0}")]
    Open(RenderError),
    #[error("failed to start render lane: {0}")]
    Spawn(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown display slot {0}")]
    UnknownSlot(SlotId),
}
