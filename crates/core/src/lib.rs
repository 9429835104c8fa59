//! PDF Reader Core Library
//!
//! The scrolling page list of the reader: display slots bound to pages,
//! backed by a bounded page cache and a deduplicating render scheduler.
//!
//! # Example
//!
//! ```
//! use pdf_reader_core::{PageListController, ReaderConfig, SlotState};
//! use pdf_reader_render::SyntheticBackend;
//! use std::time::Duration;
//!
//! let backend = SyntheticBackend::new().with_document("guide.pdf", 10);
//! let config = ReaderConfig::default().with_fallback_render_width(0);
//! let mut list = PageListController::new(config, move || Ok(backend)).unwrap();
//! list.open_document("guide.pdf").unwrap();
//!
//! let slot = list.add_slot(120);
//! list.bind(slot, 3).unwrap();
//! assert!(list.pump_until_idle(Duration::from_secs(5)));
//!
//! let state = list.slot(slot).unwrap().state();
//! assert!(matches!(state, SlotState::Displayed { page_index: 3, .. }));
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod session;
pub mod slot;

pub use config::{ConfigError, ReaderConfig};
pub use controller::{ErrorCallback, PageListController};
pub use error::{ControllerError, PageError};
pub use session::ViewerState;
pub use slot::{DisplaySlot, SlotId, SlotState};
