//! # Blockwise Export
//!
//! The serialization engine: HTML, Markdown and email HTML out, HTML in.
//!
//! ## Key Concepts for Learning Rust
//!
//! ### Borrowed Registries
//! - [`Exporter`] and [`Importer`] borrow a `PluginRegistry` for `'r`
//! - They are cheap to build per call and never outlive the registry
//!
//! ### Trait Objects at the Seams
//! - Plugins only see `&dyn InlineRenderer` / `&dyn InlineParser`
//! - [`InlineCodec`] implements both and routes inline elements back to
//!   the inline plugins of the same registry
//!
//! ## Round Trips
//!
//! Block depth and alignment travel as `data-meta-depth` and
//! `data-meta-align` attributes, so `to_html` followed by `from_html`
//! keeps block types, text and layout for every plugin that defines both
//! directions.

pub mod html;
pub mod import;
pub mod inline;
pub mod serialize;

use blockwise_core::CoreError;

pub use html::parse_html;
pub use import::{Importer, from_html};
pub use inline::InlineCodec;
pub use serialize::{Exporter, to_email_html, to_html, to_markdown};

/// Result type for import operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur while importing documents
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Malformed HTML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
