//! # Blockwise Inline
//!
//! The rich-text engine that lives inside a single block.
//!
//! ## Key Concepts for Learning Rust
//!
//! ### Ownership & Borrowing
//! - `InlineDocument` owns its element tree outright
//! - Nodes are addressed by index paths, never by references into the tree
//! - Edits take `&mut self`, so no reader can observe a half-applied edit
//!
//! ### Trait Objects
//! - Plugins extend the engine through `Arc<dyn InlineExtension>`
//! - `Send + Sync` bounds let documents move between threads with the editor

mod document;
mod extension;
mod node;
mod point;
mod selection;

pub use document::{InlineDocument, element_at, element_at_mut, leaf_at};
pub use extension::InlineExtension;
pub use node::{
    Descendant, Element, Marks, NODE_TYPE_PROP, NodeType, Props, Text, generate_id, roots_text,
};
pub use point::{NodePath, Point, is_ancestor, parent};
pub use selection::{Range, SelectionDirection};

/// Result type for inline operations
pub type InlineResult<T> = Result<T, InlineError>;

/// Errors that can occur while editing an inline document
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InlineError {
    #[error("No node at path {0:?}")]
    InvalidPath(NodePath),

    #[error("Point {0} does not address a text position")]
    InvalidPoint(Point),

    #[error("Document has no selection")]
    NoSelection,
}
