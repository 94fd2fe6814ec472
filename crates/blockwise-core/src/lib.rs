//! # Blockwise Core
//!
//! Block-structured document editing: the block store, the cross-block
//! path and selection state, the plugin registry and the command layer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         Editor                          │
//! │  ┌────────────────┐ ┌──────────┐ ┌───────────────────┐  │
//! │  │ PluginRegistry │ │  Config  │ │ Commands / Keymap │  │
//! │  └────────────────┘ └──────────┘ └───────────────────┘  │
//! │                batch_operations (staging)               │
//! │  ┌───────────────────────────────────────────────────┐  │
//! │  │ ContentStore: BlockId -> Block { value, meta }    │  │
//! │  │ one InlineDocument per block                      │  │
//! │  └───────────────────────────────────────────────────┘  │
//! │                         commit                          │
//! │  ┌──────────────┐ ┌──────────┐ ┌──────────┐             │
//! │  │ Path (focus) │ │ History  │ │ EventBus │             │
//! │  └──────────────┘ └──────────┘ └──────────┘             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Learning: Module Organization
//!
//! `Editor` is defined in `editor.rs`, but its path and batch methods live
//! in `path.rs` and `batch.rs`. Rust allows several `impl Editor` blocks
//! across modules of the same crate, which keeps each file about one concern.

pub mod batch;
pub mod block;
pub mod command;
pub mod config;
pub mod content;
pub mod editor;
pub mod event;
pub mod history;
pub mod keymap;
pub mod lookup;
pub mod ops;
pub mod parsers;
pub mod path;
pub mod plugin;
pub mod registry;
pub mod schema;

pub use block::{Align, Block, BlockData, BlockId, BlockMeta, BlockPatch};
pub use command::{Command, CommandSpec};
pub use config::{Config, ConfigError, LoadPolicy};
pub use content::ContentStore;
pub use editor::{DepthChange, Editor};
pub use event::{ChangeSet, EditorEvent, EventBus, EventHandler};
pub use history::History;
pub use keymap::{Key, KeyCombo, KeyEvent, KeyOutcome, Keymap, Modifiers};
pub use lookup::{FocusedBlockLookup, SelectionLookup};
pub use ops::BlockOp;
pub use parsers::{Format, HtmlDeserializer, HtmlElement, HtmlNode, ParsedBlock, Parsers};
pub use path::{InlineTarget, Path, PathSource, SelectedInput};
pub use plugin::{Plugin, PluginOverrides, PluginRole};
pub use registry::PluginRegistry;
pub use schema::{ConfigurationError, ElementDef, ElementSchema, ValidationError};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// What a failed lookup was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    Block(BlockId),
    Order(usize),
    /// The focused block (`path.current`)
    Current,
    /// The block holding the native text selection
    Selection,
}

impl std::fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupTarget::Block(id) => write!(f, "block {}", id),
            LookupTarget::Order(order) => write!(f, "block at order {}", order),
            LookupTarget::Current => write!(f, "focused block"),
            LookupTarget::Selection => write!(f, "block with selection"),
        }
    }
}

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Block type not found: {0}")]
    BlockTypeNotFound(String),

    #[error("Nothing found for {0}")]
    LookupMiss(LookupTarget),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Inline error: {0}")]
    Inline(#[from] blockwise_inline::InlineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl CoreError {
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, CoreError::LookupMiss(_))
    }
}

/// Opt-in adapter for callers that treat a missing target as "nothing to do".
pub trait ResultExt<T> {
    /// Maps [`CoreError::LookupMiss`] to `Ok(None)`.
    fn ignore_miss(self) -> CoreResult<Option<T>>;
}

impl<T> ResultExt<T> for CoreResult<T> {
    fn ignore_miss(self) -> CoreResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(CoreError::LookupMiss(target)) => {
                tracing::trace!(%target, "Lookup miss ignored");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_miss() {
        let hit: CoreResult<u8> = Ok(1);
        assert_eq!(hit.ignore_miss().unwrap(), Some(1));

        let miss: CoreResult<u8> = Err(CoreError::LookupMiss(LookupTarget::Order(4)));
        assert_eq!(miss.ignore_miss().unwrap(), None);

        let other: CoreResult<u8> = Err(CoreError::BlockTypeNotFound("Nope".into()));
        assert!(matches!(
            other.ignore_miss(),
            Err(CoreError::BlockTypeNotFound(_))
        ));
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::LookupMiss(LookupTarget::Block(BlockId::from("b7")));
        assert_eq!(err.to_string(), "Nothing found for block b7");
        assert!(err.is_lookup_miss());
    }
}
