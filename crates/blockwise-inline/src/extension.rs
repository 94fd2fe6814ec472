//! Per-block-type behaviour layered over the inline engine.
//!
//! Plugins contribute extensions to teach the engine about their elements:
//! which ones render inline, which ones hold no text, and how to repair a
//! node after an edit.

use crate::document::InlineDocument;
use crate::node::Element;

/// Extra behaviour a plugin wraps around an [`InlineDocument`].
pub trait InlineExtension: Send + Sync {
    /// Stable identifier, used in debug output.
    fn id(&self) -> &str;

    /// Treat `element` as inline even if its props say otherwise.
    fn is_inline(&self, _element: &Element) -> bool {
        false
    }

    /// Treat `element` as void even if its props say otherwise.
    fn is_void(&self, _element: &Element) -> bool {
        false
    }

    /// Repairs the element at `path` after the built-in rules ran.
    ///
    /// Returns true if the document changed; the engine keeps calling
    /// extensions until none of them reports a change.
    fn normalize_node(&self, _doc: &mut InlineDocument, _path: &[usize]) -> bool {
        false
    }
}
