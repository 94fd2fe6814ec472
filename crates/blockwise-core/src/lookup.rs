//! Finding the block that holds the native text selection.
//!
//! Hosts with a real DOM or terminal selection know better than the editor
//! which block the caret is in, so the lookup is a collaborator injected at
//! construction time rather than something the editor works out alone.

use crate::block::BlockId;
use crate::editor::Editor;

/// Resolves the block that owns the user's current text selection.
pub trait SelectionLookup: Send + Sync {
    fn block_with_selection(&self, editor: &Editor) -> Option<BlockId>;
}

/// Default lookup: the block whose inline document holds a selection,
/// falling back to the focused block.
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusedBlockLookup;

impl SelectionLookup for FocusedBlockLookup {
    fn block_with_selection(&self, editor: &Editor) -> Option<BlockId> {
        editor
            .inline_documents()
            .find(|(_, doc)| doc.selection().is_some())
            .map(|(id, _)| id.clone())
            .or_else(|| editor.current_block().map(|block| block.id.clone()))
    }
}
