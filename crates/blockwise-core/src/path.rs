//! Cross-block focus and selection.
//!
//! ## Learning: One Writer per Fact
//!
//! The text selection lives in two places: the inline document that owns
//! the caret, and `Path::selection` which observers read. The only method
//! that writes it, [`Editor::set_inline_selection`], updates both in the
//! same call, so they cannot drift apart.

use blockwise_inline::{InlineDocument, Point, Range};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::BlockId;
use crate::editor::Editor;
use crate::{CoreError, CoreResult, LookupTarget};

/// What caused the last path change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathSource {
    SelectionBox,
    NativeSelection,
    Mousemove,
    Keyboard,
    CopyPaste,
}

/// Focus and selection state across blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Order of the focused block
    pub current: Option<usize>,
    /// Orders of blocks selected as a whole; never empty
    pub selected: Option<Vec<usize>>,
    /// Text selection inside the focused block
    pub selection: Option<Range>,
    pub source: Option<PathSource>,
}

impl Path {
    /// True when no block is focused, whatever the block selection holds.
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Drops indices that no longer address a block.
    pub(crate) fn clamp(&mut self, len: usize) {
        if self.current.is_some_and(|current| current >= len) {
            self.current = len.checked_sub(1);
        }
        if let Some(selected) = self.selected.as_mut() {
            selected.retain(|order| *order < len);
        }
        if self.selected.as_ref().is_some_and(|s| s.is_empty()) {
            self.selected = None;
        }
    }
}

/// Input accepted by [`Editor::set_selected`].
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedInput {
    One(usize),
    Many(Vec<usize>),
    Clear,
}

impl SelectedInput {
    /// Reads a JSON scalar or array, keeping only non-negative integers.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map_or(SelectedInput::Clear, |n| SelectedInput::One(n as usize)),
            Value::Array(items) => SelectedInput::Many(
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|n| n as usize)
                    .collect(),
            ),
            _ => SelectedInput::Clear,
        }
    }
}

impl From<usize> for SelectedInput {
    fn from(value: usize) -> Self {
        SelectedInput::One(value)
    }
}

impl From<Vec<usize>> for SelectedInput {
    fn from(value: Vec<usize>) -> Self {
        SelectedInput::Many(value)
    }
}

impl From<Option<usize>> for SelectedInput {
    fn from(value: Option<usize>) -> Self {
        value.map_or(SelectedInput::Clear, SelectedInput::One)
    }
}

/// Which block's inline document an accessor should use.
///
/// Resolution order: explicit block id, then explicit order, then the
/// injected native-selection lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineTarget {
    pub block_id: Option<BlockId>,
    pub at: Option<usize>,
}

impl InlineTarget {
    pub fn block(id: impl Into<BlockId>) -> Self {
        Self {
            block_id: Some(id.into()),
            at: None,
        }
    }

    pub fn at(order: usize) -> Self {
        Self {
            block_id: None,
            at: Some(order),
        }
    }

    /// Whatever block holds the native selection.
    pub fn native() -> Self {
        Self::default()
    }
}

impl Editor {
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ==================== Focus ====================

    /// Returns `at` if given, else the focused order.
    pub fn get_current(&self, at: Option<usize>) -> Option<usize> {
        at.or(self.path.current)
    }

    /// Focuses the block at `at`, or clears focus with `None`.
    pub fn set_current(&mut self, at: Option<usize>, source: Option<PathSource>) -> CoreResult<()> {
        if let Some(order) = at {
            if order >= self.content().len() {
                return Err(CoreError::LookupMiss(LookupTarget::Order(order)));
            }
        }
        self.path.current = at;
        self.path.source = source.or(self.path.source);
        self.path_changed();
        Ok(())
    }

    /// Order after `at` (or the focused block), without an upper bound.
    pub fn get_next(&self, at: Option<usize>) -> Option<usize> {
        self.get_current(at).map(|order| order + 1)
    }

    /// Order before `at` (or the focused block); `None` at the first block.
    pub fn get_previous(&self, at: Option<usize>) -> Option<usize> {
        self.get_current(at).and_then(|order| order.checked_sub(1))
    }

    pub fn is_path_empty(&self) -> bool {
        self.path.is_empty()
    }

    // ==================== Block Selection ====================

    pub fn get_selected(&self) -> Option<&[usize]> {
        self.path.selected.as_deref()
    }

    /// Returns true if the block at `at` is in the block selection.
    pub fn get_selected_at(&self, at: usize) -> bool {
        self.get_selected()
            .is_some_and(|selected| selected.contains(&at))
    }

    /// Like [`get_selected_at`](Self::get_selected_at), defaulting to the
    /// focused block.
    pub fn is_block_selected(&self, at: Option<usize>) -> bool {
        self.get_current(at)
            .is_some_and(|order| self.get_selected_at(order))
    }

    /// Replaces the block selection.
    ///
    /// Orders are stored as given, minus those outside the document; an
    /// empty result clears the selection.
    pub fn set_selected(&mut self, input: impl Into<SelectedInput>, source: Option<PathSource>) {
        let len = self.content().len();
        let mut orders = match input.into() {
            SelectedInput::One(order) => vec![order],
            SelectedInput::Many(orders) => orders,
            SelectedInput::Clear => Vec::new(),
        };
        orders.retain(|order| *order < len);

        self.path.selected = (!orders.is_empty()).then_some(orders);
        self.path.source = source.or(self.path.source);
        self.path_changed();
    }

    // ==================== Inline Selection ====================

    /// Resolves which block an inline accessor refers to.
    pub fn resolve_inline(&self, target: &InlineTarget) -> CoreResult<BlockId> {
        if let Some(id) = &target.block_id {
            return self.content().require(id).map(|block| block.id.clone());
        }
        if let Some(order) = target.at {
            return self
                .content()
                .by_order(order)
                .map(|block| block.id.clone())
                .ok_or(CoreError::LookupMiss(LookupTarget::Order(order)));
        }
        self.lookup
            .block_with_selection(self)
            .filter(|id| self.content().contains(id))
            .ok_or(CoreError::LookupMiss(LookupTarget::Selection))
    }

    /// Read access to a block's inline document.
    pub fn inline_document(&self, target: &InlineTarget) -> CoreResult<&InlineDocument> {
        let id = self.resolve_inline(target)?;
        self.inline
            .get(&id)
            .ok_or(CoreError::LookupMiss(LookupTarget::Block(id)))
    }

    /// The active text selection of the target block.
    pub fn inline_selection(&self, target: &InlineTarget) -> CoreResult<Option<Range>> {
        let id = self.resolve_inline(target)?;
        if let Some((pending, range)) = self.pending_selection() {
            if *pending == id {
                return Ok(range.clone());
            }
        }
        Ok(self
            .inline
            .get(&id)
            .and_then(|doc| doc.selection().cloned()))
    }

    /// Sets (or clears) the text selection of the target block.
    ///
    /// Every other inline document loses its selection. Inside a batch the
    /// selection is checked against the staged content and applied at
    /// commit.
    pub fn set_inline_selection(&mut self, target: &InlineTarget, range: Option<Range>) -> CoreResult<()> {
        let id = self.resolve_inline(target)?;

        if self.is_staging() {
            if let Some(range) = &range {
                let block = self.content().require(&id)?;
                let mut doc = InlineDocument::with_extensions(
                    block.value.clone(),
                    self.registry().extensions_for(&block.kind),
                );
                doc.select(range.clone())?;
            }
            self.set_pending_selection(id, range.clone());
        } else {
            let doc = self
                .inline
                .get_mut(&id)
                .ok_or_else(|| CoreError::LookupMiss(LookupTarget::Block(id.clone())))?;
            match &range {
                Some(range) => doc.select(range.clone())?,
                None => doc.deselect(),
            }
            for (other, doc) in self.inline.iter_mut() {
                if *other != id {
                    doc.deselect();
                }
            }
        }

        self.path.selection = range;
        self.path_changed();
        Ok(())
    }

    pub fn get_range(&self, target: &InlineTarget) -> CoreResult<Option<Range>> {
        self.inline_selection(target)
    }

    pub fn get_anchor(&self, target: &InlineTarget) -> CoreResult<Option<Point>> {
        Ok(self.inline_selection(target)?.map(|range| range.anchor))
    }

    pub fn get_focus(&self, target: &InlineTarget) -> CoreResult<Option<Point>> {
        Ok(self.inline_selection(target)?.map(|range| range.focus))
    }

    pub fn get_start(&self, target: &InlineTarget) -> CoreResult<Option<Point>> {
        Ok(self.inline_selection(target)?.map(|range| range.start().clone()))
    }

    pub fn get_end(&self, target: &InlineTarget) -> CoreResult<Option<Point>> {
        Ok(self.inline_selection(target)?.map(|range| range.end().clone()))
    }

    /// True when there is no selection or it is a caret.
    pub fn is_collapsed(&self, target: &InlineTarget) -> CoreResult<bool> {
        Ok(self
            .inline_selection(target)?
            .is_none_or(|range| range.is_collapsed()))
    }

    /// True only for a selection that spans text.
    pub fn is_expanded(&self, target: &InlineTarget) -> CoreResult<bool> {
        Ok(self
            .inline_selection(target)?
            .is_some_and(|range| range.is_expanded()))
    }

    /// Notifies observers, unless a batch will do it at commit.
    pub(crate) fn path_changed(&self) {
        if !self.is_staging() {
            tracing::trace!(current = ?self.path.current, selected = ?self.path.selected, "Path changed");
            self.event_bus.emit(crate::event::EditorEvent::PathChanged(self.path.clone()));
        }
    }
}
