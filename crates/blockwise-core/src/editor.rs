//! Main editor orchestration.
//!
//! ## Learning: The Facade Pattern
//!
//! `Editor` is the one type hosts talk to. Block operations live here,
//! while path handling (`path.rs`), batching and history (`batch.rs`) and
//! command dispatch (`command.rs`) add their own `impl Editor` blocks.
//!
//! Every mutating operation below goes through
//! [`batch_operations`](Editor::batch_operations), so it is validated,
//! recorded for undo and announced on the event bus exactly once, even when
//! a plugin command strings several of them together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use blockwise_inline::{
    Descendant, Element, InlineDocument, InlineError, Range, Text, element_at, element_at_mut,
    parent,
};

use crate::batch::Staging;
use crate::block::{Block, BlockData, BlockId, BlockMeta, BlockPatch};
use crate::config::Config;
use crate::content::ContentStore;
use crate::event::{EditorEvent, EventBus, EventHandler};
use crate::history::{CoalesceKey, EditKind, History};
use crate::keymap::{KeyEvent, KeyOutcome, Keymap};
use crate::lookup::{FocusedBlockLookup, SelectionLookup};
use crate::ops::BlockOp;
use crate::path::{InlineTarget, Path, PathSource};
use crate::registry::PluginRegistry;
use crate::{CoreError, CoreResult, LookupTarget};

/// Direction of a one-step indentation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthChange {
    Increase,
    Decrease,
}

/// The main editor state.
///
/// ## Thread Safety
///
/// `Editor` is owned by a single thread and mutated through `&mut self`.
/// Observers receive [`EditorEvent`]s over a broadcast channel instead of
/// holding references into the editor.
pub struct Editor {
    /// Committed content
    pub(crate) store: ContentStore,

    pub(crate) path: Path,

    registry: Arc<PluginRegistry>,

    /// One inline document per committed block
    pub(crate) inline: HashMap<BlockId, InlineDocument>,

    pub(crate) history: History,

    /// Open batch, if any
    pub(crate) staging: Option<Staging>,

    config: Config,

    keymap: Keymap,

    pub(crate) event_bus: EventBus,

    pub(crate) lookup: Box<dyn SelectionLookup>,
}

impl Editor {
    /// Creates an empty editor with default configuration.
    pub fn new(registry: impl Into<Arc<PluginRegistry>>) -> Self {
        Self::with_config(registry, Config::default())
    }

    pub fn with_config(registry: impl Into<Arc<PluginRegistry>>, config: Config) -> Self {
        Self {
            store: ContentStore::new(),
            path: Path::default(),
            registry: registry.into(),
            inline: HashMap::new(),
            history: History::new(
                config.editor.undo_limit,
                Duration::from_millis(config.editor.coalesce_ms),
            ),
            staging: None,
            keymap: Keymap::from_config(&config),
            config,
            event_bus: EventBus::new(),
            lookup: Box::new(FocusedBlockLookup),
        }
    }

    /// Replaces the native-selection lookup.
    pub fn with_lookup(mut self, lookup: impl SelectionLookup + 'static) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    /// Creates an editor over persisted content, honouring the configured
    /// load policy.
    pub fn from_json(
        registry: impl Into<Arc<PluginRegistry>>,
        config: Config,
        json: &str,
    ) -> CoreResult<Self> {
        let mut editor = Self::with_config(registry, config);
        editor.load_json(json)?;
        Ok(editor)
    }

    // ==================== Accessors ====================

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn keymap_mut(&mut self) -> &mut Keymap {
        &mut self.keymap
    }

    /// Subscribes to editor events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EditorEvent> {
        self.event_bus.subscribe()
    }

    /// Subscribes with an async helper that skips over lag.
    pub fn event_handler(&self) -> EventHandler {
        EventHandler::new(self.subscribe())
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.content().get(id)
    }

    pub fn block_at(&self, order: usize) -> Option<&Block> {
        self.content().by_order(order)
    }

    /// The focused block.
    pub fn current_block(&self) -> Option<&Block> {
        self.path.current.and_then(|order| self.block_at(order))
    }

    pub fn inline_documents(&self) -> impl Iterator<Item = (&BlockId, &InlineDocument)> {
        self.inline.iter()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Runs a value through the inline engine's normalization for `kind`.
    pub fn normalize_value(&self, kind: &str, value: Vec<Element>) -> Vec<Element> {
        InlineDocument::with_extensions(value, self.registry.extensions_for(kind)).into_children()
    }

    /// Resolves an explicit block id, or the focused block.
    pub fn target_block(&self, id: Option<&BlockId>) -> CoreResult<BlockId> {
        match id {
            Some(id) => self.content().require(id).map(|block| block.id.clone()),
            None => self
                .current_block()
                .map(|block| block.id.clone())
                .ok_or(CoreError::LookupMiss(LookupTarget::Current)),
        }
    }

    // ==================== Value ====================

    /// The committed content.
    pub fn value(&self) -> &ContentStore {
        &self.store
    }

    /// Replaces the whole document, dropping history and the path.
    pub fn set_value(&mut self, store: ContentStore) -> CoreResult<()> {
        if self.is_staging() {
            return Err(CoreError::InvalidOperation(
                "Cannot replace the document inside a batch".to_string(),
            ));
        }
        store.validate(&self.registry)?;

        self.store = store;
        self.inline.clear();
        for id in self.store.ordered_ids() {
            self.rebuild_inline(&id);
        }
        self.path = Path::default();
        self.history.clear();

        tracing::debug!(blocks = self.store.len(), "Document replaced");
        self.event_bus.emit(EditorEvent::ValueReplaced);
        self.event_bus.emit(EditorEvent::PathChanged(self.path.clone()));
        Ok(())
    }

    /// Parses persisted JSON under the configured load policy and installs it.
    pub fn load_json(&mut self, json: &str) -> CoreResult<()> {
        let store = ContentStore::from_json(json, &self.registry, self.config.editor.load_policy)?;
        self.set_value(store)
    }

    /// Serializes the committed content to the persisted format.
    pub fn to_json(&self) -> CoreResult<String> {
        self.store.to_json_pretty()
    }

    // ==================== Block Structure ====================

    /// Inserts a block of type `kind` and returns its id.
    ///
    /// `at` defaults to just after the focused block, or the end of the
    /// document, and is clamped to `0..=N`. Without a caller value, the
    /// plugin's `before_create` hook or the schema default tree supplies one.
    pub fn insert_block(
        &mut self,
        kind: &str,
        at: Option<usize>,
        data: BlockData,
        focus: bool,
    ) -> CoreResult<BlockId> {
        let plugin = Arc::clone(self.registry.require(kind)?);
        if plugin.is_inline() {
            return Err(CoreError::InvalidOperation(format!(
                "'{kind}' is an inline plugin and cannot own a block"
            )));
        }

        let len = self.content().len();
        let at = at
            .unwrap_or_else(|| self.path.current.map_or(len, |current| current + 1))
            .min(len);
        let value = match data.value {
            Some(value) => value,
            None => match &plugin.lifecycle.before_create {
                Some(hook) => hook(self),
                None => plugin.schema.default_tree(),
            },
        };
        let block = Block {
            id: data.id.unwrap_or_default(),
            kind: kind.to_string(),
            value: self.normalize_value(kind, value),
            meta: BlockMeta {
                order: at,
                depth: data.depth.unwrap_or(0).min(self.config.editor.max_depth),
                align: data.align,
            },
        };
        let id = block.id.clone();

        self.batch_operations(|editor| {
            editor.stage(BlockOp::InsertBlock { block })?;
            editor.shift_for_insert(at);
            if focus {
                editor.path.current = Some(at);
                editor.place_caret(&id, None)?;
            }
            Ok(id)
        })
    }

    /// Deletes a block and returns it.
    ///
    /// A deleted focused block hands focus to the block before it (or the
    /// new first block); block-selection entries are re-indexed.
    pub fn delete_block(&mut self, id: &BlockId, focus: bool) -> CoreResult<Block> {
        self.batch_operations(|editor| {
            let order = editor.content().require(id)?.meta.order;
            let BlockOp::InsertBlock { block } =
                editor.stage(BlockOp::RemoveBlock { id: id.clone() })?
            else {
                return Err(CoreError::InvalidOperation(format!(
                    "Removing block {id} did not yield the block"
                )));
            };

            let remaining = editor.content().len();
            editor.shift_for_remove(order, remaining);
            if focus {
                if let Some(next) = editor.current_block().map(|block| block.id.clone()) {
                    editor.place_caret(&next, Some(usize::MAX))?;
                }
            }
            Ok(block)
        })
    }

    pub fn delete_blocks(&mut self, ids: &[BlockId]) -> CoreResult<Vec<Block>> {
        self.batch_operations(|editor| {
            ids.iter()
                .map(|id| editor.delete_block(id, false))
                .collect()
        })
    }

    /// Deletes every block in the block selection.
    pub fn delete_selected_blocks(&mut self) -> CoreResult<Vec<Block>> {
        let mut ids: Vec<BlockId> = Vec::new();
        for order in self.get_selected().unwrap_or_default() {
            if let Some(block) = self.block_at(*order) {
                if !ids.contains(&block.id) {
                    ids.push(block.id.clone());
                }
            }
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.batch_operations(|editor| {
            let removed = editor.delete_blocks(&ids)?;
            editor.path.selected = None;
            Ok(removed)
        })
    }

    /// Merges a patch into a block; a rejected patch applies nothing.
    pub fn update_block(&mut self, id: &BlockId, patch: BlockPatch) -> CoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let kind = self.content().require(id)?.kind.clone();
        if let Some(depth) = patch.depth {
            if depth > self.config.editor.max_depth {
                return Err(CoreError::InvalidOperation(format!(
                    "Depth {depth} exceeds the maximum of {}",
                    self.config.editor.max_depth
                )));
            }
        }

        self.batch_operations(|editor| {
            if let Some(value) = patch.value {
                let value = editor.normalize_value(&kind, value);
                editor.stage(BlockOp::SetValue {
                    id: id.clone(),
                    value,
                })?;
            }
            if let Some(depth) = patch.depth {
                editor.stage(BlockOp::SetDepth {
                    id: id.clone(),
                    depth,
                })?;
            }
            if let Some(align) = patch.align {
                editor.stage(BlockOp::SetAlign {
                    id: id.clone(),
                    align,
                })?;
            }
            Ok(())
        })
    }

    /// Moves a block's depth by one step within `0..=max_depth`.
    ///
    /// Returns the resulting depth.
    pub fn change_block_depth(&mut self, id: &BlockId, change: DepthChange) -> CoreResult<usize> {
        let depth = self.content().require(id)?.meta.depth;
        let next = match change {
            DepthChange::Increase => (depth + 1).min(self.config.editor.max_depth),
            DepthChange::Decrease => depth.saturating_sub(1),
        };
        if next == depth {
            return Ok(depth);
        }

        self.stage(BlockOp::SetDepth {
            id: id.clone(),
            depth: next,
        })?;
        Ok(next)
    }

    /// Converts a block to another type, carrying its text over.
    ///
    /// Toggling a block onto its own type reverts it to the default block
    /// type. The caret keeps its absolute text offset.
    pub fn toggle_block(&mut self, id: &BlockId, kind: &str, focus: bool) -> CoreResult<()> {
        let block = self.content().require(id)?.clone();
        let target = if block.kind == kind {
            self.config.editor.default_block.clone()
        } else {
            kind.to_string()
        };
        if target == block.kind {
            return Ok(());
        }

        let plugin = Arc::clone(self.registry.require(&target)?);
        if plugin.is_inline() {
            return Err(CoreError::InvalidOperation(format!(
                "Cannot toggle a block into inline plugin '{target}'"
            )));
        }

        let offset = self.caret_offset(id);
        let mut value = plugin.schema.default_tree();
        if let Some(leaf_path) = plugin.schema.text_leaf_path(&value) {
            let allow_injected = element_at(&value, &leaf_path)
                .and_then(|leaf| plugin.schema.get(&leaf.kind))
                .is_some_and(|def| def.allow_injected);
            let content = flatten_inline(collect_inline(&block.value), |el| {
                allow_injected && self.registry.is_injectable(el)
            });
            if let Some(leaf) = element_at_mut(&mut value, &leaf_path) {
                if !content.is_empty() {
                    leaf.children = content;
                }
            }
        }
        let value = self.normalize_value(&target, value);

        tracing::debug!(block = %id, from = %block.kind, to = %target, "Toggling block");
        self.batch_operations(|editor| {
            editor.stage(BlockOp::SetType {
                id: id.clone(),
                kind: target,
                value,
            })?;
            if focus {
                editor.path.current = Some(block.meta.order);
            }
            if focus || offset.is_some() {
                editor.place_caret(id, offset)?;
            }
            Ok(())
        })
    }

    /// Moves a block to order `to` (clamped to the document).
    pub fn move_block(&mut self, id: &BlockId, to: usize) -> CoreResult<()> {
        let before = self.content().ordered_ids();
        self.batch_operations(|editor| {
            editor.stage(BlockOp::MoveBlock { id: id.clone(), to })?;
            editor.remap_path(&before);
            Ok(())
        })
    }

    /// Copies a block, with fresh element ids, right after the original.
    pub fn duplicate_block(&mut self, id: &BlockId) -> CoreResult<BlockId> {
        let source = self.content().require(id)?;
        let at = source.meta.order + 1;
        let block = Block {
            id: BlockId::new(),
            kind: source.kind.clone(),
            value: source.value.iter().map(Element::clone_with_new_ids).collect(),
            meta: BlockMeta {
                order: at,
                ..source.meta.clone()
            },
        };
        let copy = block.id.clone();

        self.batch_operations(|editor| {
            editor.stage(BlockOp::InsertBlock { block })?;
            editor.shift_for_insert(at);
            Ok(copy)
        })
    }

    // ==================== Text ====================

    /// Splits a block at its caret into two blocks of the same type.
    ///
    /// An expanded selection is deleted first. Focus moves to the new block.
    pub fn split_block(&mut self, id: Option<&BlockId>) -> CoreResult<BlockId> {
        let id = match id {
            Some(id) => self.target_block(Some(id))?,
            None => self.resolve_inline(&InlineTarget::native())?,
        };
        let block = self.content().require(&id)?.clone();
        let mut doc = self.working_document(&id)?;
        let range = doc.selection().cloned().ok_or(InlineError::NoSelection)?;
        if range.is_expanded() {
            doc.delete_range(&range)?;
        }
        let point = doc
            .selection()
            .map(|sel| sel.focus.clone())
            .unwrap_or_else(|| range.start().clone());
        let (left, right) = doc.split_at(&point)?;

        let at = block.meta.order + 1;
        let tail = Block {
            id: BlockId::new(),
            kind: block.kind.clone(),
            value: self.normalize_value(&block.kind, right),
            meta: BlockMeta {
                order: at,
                ..block.meta.clone()
            },
        };
        let tail_id = tail.id.clone();
        let left = self.normalize_value(&block.kind, left);

        self.batch_operations(|editor| {
            editor.stage(BlockOp::SetValue {
                id: id.clone(),
                value: left,
            })?;
            editor.stage(BlockOp::InsertBlock { block: tail })?;
            editor.shift_for_insert(at);
            editor.path.current = Some(at);
            editor.place_caret(&tail_id, None)?;
            Ok(tail_id)
        })
    }

    /// Merges a block into the one before it.
    ///
    /// A previous block without editable text (a divider, an image) is
    /// deleted instead. Returns false for the first block.
    pub fn merge_block(&mut self, id: &BlockId) -> CoreResult<bool> {
        let block = self.content().require(id)?.clone();
        let Some(order) = block.meta.order.checked_sub(1) else {
            return Ok(false);
        };
        let prev = self
            .block_at(order)
            .cloned()
            .ok_or(CoreError::LookupMiss(LookupTarget::Order(order)))?;
        let prev_doc = self.working_document(&prev.id)?;
        let own_doc = self.working_document(id)?;

        if prev_doc.text_paths().is_empty() {
            return self.batch_operations(|editor| {
                editor.delete_block(&prev.id, false)?;
                editor.path.current = Some(order);
                editor.place_caret(id, None)?;
                Ok(true)
            });
        }
        if own_doc.text_paths().is_empty() {
            return self.batch_operations(|editor| {
                editor.delete_block(id, false)?;
                editor.path.current = Some(order);
                editor.place_caret(&prev.id, Some(usize::MAX))?;
                Ok(true)
            });
        }

        let join = prev_doc.text().len();
        let mut value = prev_doc.children().to_vec();
        if let Some(last) = prev_doc.text_paths().pop() {
            let mut container = parent(&last).unwrap_or_default().to_vec();
            while element_at(&value, &container).is_some_and(|el| prev_doc.is_inline(el)) {
                container.pop();
            }
            let allow_injected = element_at(&value, &container)
                .and_then(|el| self.registry.element_def(&prev.kind, &el.kind))
                .is_some_and(|def| def.allow_injected);
            let content = flatten_inline(collect_inline(&block.value), |el| {
                allow_injected && self.registry.is_injectable(el)
            });
            if let Some(el) = element_at_mut(&mut value, &container) {
                el.children.extend(content);
            }
        }
        let value = self.normalize_value(&prev.kind, value);

        self.batch_operations(|editor| {
            editor.stage(BlockOp::SetValue {
                id: prev.id.clone(),
                value,
            })?;
            editor.delete_block(id, false)?;
            editor.path.current = Some(order);
            editor.place_caret(&prev.id, Some(join))?;
            Ok(true)
        })
    }

    /// Types text at the caret of the block holding the selection.
    pub fn insert_text(&mut self, text: &str) -> CoreResult<()> {
        let id = self.resolve_inline(&InlineTarget::native())?;
        let mut doc = self.working_document(&id)?;
        doc.insert_text(text)?;
        self.commit_text_edit(&id, doc, EditKind::Insert)
    }

    /// Backspace.
    ///
    /// Deletes the selection or one grapheme. At the very start of a block
    /// it outdents an indented block, otherwise merges it into the previous
    /// one. Returns false when nothing changed.
    pub fn delete_backward(&mut self) -> CoreResult<bool> {
        let id = self.resolve_inline(&InlineTarget::native())?;
        let mut doc = self.working_document(&id)?;
        let range = doc.selection().cloned().ok_or(InlineError::NoSelection)?;

        if range.is_collapsed() && doc.offset_of(&range.focus) == Some(0) {
            let depth = self.content().require(&id)?.meta.depth;
            if depth > 0 {
                self.change_block_depth(&id, DepthChange::Decrease)?;
                return Ok(true);
            }
            return self.merge_block(&id);
        }

        if !doc.delete_backward()? {
            return Ok(false);
        }
        self.commit_text_edit(&id, doc, EditKind::Delete)?;
        Ok(true)
    }

    fn commit_text_edit(&mut self, id: &BlockId, doc: InlineDocument, kind: EditKind) -> CoreResult<()> {
        let selection = doc.selection().cloned();
        let value = doc.into_children();
        self.batch_operations(|editor| {
            editor.stage(BlockOp::SetValue {
                id: id.clone(),
                value,
            })?;
            editor.set_pending_selection(id.clone(), selection);
            editor.set_coalesce(CoalesceKey {
                block: id.clone(),
                kind,
            });
            Ok(())
        })
    }

    // ==================== Focus ====================

    /// Focuses a block, putting the caret at its end unless it already
    /// holds a selection.
    pub fn focus_block(&mut self, id: &BlockId) -> CoreResult<()> {
        let order = self.content().require(id)?.meta.order;
        self.set_current(Some(order), None)?;
        let has_selection = self
            .inline
            .get(id)
            .is_some_and(|doc| doc.selection().is_some());
        if !has_selection {
            self.place_caret(id, Some(usize::MAX))?;
        }
        Ok(())
    }

    /// Drops focus and every text selection.
    pub fn blur(&mut self) {
        for doc in self.inline.values_mut() {
            doc.deselect();
        }
        self.path.current = None;
        self.path.selection = None;
        self.path_changed();
    }

    /// Selects every block as a whole.
    pub fn select_all_blocks(&mut self) {
        let all: Vec<usize> = (0..self.content().len()).collect();
        self.set_selected(all, Some(PathSource::Keyboard));
    }

    // ==================== Keyboard ====================

    /// Routes a key press through plugin handlers, then the keymap.
    ///
    /// A bound command that finds nothing to act on passes the key on.
    pub fn handle_key_down(&mut self, event: &KeyEvent) -> CoreResult<KeyOutcome> {
        for (kind, handler) in self.registry.key_down_handlers() {
            if handler(self, event) == KeyOutcome::Claimed {
                tracing::debug!(plugin = %kind, key = %event.key, "Key claimed by plugin");
                return Ok(KeyOutcome::Claimed);
            }
        }

        let Some(command) = self.keymap.lookup(event).cloned() else {
            return Ok(KeyOutcome::Pass);
        };
        match self.execute(&command) {
            Ok(()) => Ok(KeyOutcome::Claimed),
            Err(e) if e.is_lookup_miss() => {
                tracing::trace!(key = %event.key, error = %e, "Key binding had no target");
                Ok(KeyOutcome::Pass)
            }
            Err(e) => Err(e),
        }
    }

    // ==================== Internals ====================

    /// A block's inline document as staged, with its current selection.
    fn working_document(&self, id: &BlockId) -> CoreResult<InlineDocument> {
        let block = self.content().require(id)?;
        let mut doc = InlineDocument::with_extensions(
            block.value.clone(),
            self.registry.extensions_for(&block.kind),
        );
        let selection = match self.pending_selection() {
            Some((pending, range)) if pending == id => range.clone(),
            _ => self.inline.get(id).and_then(|doc| doc.selection().cloned()),
        };
        if let Some(range) = selection {
            if let Err(e) = doc.select(range) {
                tracing::trace!(block = %id, error = %e, "Ignoring stale selection");
            }
        }
        Ok(doc)
    }

    fn caret_offset(&self, id: &BlockId) -> Option<usize> {
        let doc = self.working_document(id).ok()?;
        let range = doc.selection()?;
        doc.offset_of(&range.focus)
    }

    /// Puts a collapsed selection at an absolute text offset of a block
    /// (its start for `None`, its end for `usize::MAX`).
    fn place_caret(&mut self, id: &BlockId, offset: Option<usize>) -> CoreResult<()> {
        let doc = self.working_document(id)?;
        let point = match offset {
            Some(offset) => doc.point_at(offset),
            None => doc.start_point(),
        };
        match point {
            Some(point) => {
                self.set_inline_selection(&InlineTarget::block(id.clone()), Some(Range::collapsed(point)))
            }
            None => Ok(()),
        }
    }

    fn shift_for_insert(&mut self, at: usize) {
        if let Some(current) = self.path.current.as_mut() {
            if *current >= at {
                *current += 1;
            }
        }
        if let Some(selected) = self.path.selected.as_mut() {
            for order in selected.iter_mut().filter(|order| **order >= at) {
                *order += 1;
            }
        }
    }

    fn shift_for_remove(&mut self, removed: usize, remaining: usize) {
        self.path.current = match self.path.current {
            Some(current) if current == removed => {
                (remaining > 0).then(|| removed.saturating_sub(1))
            }
            Some(current) if current > removed => Some(current - 1),
            other => other,
        };
        if let Some(selected) = self.path.selected.as_mut() {
            selected.retain(|order| *order != removed);
            for order in selected.iter_mut().filter(|order| **order > removed) {
                *order -= 1;
            }
        }
        if self.path.selected.as_ref().is_some_and(Vec::is_empty) {
            self.path.selected = None;
        }
    }

    /// Follows blocks to their new orders after a move.
    fn remap_path(&mut self, before: &[BlockId]) {
        let after = self.content().ordered_ids();
        let new_order = |old: usize| {
            before
                .get(old)
                .and_then(|id| after.iter().position(|other| other == id))
        };
        self.path.current = self.path.current.and_then(new_order);
        if let Some(selected) = self.path.selected.take() {
            let remapped: Vec<usize> = selected.into_iter().filter_map(new_order).collect();
            self.path.selected = (!remapped.is_empty()).then_some(remapped);
        }
    }
}

/// Inline content of a block: the children of every element that holds
/// text directly, in document order.
fn collect_inline(value: &[Element]) -> Vec<Descendant> {
    fn walk(el: &Element, out: &mut Vec<Descendant>) {
        if el.is_void() {
            return;
        }
        if el
            .children
            .iter()
            .any(|child| matches!(child, Descendant::Text(_)))
        {
            out.extend(el.children.iter().cloned());
            return;
        }
        for child in &el.children {
            if let Descendant::Element(child) = child {
                walk(child, out);
            }
        }
    }

    let mut out = Vec::new();
    for root in value {
        walk(root, &mut out);
    }
    out
}

/// Replaces elements that may not be kept with their plain text.
fn flatten_inline(children: Vec<Descendant>, keep: impl Fn(&Element) -> bool) -> Vec<Descendant> {
    children
        .into_iter()
        .map(|child| match child {
            Descendant::Element(el) if !keep(&el) => Descendant::Text(Text::new(el.text_content())),
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{Key, Modifiers};
    use crate::plugin::Plugin;
    use crate::schema::{ElementDef, ElementSchema};
    use crate::{Align, Command, CommandSpec};
    use blockwise_inline::{NodeType, Point};
    use proptest::prelude::*;

    fn registry() -> PluginRegistry {
        PluginRegistry::with_plugins([
            Plugin::block(
                "Paragraph",
                ElementSchema::new(ElementDef::new("paragraph").allow_injected()),
            ),
            Plugin::block("HeadingOne", ElementSchema::new(ElementDef::new("heading-one"))),
            Plugin::block(
                "Divider",
                ElementSchema::new(ElementDef::new("divider").node_type(NodeType::Void)),
            ),
            Plugin::block(
                "Accordion",
                ElementSchema::new(ElementDef::new("accordion-list").children(["accordion-item"]))
                    .with_element(
                        ElementDef::new("accordion-item")
                            .children(["accordion-heading", "accordion-content"]),
                    )
                    .with_element(ElementDef::new("accordion-heading"))
                    .with_element(ElementDef::new("accordion-content").allow_injected()),
            ),
            Plugin::inline(
                "Link",
                ElementSchema::new(ElementDef::new("link").node_type(NodeType::Inline)),
            ),
        ])
        .unwrap()
    }

    fn paragraph(text: &str) -> BlockData {
        BlockData::default().with_value(vec![Element::new("paragraph").with_text(text)])
    }

    /// Editor holding one paragraph per text, nothing focused.
    fn editor_with(texts: &[&str]) -> (Editor, Vec<BlockId>) {
        let mut editor = Editor::new(registry());
        let ids = texts
            .iter()
            .enumerate()
            .map(|(ix, text)| {
                editor
                    .insert_block("Paragraph", Some(ix), paragraph(text), false)
                    .unwrap()
            })
            .collect();
        (editor, ids)
    }

    fn texts(editor: &Editor) -> Vec<String> {
        editor.content().ordered().iter().map(|b| b.text()).collect()
    }

    fn caret(editor: &mut Editor, id: &BlockId, offset: usize) {
        let order = editor.block(id).unwrap().order();
        editor.set_current(Some(order), None).unwrap();
        editor
            .set_inline_selection(
                &InlineTarget::block(id.clone()),
                Some(Range::collapsed(Point::new(vec![0, 0], offset))),
            )
            .unwrap();
    }

    // ==================== Structure ====================

    #[test]
    fn test_insert_defaults_after_current() {
        let (mut editor, _) = editor_with(&["a", "b", "c"]);
        editor.set_current(Some(0), None).unwrap();
        editor.set_selected(vec![1, 2], None);

        editor
            .insert_block("Paragraph", None, paragraph("new"), false)
            .unwrap();
        assert_eq!(texts(&editor), ["a", "new", "b", "c"]);
        assert_eq!(editor.path().current, Some(0));
        assert_eq!(editor.get_selected(), Some(&[2, 3][..]));

        editor
            .insert_block("Paragraph", Some(99), paragraph("end"), true)
            .unwrap();
        assert_eq!(texts(&editor).last().unwrap(), "end");
        assert_eq!(editor.path().current, Some(4));
    }

    #[test]
    fn test_insert_uses_default_tree_and_rejects_bad_types() {
        let mut editor = Editor::new(registry());
        let id = editor
            .insert_block("Accordion", None, BlockData::default(), false)
            .unwrap();
        let block = editor.block(&id).unwrap();
        assert_eq!(block.value[0].kind, "accordion-list");

        assert!(matches!(
            editor.insert_block("Nope", None, BlockData::default(), false),
            Err(CoreError::BlockTypeNotFound(_))
        ));
        assert!(matches!(
            editor.insert_block("Link", None, BlockData::default(), false),
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            editor.insert_block(
                "Paragraph",
                None,
                BlockData::default().with_value(vec![Element::new("heading-one").with_text("x")]),
                false
            ),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(editor.content().len(), 1);
    }

    #[test]
    fn test_before_create_hook_supplies_value() {
        let plugin = Plugin::block(
            "Paragraph",
            ElementSchema::new(ElementDef::new("paragraph")),
        )
        .before_create(|_| vec![Element::new("paragraph").with_text("Type here")]);
        let mut editor = Editor::new(PluginRegistry::with_plugins([plugin]).unwrap());
        let id = editor
            .insert_block("Paragraph", None, BlockData::default(), false)
            .unwrap();
        assert_eq!(editor.block(&id).unwrap().text(), "Type here");
    }

    #[test]
    fn test_delete_current_moves_focus_back() {
        let (mut editor, ids) = editor_with(&["a", "b", "c"]);
        editor.set_current(Some(2), None).unwrap();
        editor.set_selected(vec![0, 2], None);

        let removed = editor.delete_block(&ids[2], true).unwrap();
        assert_eq!(removed.text(), "c");
        assert_eq!(editor.path().current, Some(1));
        assert_eq!(editor.get_selected(), Some(&[0][..]));
        assert_eq!(editor.content().check_orders(), Ok(()));

        editor.set_current(Some(0), None).unwrap();
        editor.delete_block(&ids[0], false).unwrap();
        assert_eq!(editor.path().current, Some(0));
        assert_eq!(editor.get_selected(), None);
    }

    #[test]
    fn test_delete_only_block_clears_path() {
        let (mut editor, ids) = editor_with(&["only"]);
        editor.set_current(Some(0), None).unwrap();
        editor.set_selected(0, None);

        editor.delete_block(&ids[0], true).unwrap();
        assert_eq!(editor.path().current, None);
        assert_eq!(editor.path().selected, None);
        assert!(editor.is_path_empty());
    }

    #[test]
    fn test_delete_missing_block_is_a_lookup_miss() {
        let (mut editor, _) = editor_with(&["a"]);
        let err = editor.delete_block(&BlockId::from("ghost"), false).unwrap_err();
        assert!(err.is_lookup_miss());

        use crate::ResultExt;
        assert!(editor
            .delete_block(&BlockId::from("ghost"), false)
            .ignore_miss()
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_selected_blocks() {
        let (mut editor, _) = editor_with(&["a", "b", "c", "d"]);
        editor.set_selected(vec![3, 1, 3], None);
        assert_eq!(editor.get_selected(), Some(&[3, 1, 3][..]));
        let removed = editor.delete_selected_blocks().unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(texts(&editor), ["a", "c"]);
        assert_eq!(editor.get_selected(), None);

        assert!(editor.undo().unwrap());
        assert_eq!(texts(&editor), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_update_block() {
        let (mut editor, ids) = editor_with(&["a"]);
        editor
            .update_block(
                &ids[0],
                BlockPatch {
                    value: Some(vec![Element::new("paragraph").with_text("b")]),
                    depth: Some(2),
                    align: Some(Some(Align::Center)),
                },
            )
            .unwrap();
        let block = editor.block(&ids[0]).unwrap();
        assert_eq!(block.text(), "b");
        assert_eq!(block.depth(), 2);
        assert_eq!(block.meta.align, Some(Align::Center));

        let rejected = editor.update_block(
            &ids[0],
            BlockPatch {
                value: Some(vec![Element::new("divider")]),
                depth: Some(1),
                align: None,
            },
        );
        assert!(rejected.is_err());
        assert_eq!(editor.block(&ids[0]).unwrap().depth(), 2);
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut config = Config::default();
        config.editor.max_depth = 2;
        let mut editor = Editor::with_config(registry(), config);
        let id = editor
            .insert_block("Paragraph", None, paragraph("x"), false)
            .unwrap();

        assert_eq!(editor.change_block_depth(&id, DepthChange::Decrease).unwrap(), 0);
        assert_eq!(editor.change_block_depth(&id, DepthChange::Increase).unwrap(), 1);
        assert_eq!(editor.change_block_depth(&id, DepthChange::Increase).unwrap(), 2);
        assert_eq!(editor.change_block_depth(&id, DepthChange::Increase).unwrap(), 2);
    }

    #[test]
    fn test_toggle_keeps_text_and_caret() {
        let (mut editor, ids) = editor_with(&["hello"]);
        caret(&mut editor, &ids[0], 3);

        editor.toggle_block(&ids[0], "HeadingOne", true).unwrap();
        let block = editor.block(&ids[0]).unwrap();
        assert_eq!(block.kind, "HeadingOne");
        assert_eq!(block.value[0].kind, "heading-one");
        assert_eq!(block.text(), "hello");
        let target = InlineTarget::block(ids[0].clone());
        assert_eq!(
            editor.get_focus(&target).unwrap(),
            Some(Point::new(vec![0, 0], 3))
        );

        editor.toggle_block(&ids[0], "HeadingOne", true).unwrap();
        assert_eq!(editor.block(&ids[0]).unwrap().kind, "Paragraph");
    }

    #[test]
    fn test_toggle_into_nested_container() {
        let (mut editor, ids) = editor_with(&["question"]);
        editor.toggle_block(&ids[0], "Accordion", false).unwrap();
        let block = editor.block(&ids[0]).unwrap();
        assert_eq!(block.kind, "Accordion");
        assert_eq!(block.text(), "question");
        assert_eq!(editor.registry().validate_block(block), Ok(()));
    }

    #[test]
    fn test_toggle_flattens_links_where_not_allowed() {
        let mut editor = Editor::new(registry());
        let value = vec![Element::new("paragraph").with_children([
            Descendant::text("see "),
            Element::new("link")
                .with_node_type(NodeType::Inline)
                .with_text("docs")
                .into(),
            Descendant::text(""),
        ])];
        let id = editor
            .insert_block("Paragraph", None, BlockData::default().with_value(value), false)
            .unwrap();

        editor.toggle_block(&id, "HeadingOne", false).unwrap();
        let block = editor.block(&id).unwrap();
        assert_eq!(block.text(), "see docs");
        assert!(block.value[0]
            .children
            .iter()
            .all(|child| matches!(child, Descendant::Text(_))));
    }

    #[test]
    fn test_move_follows_focus() {
        let (mut editor, ids) = editor_with(&["a", "b", "c"]);
        editor.set_current(Some(0), None).unwrap();
        editor.set_selected(vec![2], None);

        editor.move_block(&ids[0], 2).unwrap();
        assert_eq!(texts(&editor), ["b", "c", "a"]);
        assert_eq!(editor.path().current, Some(2));
        assert_eq!(editor.get_selected(), Some(&[1][..]));
    }

    #[test]
    fn test_duplicate_gets_fresh_ids() {
        let (mut editor, ids) = editor_with(&["a", "b"]);
        let copy = editor.duplicate_block(&ids[0]).unwrap();
        assert_eq!(texts(&editor), ["a", "a", "b"]);

        let original = editor.block(&ids[0]).unwrap();
        let duplicate = editor.block(&copy).unwrap();
        assert_eq!(duplicate.order(), 1);
        assert_ne!(original.value[0].id, duplicate.value[0].id);
    }

    // ==================== Text ====================

    #[test]
    fn test_split_and_merge() {
        let (mut editor, ids) = editor_with(&["hello world"]);
        caret(&mut editor, &ids[0], 5);

        let tail = editor.split_block(None).unwrap();
        assert_eq!(texts(&editor), ["hello", " world"]);
        assert_eq!(editor.path().current, Some(1));
        let target = InlineTarget::block(tail.clone());
        assert_eq!(
            editor.get_focus(&target).unwrap(),
            Some(Point::new(vec![0, 0], 0))
        );

        assert!(editor.merge_block(&tail).unwrap());
        assert_eq!(texts(&editor), ["hello world"]);
        assert_eq!(editor.path().current, Some(0));
        assert_eq!(
            editor.get_focus(&InlineTarget::at(0)).unwrap(),
            Some(Point::new(vec![0, 0], 5))
        );
        assert!(!editor.merge_block(&ids[0]).unwrap());
    }

    #[test]
    fn test_merge_into_divider_removes_it() {
        let (mut editor, ids) = editor_with(&["text"]);
        editor
            .insert_block("Divider", Some(0), BlockData::default(), false)
            .unwrap();
        assert!(editor.merge_block(&ids[0]).unwrap());
        assert_eq!(editor.content().len(), 1);
        assert_eq!(editor.block(&ids[0]).unwrap().order(), 0);
    }

    #[test]
    fn test_typing_coalesces_into_one_undo() {
        let mut config = Config::default();
        config.editor.coalesce_ms = 60_000;
        let mut editor = Editor::with_config(registry(), config);
        let id = editor
            .insert_block("Paragraph", None, paragraph(""), true)
            .unwrap();

        editor.insert_text("a").unwrap();
        editor.insert_text("b").unwrap();
        editor.insert_text("c").unwrap();
        assert_eq!(editor.block(&id).unwrap().text(), "abc");
        assert_eq!(editor.path().selection, Some(Range::collapsed(Point::new(vec![0, 0], 3))));

        assert!(editor.undo().unwrap());
        assert_eq!(editor.block(&id).unwrap().text(), "");
        assert!(editor.redo().unwrap());
        assert_eq!(editor.block(&id).unwrap().text(), "abc");
    }

    #[test]
    fn test_delete_backward_outdents_then_merges() {
        let (mut editor, ids) = editor_with(&["ab", "cd"]);
        editor
            .update_block(&ids[1], BlockPatch::depth(1))
            .unwrap();
        caret(&mut editor, &ids[1], 1);

        assert!(editor.delete_backward().unwrap());
        assert_eq!(texts(&editor), ["ab", "d"]);

        assert!(editor.delete_backward().unwrap());
        assert_eq!(editor.block(&ids[1]).unwrap().depth(), 0);

        assert!(editor.delete_backward().unwrap());
        assert_eq!(texts(&editor), ["abd"]);
    }

    #[test]
    fn test_text_ops_need_a_selection() {
        let (mut editor, _) = editor_with(&["a"]);
        assert!(matches!(
            editor.insert_text("x"),
            Err(CoreError::LookupMiss(LookupTarget::Selection))
        ));
    }

    // ==================== Focus & Keys ====================

    #[test]
    fn test_focus_blur_select_all() {
        let (mut editor, ids) = editor_with(&["a", "b"]);
        editor.focus_block(&ids[1]).unwrap();
        assert_eq!(editor.path().current, Some(1));
        assert_eq!(
            editor.path().selection,
            Some(Range::collapsed(Point::new(vec![0, 0], 1)))
        );

        editor.select_all_blocks();
        assert_eq!(editor.get_selected(), Some(&[0, 1][..]));

        editor.blur();
        assert_eq!(editor.path().current, None);
        assert_eq!(editor.path().selection, None);
        assert!(editor.is_collapsed(&InlineTarget::block(ids[1].clone())).unwrap());
    }

    #[test]
    fn test_keymap_dispatch() {
        let (mut editor, ids) = editor_with(&["ab"]);
        caret(&mut editor, &ids[0], 1);

        assert_eq!(
            editor.handle_key_down(&KeyEvent::plain(Key::Tab)).unwrap(),
            KeyOutcome::Claimed
        );
        assert_eq!(editor.block(&ids[0]).unwrap().depth(), 1);

        editor
            .handle_key_down(&KeyEvent::new(Key::Tab, Modifiers::SHIFT))
            .unwrap();
        assert_eq!(editor.block(&ids[0]).unwrap().depth(), 0);

        editor.handle_key_down(&KeyEvent::plain(Key::Enter)).unwrap();
        assert_eq!(texts(&editor), ["a", "b"]);

        editor
            .handle_key_down(&KeyEvent::new(Key::Char('z'), Modifiers::CTRL))
            .unwrap();
        assert_eq!(texts(&editor), ["ab"]);

        editor.blur();
        assert_eq!(
            editor.handle_key_down(&KeyEvent::plain(Key::Tab)).unwrap(),
            KeyOutcome::Pass
        );
        assert_eq!(
            editor.handle_key_down(&KeyEvent::plain(Key::Char('q'))).unwrap(),
            KeyOutcome::Pass
        );
    }

    #[test]
    fn test_plugin_key_handler_claims_first() {
        let plugin = Plugin::block(
            "Paragraph",
            ElementSchema::new(ElementDef::new("paragraph")),
        )
        .on_key_down(|editor, event| {
            if event.key == Key::Tab {
                editor.blur();
                KeyOutcome::Claimed
            } else {
                KeyOutcome::Pass
            }
        });
        let mut editor = Editor::new(PluginRegistry::with_plugins([plugin]).unwrap());
        let id = editor
            .insert_block("Paragraph", None, paragraph("x"), true)
            .unwrap();

        assert_eq!(
            editor.handle_key_down(&KeyEvent::plain(Key::Tab)).unwrap(),
            KeyOutcome::Claimed
        );
        assert_eq!(editor.block(&id).unwrap().depth(), 0);
        assert_eq!(editor.path().current, None);
    }

    #[test]
    fn test_plugin_command_runs_in_one_batch() {
        let plugin = Plugin::block(
            "Paragraph",
            ElementSchema::new(ElementDef::new("paragraph")),
        )
        .command(CommandSpec::new("paragraph.fill", |editor, args| {
            let count = args.and_then(|v| v.as_u64()).unwrap_or(1);
            for _ in 0..count {
                editor.insert_block("Paragraph", None, BlockData::default(), false)?;
            }
            Ok(Some(serde_json::json!(editor.content().len())))
        }));
        let mut editor = Editor::new(PluginRegistry::with_plugins([plugin]).unwrap());

        let out = editor
            .run_command("paragraph.fill", Some(serde_json::json!(3)))
            .unwrap();
        assert_eq!(out, Some(serde_json::json!(3)));
        assert_eq!(editor.history.undo_count(), 1);

        editor
            .execute(&Command::Custom {
                name: "missing".into(),
                args: None,
            })
            .unwrap_err();
        assert!(matches!(
            editor.run_command("missing", None),
            Err(CoreError::CommandNotFound(_))
        ));
    }

    // ==================== Value ====================

    #[test]
    fn test_json_roundtrip_through_editor() {
        let (editor, _) = editor_with(&["a", "b"]);
        let json = editor.to_json().unwrap();

        let loaded = Editor::from_json(registry(), Config::default(), &json).unwrap();
        assert_eq!(texts(&loaded), ["a", "b"]);
        assert_eq!(loaded.inline_documents().count(), 2);
        assert!(!loaded.can_undo());
    }

    #[test]
    fn test_events_once_per_operation() {
        let (mut editor, ids) = editor_with(&["a"]);
        let mut rx = editor.subscribe();

        editor.focus_block(&ids[0]).unwrap();
        let mut path_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EditorEvent::PathChanged(_)) {
                path_events += 1;
            }
        }
        assert!(path_events >= 1);

        editor.insert_text("b").unwrap();
        let events: Vec<EditorEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let changed = events
            .iter()
            .filter(|e| matches!(e, EditorEvent::Changed(_)))
            .count();
        assert_eq!(changed, 1);
    }

    proptest! {
        #[test]
        fn prop_orders_and_path_stay_valid(ops in proptest::collection::vec((0u8..4, 0usize..8), 1..30)) {
            let mut editor = Editor::new(registry());
            for (kind, at) in ops {
                let len = editor.content().len();
                match kind {
                    0 | 1 => {
                        editor.insert_block("Paragraph", Some(at), BlockData::default(), kind == 1).unwrap();
                    }
                    2 if len > 0 => {
                        let id = editor.block_at(at % len).unwrap().id.clone();
                        editor.delete_block(&id, true).unwrap();
                    }
                    3 if len > 0 => {
                        let id = editor.block_at(at % len).unwrap().id.clone();
                        editor.move_block(&id, at).unwrap();
                    }
                    _ => {}
                }
                prop_assert_eq!(editor.content().check_orders(), Ok(()));
                let len = editor.content().len();
                prop_assert!(editor.path().current.is_none_or(|c| c < len));
            }
        }
    }
}
