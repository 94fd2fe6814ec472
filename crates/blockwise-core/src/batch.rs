//! Transactional batches and undo/redo.
//!
//! ## Learning: Stage, Validate, Swap
//!
//! Operations inside [`Editor::batch_operations`] run against a clone of
//! the store. Only when the closure succeeds *and* the result validates is
//! the clone swapped in, so a failed batch leaves nothing behind:
//!
//! ```text
//! store ──clone──▶ working ──ops──▶ working' ──validate──▶ store = working'
//!                                      │
//!                                      └── error ──▶ drop working', restore path
//! ```
//!
//! Every applied op hands back its inverse; the inverses of one batch form
//! one undo record.

use blockwise_inline::{InlineDocument, Range};

use crate::block::BlockId;
use crate::content::ContentStore;
use crate::editor::Editor;
use crate::event::{ChangeSet, EditorEvent};
use crate::history::{CoalesceKey, UndoRecord};
use crate::ops::BlockOp;
use crate::path::Path;
use crate::schema::ValidationError;
use crate::{CoreError, CoreResult};

/// State of an open batch.
#[derive(Debug)]
pub(crate) struct Staging {
    working: ContentStore,
    /// Inverses of the applied ops, in application order
    inverses: Vec<BlockOp>,
    /// Blocks touched by any op, first touch first
    touched: Vec<BlockId>,
    path_before: Path,
    coalesce: Option<CoalesceKey>,
    /// Text selection to install once committed
    pending_selection: Option<(BlockId, Option<Range>)>,
}

impl Staging {
    fn new(working: ContentStore, path_before: Path) -> Self {
        Self {
            working,
            inverses: Vec::new(),
            touched: Vec::new(),
            path_before,
            coalesce: None,
            pending_selection: None,
        }
    }
}

impl Editor {
    // ==================== Batches ====================

    /// Runs `f` as one transaction.
    ///
    /// On success the staged content is validated and committed as a single
    /// history entry with a single change notification. On error nothing is
    /// committed and the path is restored. Nested calls join the outer batch.
    pub fn batch_operations<T>(
        &mut self,
        f: impl FnOnce(&mut Editor) -> CoreResult<T>,
    ) -> CoreResult<T> {
        if self.staging.is_some() {
            return f(self);
        }

        self.staging = Some(Staging::new(self.store.clone(), self.path.clone()));
        let result = f(self);
        let Some(staging) = self.staging.take() else {
            return Err(CoreError::InvalidOperation(
                "Batch closed before commit".to_string(),
            ));
        };

        match result {
            Ok(value) => {
                self.commit(staging)?;
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Batch rolled back");
                self.path = staging.path_before;
                Err(e)
            }
        }
    }

    pub fn is_staging(&self) -> bool {
        self.staging.is_some()
    }

    /// The block store as operations currently see it: the working copy
    /// inside a batch, the committed store otherwise.
    pub fn content(&self) -> &ContentStore {
        match &self.staging {
            Some(staging) => &staging.working,
            None => &self.store,
        }
    }

    /// Applies an op to the working copy, opening a batch if none is open.
    ///
    /// Returns the inverse op.
    pub(crate) fn stage(&mut self, op: BlockOp) -> CoreResult<BlockOp> {
        let Some(staging) = self.staging.as_mut() else {
            return self.batch_operations(|editor| editor.stage(op));
        };

        let id = op.block_id().clone();
        let inverse = staging.working.apply(op)?;
        staging.inverses.push(inverse.clone());
        if !staging.touched.contains(&id) {
            staging.touched.push(id);
        }
        Ok(inverse)
    }

    /// Marks the open batch as a text edit that may merge with the previous
    /// history record.
    pub(crate) fn set_coalesce(&mut self, key: CoalesceKey) {
        if let Some(staging) = self.staging.as_mut() {
            staging.coalesce = Some(key);
        }
    }

    pub(crate) fn pending_selection(&self) -> Option<&(BlockId, Option<Range>)> {
        self.staging
            .as_ref()
            .and_then(|staging| staging.pending_selection.as_ref())
    }

    pub(crate) fn set_pending_selection(&mut self, id: BlockId, range: Option<Range>) {
        if let Some(staging) = self.staging.as_mut() {
            staging.pending_selection = Some((id, range));
        }
    }

    fn commit(&mut self, staging: Staging) -> CoreResult<()> {
        let Staging {
            working,
            inverses,
            touched,
            path_before,
            coalesce,
            pending_selection,
        } = staging;

        if let Err(e) = self.check_staged(&working, &touched) {
            tracing::debug!(error = %e, "Batch failed validation");
            self.path = path_before;
            return Err(e.into());
        }

        let changes = self.install(working, &touched);
        if let Some((id, range)) = pending_selection {
            self.apply_selection(&id, range);
        }
        self.path.clamp(self.store.len());
        self.sync_path_selection();

        let recorded = !inverses.is_empty();
        if recorded {
            let coalesce = coalesce.filter(|key| {
                inverses
                    .iter()
                    .all(|op| matches!(op, BlockOp::SetValue { id, .. } if *id == key.block))
            });
            let mut ops = inverses;
            ops.reverse();
            self.history.push(
                UndoRecord::new(ops, path_before.clone(), self.path.clone()).coalescing(coalesce),
            );
        }

        tracing::debug!(
            updated = changes.updated.len(),
            inserted = changes.inserted.len(),
            removed = changes.removed.len(),
            "Batch committed"
        );
        self.notify(changes, recorded, &path_before);
        Ok(())
    }

    fn check_staged(&self, working: &ContentStore, touched: &[BlockId]) -> Result<(), ValidationError> {
        working.check_orders()?;
        for id in touched {
            if let Some(block) = working.get(id) {
                self.registry().validate_block(block)?;
            }
        }
        Ok(())
    }

    /// Swaps in new content and rebuilds the inline documents it affects.
    fn install(&mut self, working: ContentStore, touched: &[BlockId]) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for id in touched {
            match (self.store.get(id), working.get(id)) {
                (Some(old), Some(new)) if old != new => changes.updated.push(id.clone()),
                (None, Some(_)) => changes.inserted.push(id.clone()),
                (Some(_), None) => changes.removed.push(id.clone()),
                _ => {}
            }
        }

        self.store = working;
        for id in &changes.removed {
            self.inline.remove(id);
        }
        for id in changes.inserted.iter().chain(&changes.updated) {
            self.rebuild_inline(id);
        }
        changes
    }

    /// Recreates a block's inline document, keeping its selection if it
    /// still fits.
    pub(crate) fn rebuild_inline(&mut self, id: &BlockId) {
        let Some(block) = self.store.get(id) else {
            return;
        };
        let mut doc = InlineDocument::with_extensions(
            block.value.clone(),
            self.registry().extensions_for(&block.kind),
        );
        if let Some(range) = self.inline.get(id).and_then(|old| old.selection().cloned()) {
            if doc.select(range).is_err() {
                if let Some(end) = doc.end_point() {
                    let _ = doc.select(Range::collapsed(end));
                }
            }
        }
        self.inline.insert(id.clone(), doc);
    }

    /// Gives `id` the selection `range` and takes it from every other block.
    fn apply_selection(&mut self, id: &BlockId, range: Option<Range>) {
        for (other, doc) in self.inline.iter_mut() {
            if other != id {
                doc.deselect();
                continue;
            }
            match &range {
                Some(range) => {
                    if let Err(e) = doc.select(range.clone()) {
                        tracing::warn!(block = %id, error = %e, "Dropping stale selection");
                        doc.deselect();
                    }
                }
                None => doc.deselect(),
            }
        }
    }

    /// Mirrors the inline documents' selection into the path.
    fn sync_path_selection(&mut self) {
        self.path.selection = self
            .inline
            .values()
            .find_map(|doc| doc.selection().cloned());
    }

    fn notify(&self, changes: ChangeSet, recorded: bool, path_before: &Path) {
        if !changes.is_empty() {
            self.event_bus.emit(EditorEvent::Changed(changes));
        }
        if recorded {
            self.event_bus.emit(EditorEvent::HistoryChanged {
                can_undo: self.history.can_undo(),
                can_redo: self.history.can_redo(),
            });
        }
        if self.path != *path_before {
            self.event_bus.emit(EditorEvent::PathChanged(self.path.clone()));
        }
    }

    // ==================== History ====================

    /// Reverts the last history record; returns false when there is none.
    pub fn undo(&mut self) -> CoreResult<bool> {
        self.ensure_idle("undo")?;
        let Some(record) = self.history.pop_undo() else {
            return Ok(false);
        };

        match self.replay(&record) {
            Ok((inverses, changes, path_before)) => {
                self.history.push_redo(record.reversed(inverses));
                tracing::debug!("Undo");
                self.notify(changes, true, &path_before);
                Ok(true)
            }
            Err(e) => {
                self.history.push_undo(record);
                Err(e)
            }
        }
    }

    /// Re-applies the last undone record; returns false when there is none.
    pub fn redo(&mut self) -> CoreResult<bool> {
        self.ensure_idle("redo")?;
        let Some(record) = self.history.pop_redo() else {
            return Ok(false);
        };

        match self.replay(&record) {
            Ok((inverses, changes, path_before)) => {
                self.history.push_undo(record.reversed(inverses));
                tracing::debug!("Redo");
                self.notify(changes, true, &path_before);
                Ok(true)
            }
            Err(e) => {
                self.history.push_redo(record);
                Err(e)
            }
        }
    }

    fn ensure_idle(&self, action: &str) -> CoreResult<()> {
        if self.is_staging() {
            return Err(CoreError::InvalidOperation(format!(
                "Cannot {action} inside a batch"
            )));
        }
        Ok(())
    }

    /// Applies a record's ops to the store and restores its path.
    fn replay(&mut self, record: &UndoRecord) -> CoreResult<(Vec<BlockOp>, ChangeSet, Path)> {
        let path_before = self.path.clone();
        let mut working = self.store.clone();
        let mut inverses = Vec::with_capacity(record.ops.len());
        let mut touched = Vec::new();
        for op in &record.ops {
            let id = op.block_id().clone();
            inverses.push(working.apply(op.clone())?);
            if !touched.contains(&id) {
                touched.push(id);
            }
        }

        let changes = self.install(working, &touched);
        self.restore_path(record.path.clone());
        Ok((inverses, changes, path_before))
    }

    fn restore_path(&mut self, mut path: Path) {
        path.clamp(self.store.len());
        let selection = path.selection.take();
        let holder = path
            .current
            .and_then(|order| self.store.by_order(order))
            .map(|block| block.id.clone());
        self.path = path;

        match holder {
            Some(id) => self.apply_selection(&id, selection),
            None => {
                for doc in self.inline.values_mut() {
                    doc.deselect();
                }
            }
        }
        self.sync_path_selection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockData;
    use crate::plugin::Plugin;
    use crate::registry::PluginRegistry;
    use crate::schema::{ElementDef, ElementSchema};
    use blockwise_inline::Element;

    fn editor() -> Editor {
        let registry = PluginRegistry::with_plugins([Plugin::block(
            "Paragraph",
            ElementSchema::new(ElementDef::new("paragraph").allow_injected()),
        )])
        .unwrap();
        Editor::new(registry)
    }

    fn paragraph(text: &str) -> BlockData {
        BlockData::default().with_value(vec![Element::new("paragraph").with_text(text)])
    }

    #[test]
    fn test_batch_commits_once() {
        let mut editor = editor();
        let mut rx = editor.subscribe();

        editor
            .batch_operations(|editor| {
                editor.insert_block("Paragraph", None, paragraph("a"), false)?;
                editor.insert_block("Paragraph", None, paragraph("b"), false)?;
                assert_eq!(editor.content().len(), 2);
                Ok(())
            })
            .unwrap();

        assert_eq!(editor.content().len(), 2);
        assert!(editor.can_undo());
        match rx.try_recv().unwrap() {
            EditorEvent::Changed(changes) => assert_eq!(changes.inserted.len(), 2),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            EditorEvent::HistoryChanged { can_undo: true, can_redo: false }
        ));

        assert!(editor.undo().unwrap());
        assert!(editor.content().is_empty());
    }

    #[test]
    fn test_failed_batch_applies_nothing() {
        let mut editor = editor();
        editor
            .insert_block("Paragraph", None, paragraph("keep"), true)
            .unwrap();
        let path = editor.path().clone();

        let result: CoreResult<()> = editor.batch_operations(|editor| {
            editor.insert_block("Paragraph", None, paragraph("gone"), true)?;
            editor.set_selected(vec![0, 1], None);
            Err(CoreError::InvalidOperation("abort".into()))
        });

        assert!(result.is_err());
        assert_eq!(editor.content().len(), 1);
        assert_eq!(editor.path(), &path);
    }

    #[test]
    fn test_invalid_content_rolls_back() {
        let mut editor = editor();
        let id = editor
            .insert_block("Paragraph", None, paragraph("x"), false)
            .unwrap();

        let result = editor.batch_operations(|editor| {
            editor.stage(BlockOp::SetValue {
                id: id.clone(),
                value: vec![Element::new("heading").with_text("x")],
            })
        });

        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(editor.block(&id).unwrap().value[0].kind, "paragraph");
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut editor = editor();
        let id = editor
            .insert_block("Paragraph", None, paragraph("x"), true)
            .unwrap();
        editor
            .change_block_depth(&id, crate::editor::DepthChange::Increase)
            .unwrap();
        assert_eq!(editor.block(&id).unwrap().depth(), 1);

        assert!(editor.undo().unwrap());
        assert_eq!(editor.block(&id).unwrap().depth(), 0);
        assert!(editor.can_redo());

        assert!(editor.redo().unwrap());
        assert_eq!(editor.block(&id).unwrap().depth(), 1);

        assert!(editor.undo().unwrap());
        assert!(editor.undo().unwrap());
        assert!(editor.content().is_empty());
        assert_eq!(editor.path().current, None);
        assert!(!editor.undo().unwrap());
    }

    #[test]
    fn test_undo_inside_batch_rejected() {
        let mut editor = editor();
        let result = editor.batch_operations(|editor| editor.undo());
        assert!(matches!(result, Err(CoreError::InvalidOperation(_))));
    }
}
