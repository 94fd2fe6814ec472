//! Undo/redo history.
//!
//! ## Learning: Storing Inverses
//!
//! Every [`BlockOp`] applied to the store returns the op that reverts it.
//! A committed batch is remembered as those inverses, so undoing is just
//! applying them, and applying them yields the ops for redo. No snapshot of
//! the document is ever kept.
//!
//! Rapid typing in one block is coalesced into a single record, the way a
//! text editor merges keystrokes into one undo step.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::block::BlockId;
use crate::ops::BlockOp;
use crate::path::Path;

/// The kind of text edit a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Insert,
    Delete,
}

/// Records with equal keys made in quick succession merge into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalesceKey {
    pub block: BlockId,
    pub kind: EditKind,
}

/// One undo (or redo) step.
#[derive(Debug, Clone)]
pub struct UndoRecord {
    /// Ops to apply, in order
    pub ops: Vec<BlockOp>,
    /// Path to restore once `ops` are applied
    pub path: Path,
    /// Path to restore when this record is itself reverted
    pub reverse_path: Path,
    pub coalesce: Option<CoalesceKey>,
    timestamp: Option<Instant>,
}

impl UndoRecord {
    pub fn new(ops: Vec<BlockOp>, path: Path, reverse_path: Path) -> Self {
        Self {
            ops,
            path,
            reverse_path,
            coalesce: None,
            timestamp: Some(Instant::now()),
        }
    }

    pub fn coalescing(mut self, key: Option<CoalesceKey>) -> Self {
        self.coalesce = key;
        self
    }

    /// Builds the record that undoes this one, from the inverses produced by
    /// applying `ops`.
    pub fn reversed(self, mut inverses: Vec<BlockOp>) -> Self {
        inverses.reverse();
        Self {
            ops: inverses,
            path: self.reverse_path,
            reverse_path: self.path,
            coalesce: None,
            timestamp: None,
        }
    }
}

/// Manages undo/redo stacks.
///
/// ## Learning: VecDeque
///
/// The undo stack is a `VecDeque` so the oldest record can be dropped from
/// the front when the limit is reached, while undo pops from the back.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    max_size: usize,
    coalesce_threshold: Duration,
}

impl History {
    pub fn new(max_size: usize, coalesce_threshold: Duration) -> Self {
        Self {
            undo_stack: VecDeque::with_capacity(max_size.min(1024)),
            redo_stack: Vec::new(),
            max_size,
            coalesce_threshold,
        }
    }

    /// Pushes a record for a fresh edit.
    ///
    /// Clears the redo stack. Merges with the previous record when both
    /// carry the same coalesce key and arrive within the threshold.
    pub fn push(&mut self, record: UndoRecord) {
        self.redo_stack.clear();

        if let Some(last) = self.undo_stack.back_mut() {
            let recent = last
                .timestamp
                .is_some_and(|t| t.elapsed() < self.coalesce_threshold);
            if recent && record.coalesce.is_some() && last.coalesce == record.coalesce {
                // Newest edit reverts first
                let mut ops = record.ops;
                ops.append(&mut last.ops);
                last.ops = ops;
                last.reverse_path = record.reverse_path;
                last.timestamp = Some(Instant::now());
                return;
            }
        }

        self.push_undo(record);
    }

    /// Pushes onto the undo stack without touching redo or coalescing.
    pub fn push_undo(&mut self, record: UndoRecord) {
        self.undo_stack.push_back(record);
        while self.undo_stack.len() > self.max_size {
            self.undo_stack.pop_front();
        }
    }

    pub fn push_redo(&mut self, record: UndoRecord) {
        self.redo_stack.push(record);
    }

    pub fn pop_undo(&mut self) -> Option<UndoRecord> {
        self.undo_stack.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<UndoRecord> {
        self.redo_stack.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
