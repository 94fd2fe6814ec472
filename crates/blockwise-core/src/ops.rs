//! Primitive store operations.
//!
//! Every structural change to a [`ContentStore`](crate::ContentStore) is one
//! of these ops. Applying an op yields its inverse, which is what the
//! history stores for undo.

use blockwise_inline::Element;
use serde::{Deserialize, Serialize};

use crate::block::{Align, Block, BlockId};

/// A single reversible change to the block store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BlockOp {
    /// Insert `block` at `block.meta.order`, shifting later blocks down
    InsertBlock { block: Block },
    /// Remove a block, shifting later blocks up
    RemoveBlock { id: BlockId },
    SetValue { id: BlockId, value: Vec<Element> },
    SetDepth { id: BlockId, depth: usize },
    SetAlign { id: BlockId, align: Option<Align> },
    /// Change the plugin kind together with the matching value
    SetType {
        id: BlockId,
        kind: String,
        value: Vec<Element>,
    },
    MoveBlock { id: BlockId, to: usize },
}

impl BlockOp {
    /// The block this op targets.
    pub fn block_id(&self) -> &BlockId {
        match self {
            BlockOp::InsertBlock { block } => &block.id,
            BlockOp::RemoveBlock { id }
            | BlockOp::SetValue { id, .. }
            | BlockOp::SetDepth { id, .. }
            | BlockOp::SetAlign { id, .. }
            | BlockOp::SetType { id, .. }
            | BlockOp::MoveBlock { id, .. } => id,
        }
    }

    /// Returns true if the op changes which blocks exist or where they sit.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            BlockOp::InsertBlock { .. } | BlockOp::RemoveBlock { .. } | BlockOp::MoveBlock { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_json_is_tagged() {
        let op = BlockOp::SetDepth {
            id: BlockId::from("b1"),
            depth: 2,
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], "set_depth");
        assert_eq!(value["id"], "b1");
        assert!(!op.is_structural());
        assert_eq!(op.block_id().as_str(), "b1");
    }
}
