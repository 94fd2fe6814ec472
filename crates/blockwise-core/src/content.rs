//! The block store.
//!
//! ## Learning: Two Views of One Collection
//!
//! Blocks are stored in a `HashMap` keyed by id (the persisted shape), but
//! most editing happens by position. `meta.order` is the link between the
//! two: every mutation here keeps the orders a permutation of `0..N`, so
//! "the block at order `i`" is always well defined between operations.

use std::collections::{BTreeMap, HashMap, HashSet};

use blockwise_inline::InlineDocument;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::block::{Block, BlockId};
use crate::config::LoadPolicy;
use crate::ops::BlockOp;
use crate::registry::PluginRegistry;
use crate::schema::ValidationError;
use crate::{CoreError, CoreResult, LookupTarget};

/// Blocks of one document, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentStore {
    blocks: HashMap<BlockId, Block>,
    /// Ids in insertion order
    insertion: Vec<BlockId>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from blocks as they are, without touching their orders.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let mut store = Self::new();
        for block in blocks {
            if store.blocks.contains_key(&block.id) {
                continue;
            }
            store.insertion.push(block.id.clone());
            store.blocks.insert(block.id.clone(), block);
        }
        store
    }

    // ==================== Queries ====================

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Like [`get`](Self::get), failing with a lookup miss.
    pub fn require(&self, id: &BlockId) -> CoreResult<&Block> {
        self.get(id)
            .ok_or_else(|| CoreError::LookupMiss(LookupTarget::Block(id.clone())))
    }

    pub fn by_order(&self, order: usize) -> Option<&Block> {
        self.blocks.values().find(|block| block.meta.order == order)
    }

    /// Blocks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.insertion.iter().filter_map(|id| self.blocks.get(id))
    }

    /// Blocks sorted by `meta.order`.
    pub fn ordered(&self) -> Vec<&Block> {
        let mut blocks: Vec<&Block> = self.blocks.values().collect();
        blocks.sort_by(|a, b| a.meta.order.cmp(&b.meta.order).then(a.id.cmp(&b.id)));
        blocks
    }

    pub fn ordered_ids(&self) -> Vec<BlockId> {
        self.ordered().into_iter().map(|block| block.id.clone()).collect()
    }

    // ==================== Mutation ====================

    /// Inserts a block at its `meta.order` (clamped), shifting later blocks.
    ///
    /// Returns the order the block landed on.
    pub(crate) fn insert(&mut self, mut block: Block) -> CoreResult<usize> {
        if self.blocks.contains_key(&block.id) {
            return Err(CoreError::InvalidOperation(format!(
                "Block {} already exists",
                block.id
            )));
        }

        let order = block.meta.order.min(self.len());
        for other in self.blocks.values_mut() {
            if other.meta.order >= order {
                other.meta.order += 1;
            }
        }
        block.meta.order = order;
        self.insertion.push(block.id.clone());
        self.blocks.insert(block.id.clone(), block);
        Ok(order)
    }

    /// Removes a block, closing the gap it leaves in the orders.
    pub(crate) fn remove(&mut self, id: &BlockId) -> CoreResult<Block> {
        let block = self
            .blocks
            .remove(id)
            .ok_or_else(|| CoreError::LookupMiss(LookupTarget::Block(id.clone())))?;
        self.insertion.retain(|other| other != id);
        for other in self.blocks.values_mut() {
            if other.meta.order > block.meta.order {
                other.meta.order -= 1;
            }
        }
        Ok(block)
    }

    /// Moves a block to order `to` (clamped); returns its previous order.
    pub(crate) fn move_to(&mut self, id: &BlockId, to: usize) -> CoreResult<usize> {
        let from = self.require(id)?.meta.order;
        let to = to.min(self.len().saturating_sub(1));

        for block in self.blocks.values_mut() {
            let order = block.meta.order;
            if block.id == *id {
                block.meta.order = to;
            } else if from < to && order > from && order <= to {
                block.meta.order -= 1;
            } else if to < from && order >= to && order < from {
                block.meta.order += 1;
            }
        }
        Ok(from)
    }

    fn block_mut(&mut self, id: &BlockId) -> CoreResult<&mut Block> {
        self.blocks
            .get_mut(id)
            .ok_or_else(|| CoreError::LookupMiss(LookupTarget::Block(id.clone())))
    }

    /// Applies an op and returns the op that reverts it.
    pub fn apply(&mut self, op: BlockOp) -> CoreResult<BlockOp> {
        let inverse = match op {
            BlockOp::InsertBlock { block } => {
                let id = block.id.clone();
                self.insert(block)?;
                BlockOp::RemoveBlock { id }
            }
            BlockOp::RemoveBlock { id } => {
                let block = self.remove(&id)?;
                BlockOp::InsertBlock { block }
            }
            BlockOp::SetValue { id, value } => {
                let block = self.block_mut(&id)?;
                let value = std::mem::replace(&mut block.value, value);
                BlockOp::SetValue { id, value }
            }
            BlockOp::SetDepth { id, depth } => {
                let block = self.block_mut(&id)?;
                let depth = std::mem::replace(&mut block.meta.depth, depth);
                BlockOp::SetDepth { id, depth }
            }
            BlockOp::SetAlign { id, align } => {
                let block = self.block_mut(&id)?;
                let align = std::mem::replace(&mut block.meta.align, align);
                BlockOp::SetAlign { id, align }
            }
            BlockOp::SetType { id, kind, value } => {
                let block = self.block_mut(&id)?;
                let kind = std::mem::replace(&mut block.kind, kind);
                let value = std::mem::replace(&mut block.value, value);
                BlockOp::SetType { id, kind, value }
            }
            BlockOp::MoveBlock { id, to } => {
                let from = self.move_to(&id, to)?;
                BlockOp::MoveBlock { id, to: from }
            }
        };
        Ok(inverse)
    }

    // ==================== Validation ====================

    /// Checks that orders form a permutation of `0..N`.
    pub fn check_orders(&self) -> Result<(), ValidationError> {
        let mut orders: Vec<usize> = self.blocks.values().map(|b| b.meta.order).collect();
        orders.sort_unstable();
        if orders.iter().enumerate().all(|(ix, order)| ix == *order) {
            Ok(())
        } else {
            Err(ValidationError::OrderNotPermutation(orders))
        }
    }

    /// Checks orders and every block against its plugin schema.
    pub fn validate(&self, registry: &PluginRegistry) -> Result<(), ValidationError> {
        self.check_orders()?;
        for block in self.iter() {
            registry.validate_block(block)?;
        }
        Ok(())
    }

    // ==================== Persistence ====================

    /// Parses the persisted `{ [blockId]: Block }` format.
    pub fn from_json(json: &str, registry: &PluginRegistry, policy: LoadPolicy) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value, registry, policy)
    }

    pub fn from_value(value: Value, registry: &PluginRegistry, policy: LoadPolicy) -> CoreResult<Self> {
        let raw: BTreeMap<String, Block> = serde_json::from_value(value)?;

        let mut blocks = Vec::with_capacity(raw.len());
        let mut seen = HashSet::new();
        for (key, mut block) in raw {
            if block.id.as_str() != key {
                match policy {
                    LoadPolicy::Strict => {
                        return Err(ValidationError::IdMismatch {
                            key,
                            id: block.id.to_string(),
                        }
                        .into());
                    }
                    LoadPolicy::Repair => {
                        tracing::warn!(key = %key, id = %block.id, "Block id does not match its key, using the key");
                        block.id = BlockId::from(key);
                    }
                }
            }
            if !seen.insert(block.id.clone()) {
                continue;
            }

            let known = registry
                .get(&block.kind)
                .is_some_and(|plugin| !plugin.is_inline());
            if !known {
                match policy {
                    LoadPolicy::Strict => {
                        return Err(ValidationError::UnknownBlockType(block.kind).in_block(&block.id).into());
                    }
                    LoadPolicy::Repair => {
                        tracing::warn!(id = %block.id, kind = %block.kind, "Dropping block of unknown type");
                        continue;
                    }
                }
            }

            if policy == LoadPolicy::Repair {
                block.value = InlineDocument::with_extensions(
                    block.value,
                    registry.extensions_for(&block.kind),
                )
                .into_children();
                if block.value.is_empty() {
                    tracing::warn!(id = %block.id, "Filling empty block with the default tree");
                    if let Some(plugin) = registry.get(&block.kind) {
                        block.value = plugin.schema.default_tree();
                    }
                }
            }
            blocks.push(block);
        }

        if policy == LoadPolicy::Repair {
            blocks.sort_by(|a, b| a.meta.order.cmp(&b.meta.order).then(a.id.cmp(&b.id)));
            for (ix, block) in blocks.iter_mut().enumerate() {
                if block.meta.order != ix {
                    tracing::warn!(id = %block.id, from = block.meta.order, to = ix, "Re-indexing block order");
                    block.meta.order = ix;
                }
            }
        }

        let store = Self::from_blocks(blocks);
        store.validate(registry)?;
        tracing::debug!(blocks = store.len(), ?policy, "Loaded document");
        Ok(store)
    }

    pub fn to_value(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for ContentStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for block in self.ordered() {
            map.serialize_entry(block.id.as_str(), block)?;
        }
        map.end()
    }
}
