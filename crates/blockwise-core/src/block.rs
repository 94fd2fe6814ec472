//! Blocks: the top-level units of a document.
//!
//! ## Learning: Newtype Pattern
//!
//! `BlockId` wraps a `String` rather than being a bare `String`:
//! - The compiler refuses to mix block ids with element ids or block types
//! - `#[serde(transparent)]` keeps the persisted form a plain string

use blockwise_inline::{Element, roots_text};
use serde::{Deserialize, Serialize};

/// Unique identifier for a block.
///
/// Immutable once assigned; generated as a UUID v4 when absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Creates a new unique block ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BlockId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Horizontal alignment of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    pub fn as_str(&self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Align::Left),
            "center" => Some(Align::Center),
            "right" | "end" => Some(Align::Right),
            _ => None,
        }
    }
}

/// Layout metadata of a block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Position in the document, `0..N-1`
    pub order: usize,
    /// Indentation level
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
}

/// A block of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Plugin kind that owns this block
    #[serde(rename = "type")]
    pub kind: String,
    /// Inline content: root elements of the block
    pub value: Vec<Element>,
    pub meta: BlockMeta,
}

impl Block {
    /// Creates a block with a fresh id.
    pub fn new(kind: impl Into<String>, value: Vec<Element>, order: usize) -> Self {
        Self {
            id: BlockId::new(),
            kind: kind.into(),
            value,
            meta: BlockMeta {
                order,
                ..BlockMeta::default()
            },
        }
    }

    pub fn order(&self) -> usize {
        self.meta.order
    }

    pub fn depth(&self) -> usize {
        self.meta.depth
    }

    /// Concatenated text of the block's content.
    pub fn text(&self) -> String {
        roots_text(&self.value)
    }
}

/// Caller-supplied data for a new block; every field is optional.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub id: Option<BlockId>,
    pub value: Option<Vec<Element>>,
    pub depth: Option<usize>,
    pub align: Option<Align>,
}

impl BlockData {
    pub fn with_id(mut self, id: impl Into<BlockId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_value(mut self, value: Vec<Element>) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }
}

/// Partial update of a block; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct BlockPatch {
    pub value: Option<Vec<Element>>,
    pub depth: Option<usize>,
    /// `Some(None)` clears the alignment
    pub align: Option<Option<Align>>,
}

impl BlockPatch {
    pub fn value(value: Vec<Element>) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn depth(depth: usize) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    pub fn align(align: Option<Align>) -> Self {
        Self {
            align: Some(align),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.depth.is_none() && self.align.is_none()
    }
}
