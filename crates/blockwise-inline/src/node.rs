//! Element and text nodes of a block's inline document.
//!
//! ## Learning: Untagged Enums
//!
//! The persisted format mixes elements (`{ id, type, children }`) and text
//! leaves (`{ text, bold, ... }`) in the same `children` array without a
//! discriminator field. `#[serde(untagged)]` tries each variant in order, so
//! `Element` is listed first: a text leaf never carries a `type` key and falls
//! through to `Text`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form element properties (`props` in the persisted format).
pub type Props = BTreeMap<String, Value>;

/// Key under which an element's [`NodeType`] is stored in its props.
pub const NODE_TYPE_PROP: &str = "nodeType";

/// Generates a fresh element id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Render and selection semantics of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Block-level container of text and inline elements
    #[default]
    Block,
    /// Inline element living between text leaves (links, mentions)
    Inline,
    /// Element without editable text (images, dividers)
    Void,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Block => "block",
            NodeType::Inline => "inline",
            NodeType::Void => "void",
        }
    }

    /// Parses the value stored under `props.nodeType`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "block" => Some(NodeType::Block),
            "inline" => Some(NodeType::Inline),
            "void" => Some(NodeType::Void),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Formatting marks carried by a text leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
}

impl Marks {
    /// Returns true if no mark is set.
    pub fn is_empty(&self) -> bool {
        *self == Marks::default()
    }
}

/// A run of text with uniform marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    #[serde(flatten)]
    pub marks: Marks,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn with_marks(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }

    pub fn empty() -> Self {
        Self::new("")
    }
}

/// A child of an element: either a nested element or a text leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descendant {
    Element(Element),
    Text(Text),
}

impl Descendant {
    pub fn text(text: impl Into<String>) -> Self {
        Descendant::Text(Text::new(text))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Descendant::Element(el) => Some(el),
            Descendant::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Descendant::Text(t) => Some(t),
            Descendant::Element(_) => None,
        }
    }

    /// Concatenated text of this node and everything below it.
    pub fn text_content(&self) -> String {
        match self {
            Descendant::Text(t) => t.text.clone(),
            Descendant::Element(el) => el.text_content(),
        }
    }
}

impl From<Element> for Descendant {
    fn from(value: Element) -> Self {
        Descendant::Element(value)
    }
}

impl From<Text> for Descendant {
    fn from(value: Text) -> Self {
        Descendant::Text(value)
    }
}

/// A tagged node of the inline tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default = "generate_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub children: Vec<Descendant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,
}

impl Element {
    /// Creates an element with a fresh id and no children.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            kind: kind.into(),
            children: Vec::new(),
            props: None,
        }
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Descendant>) -> Self {
        self.children = children.into_iter().collect();
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_children([Descendant::text(text)])
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = Some(props);
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_prop(key, value);
        self
    }

    pub fn with_node_type(self, node_type: NodeType) -> Self {
        self.with_prop(NODE_TYPE_PROP, node_type.as_str())
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.as_ref().and_then(|props| props.get(key))
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.prop(key).and_then(Value::as_str)
    }

    pub fn set_prop(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.props
            .get_or_insert_with(Props::new)
            .insert(key.into(), value.into());
    }

    /// The node type declared in props; elements without one are blocks.
    pub fn node_type(&self) -> NodeType {
        self.prop(NODE_TYPE_PROP)
            .and_then(NodeType::from_value)
            .unwrap_or_default()
    }

    pub fn is_void(&self) -> bool {
        self.node_type() == NodeType::Void
    }

    pub fn is_inline(&self) -> bool {
        self.node_type() == NodeType::Inline
    }

    /// Returns true if every child is a text leaf or an inline element.
    pub fn has_inline_children(&self) -> bool {
        self.children.iter().all(|child| match child {
            Descendant::Text(_) => true,
            Descendant::Element(el) => el.is_inline(),
        })
    }

    /// Concatenated text of every leaf below this element.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Deep copy with fresh ids on this element and every nested element.
    pub fn clone_with_new_ids(&self) -> Element {
        Element {
            id: generate_id(),
            kind: self.kind.clone(),
            props: self.props.clone(),
            children: self
                .children
                .iter()
                .map(|child| match child {
                    Descendant::Element(el) => Descendant::Element(el.clone_with_new_ids()),
                    Descendant::Text(t) => Descendant::Text(t.clone()),
                })
                .collect(),
        }
    }
}

fn collect_text(children: &[Descendant], out: &mut String) {
    for child in children {
        match child {
            Descendant::Text(t) => out.push_str(&t.text),
            Descendant::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Concatenated text of a list of root elements.
pub fn roots_text(roots: &[Element]) -> String {
    roots.iter().map(Element::text_content).collect()
}
