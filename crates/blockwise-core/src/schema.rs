//! Element schemas: which element trees a plugin accepts.
//!
//! A schema names a root element type and declares, for every element type
//! it uses, the fixed `nodeType`, the default props and the allowed child
//! element types. Element types without declared children are leaves: they
//! hold text, and may opt into accepting elements of inline plugins.

use std::collections::HashSet;

use blockwise_inline::{Descendant, Element, NodePath, NodeType, Props};
use serde_json::Value;

/// Declaration of one element type.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDef {
    pub kind: String,
    pub node_type: NodeType,
    /// Props stamped on every new element of this type
    pub props: Props,
    /// Allowed child element types; empty for leaves
    pub children: Vec<String>,
    /// Leaf accepts elements contributed by inline plugins
    pub allow_injected: bool,
}

impl ElementDef {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            node_type: NodeType::Block,
            props: Props::new(),
            children: Vec::new(),
            allow_injected: false,
        }
    }

    pub fn node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_injected(mut self) -> Self {
        self.allow_injected = true;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Creates an empty element of this type with the default props.
    pub fn instantiate(&self) -> Element {
        let mut el = Element::new(self.kind.clone()).with_node_type(self.node_type);
        for (key, value) in &self.props {
            el.set_prop(key.clone(), value.clone());
        }
        el
    }
}

/// The element tree a plugin accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSchema {
    root: String,
    elements: Vec<ElementDef>,
}

impl ElementSchema {
    /// Creates a schema whose root is `root`.
    pub fn new(root: ElementDef) -> Self {
        Self {
            root: root.kind.clone(),
            elements: vec![root],
        }
    }

    /// Declares another element type.
    pub fn with_element(mut self, def: ElementDef) -> Self {
        self.elements.push(def);
        self
    }

    /// Adds or replaces the declaration for `def.kind`.
    pub fn upsert(&mut self, def: ElementDef) {
        match self.elements.iter_mut().find(|el| el.kind == def.kind) {
            Some(existing) => *existing = def,
            None => self.elements.push(def),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_def(&self) -> Option<&ElementDef> {
        self.get(&self.root)
    }

    pub fn get(&self, kind: &str) -> Option<&ElementDef> {
        self.elements.iter().find(|el| el.kind == kind)
    }

    pub fn elements(&self) -> &[ElementDef] {
        &self.elements
    }

    /// Checks the declarations themselves, at registration time.
    pub fn validate_config(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();
        for def in &self.elements {
            if !seen.insert(def.kind.as_str()) {
                return Err(ConfigurationError::DuplicateElement(def.kind.clone()));
            }
        }

        if self.root_def().is_none() {
            return Err(ConfigurationError::MissingRoot(self.root.clone()));
        }

        for def in &self.elements {
            if def.allow_injected && !def.is_leaf() {
                return Err(ConfigurationError::InjectionOnNonLeaf(def.kind.clone()));
            }
            for child in &def.children {
                if self.get(child).is_none() {
                    return Err(ConfigurationError::UnknownChild {
                        parent: def.kind.clone(),
                        child: child.clone(),
                    });
                }
            }
        }

        self.check_cycles(&self.root, &mut Vec::new())
    }

    fn check_cycles<'a>(
        &'a self,
        kind: &'a str,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), ConfigurationError> {
        if stack.contains(&kind) {
            return Err(ConfigurationError::ChildCycle(kind.to_string()));
        }
        let Some(def) = self.get(kind) else {
            return Ok(());
        };
        stack.push(kind);
        for child in &def.children {
            self.check_cycles(child, stack)?;
        }
        stack.pop();
        Ok(())
    }

    /// Builds the default element tree: one element of every declared child.
    pub fn default_tree(&self) -> Vec<Element> {
        vec![self.build(&self.root)]
    }

    fn build(&self, kind: &str) -> Element {
        let Some(def) = self.get(kind) else {
            return Element::new(kind).with_text("");
        };
        let mut el = def.instantiate();
        el.children = if def.is_leaf() {
            vec![Descendant::text("")]
        } else {
            def.children
                .iter()
                .map(|child| Descendant::Element(self.build(child)))
                .collect()
        };
        el
    }

    /// Path of the first leaf element that holds editable text.
    pub fn text_leaf_path(&self, value: &[Element]) -> Option<NodePath> {
        fn walk(schema: &ElementSchema, el: &Element, path: &mut NodePath) -> Option<NodePath> {
            let def = schema.get(&el.kind)?;
            if def.is_leaf() {
                return (def.node_type != NodeType::Void).then(|| path.clone());
            }
            for (ix, child) in el.children.iter().enumerate() {
                if let Descendant::Element(child) = child {
                    path.push(ix);
                    let found = walk(schema, child, path);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
            }
            None
        }

        value
            .iter()
            .enumerate()
            .find_map(|(ix, root)| walk(self, root, &mut vec![ix]))
    }

    /// Checks a block value against this schema.
    ///
    /// `injectable` decides whether an element type belongs to an inline
    /// plugin and may therefore appear inside leaves that accept injection.
    pub fn validate_value(
        &self,
        value: &[Element],
        injectable: &dyn Fn(&Element) -> bool,
    ) -> Result<(), ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::EmptyValue);
        }
        for root in value {
            if root.kind != self.root {
                return Err(ValidationError::UnexpectedRoot {
                    expected: self.root.clone(),
                    found: root.kind.clone(),
                });
            }
            self.validate_element(root, injectable)?;
        }
        Ok(())
    }

    fn validate_element(
        &self,
        el: &Element,
        injectable: &dyn Fn(&Element) -> bool,
    ) -> Result<(), ValidationError> {
        let def = self
            .get(&el.kind)
            .ok_or_else(|| ValidationError::UnknownElement(el.kind.clone()))?;

        if el.children.is_empty() {
            return Err(ValidationError::EmptyElement(el.kind.clone()));
        }

        for child in &el.children {
            match child {
                Descendant::Text(_) if def.is_leaf() => {}
                Descendant::Text(_) => {
                    return Err(ValidationError::TextInContainer(el.kind.clone()));
                }
                Descendant::Element(child) if def.is_leaf() => {
                    if !(def.allow_injected && injectable(child)) {
                        return Err(ValidationError::UnexpectedChild {
                            parent: el.kind.clone(),
                            child: child.kind.clone(),
                        });
                    }
                    if child.children.iter().any(|c| c.as_element().is_some()) {
                        return Err(ValidationError::UnexpectedChild {
                            parent: child.kind.clone(),
                            child: "element".to_string(),
                        });
                    }
                }
                Descendant::Element(child) => {
                    if !def.children.iter().any(|kind| *kind == child.kind) {
                        return Err(ValidationError::UnexpectedChild {
                            parent: el.kind.clone(),
                            child: child.kind.clone(),
                        });
                    }
                    self.validate_element(child, injectable)?;
                }
            }
        }
        Ok(())
    }
}

/// Errors raised when plugins are registered or extended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Element '{0}' has children and cannot accept injected elements")]
    InjectionOnNonLeaf(String),

    #[error("Root element '{0}' is not declared")]
    MissingRoot(String),

    #[error("Element '{parent}' declares unknown child '{child}'")]
    UnknownChild { parent: String, child: String },

    #[error("Element '{0}' is declared twice")]
    DuplicateElement(String),

    #[error("Element '{0}' contains itself")]
    ChildCycle(String),

    #[error("Inline plugin '{0}' must have an inline root element")]
    InlineRootNotInline(String),

    #[error("Plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    #[error("Command '{0}' is already registered")]
    DuplicateCommand(String),
}

/// Errors raised when content does not satisfy the schema or the order rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Block value is empty")]
    EmptyValue,

    #[error("Expected root element '{expected}', found '{found}'")]
    UnexpectedRoot { expected: String, found: String },

    #[error("Element '{0}' is not declared by the block's plugin")]
    UnknownElement(String),

    #[error("Element '{0}' has no children")]
    EmptyElement(String),

    #[error("Element '{0}' holds child elements and cannot contain text")]
    TextInContainer(String),

    #[error("Element '{parent}' cannot contain '{child}'")]
    UnexpectedChild { parent: String, child: String },

    #[error("Unknown block type: {0}")]
    UnknownBlockType(String),

    #[error("Block orders {0:?} are not a permutation of 0..N")]
    OrderNotPermutation(Vec<usize>),

    #[error("Block stored under '{key}' has id '{id}'")]
    IdMismatch { key: String, id: String },

    #[error("Block {id}: {reason}")]
    InBlock {
        id: String,
        reason: Box<ValidationError>,
    },
}

impl ValidationError {
    /// Attaches the id of the offending block.
    pub fn in_block(self, id: impl ToString) -> Self {
        ValidationError::InBlock {
            id: id.to_string(),
            reason: Box::new(self),
        }
    }
}
