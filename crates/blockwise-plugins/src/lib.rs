//! # Blockwise Plugins
//!
//! The stock content plugins. Each one is a plain [`Plugin`] value built
//! by a function, so hosts can register the full set with
//! [`default_registry`] or pick, reorder and [`extend`](Plugin::extend)
//! individual plugins.
//!
//! ## Registration Order Matters
//!
//! HTML import tries plugins in registration order and the first parser
//! returning `Some` wins. Plugins that claim a shared tag only when a
//! `data-type` attribute matches (callout, accordion, todo list) simply
//! return `None` for everything else, so they can sit anywhere in the list.

pub mod accordion;
pub mod link;
pub mod lists;
pub mod media;
pub mod text;

use blockwise_core::parsers::ParseContext;
use blockwise_core::{ConfigurationError, ElementDef, HtmlElement, Plugin, PluginRegistry};
use blockwise_inline::{Descendant, Element};

pub use accordion::accordion;
pub use link::link;
pub use lists::{bulleted_list, numbered_list, todo_list};
pub use media::{ImageOptions, divider, image, image_with};
pub use text::{blockquote, callout, code, heading, paragraph};

/// Every stock plugin, in registration order.
pub fn default_plugins() -> Vec<Plugin> {
    vec![
        paragraph(),
        heading(1),
        heading(2),
        heading(3),
        blockquote(),
        callout(),
        code(),
        divider(),
        image(),
        todo_list(),
        bulleted_list(),
        numbered_list(),
        accordion(),
        link(),
    ]
}

/// A registry holding [`default_plugins`].
pub fn default_registry() -> Result<PluginRegistry, ConfigurationError> {
    PluginRegistry::with_plugins(default_plugins())
}

// ==================== Shared Helpers ====================

/// A fresh element of `def` holding `children`, or one empty text leaf.
pub(crate) fn leaf(def: &ElementDef, children: Vec<Descendant>) -> Element {
    let mut el = def.instantiate();
    el.children = if children.is_empty() {
        vec![Descendant::text("")]
    } else {
        children
    };
    el
}

/// Like [`leaf`], with the inline content of an HTML element.
pub(crate) fn leaf_from_html(def: &ElementDef, el: &HtmlElement, ctx: &ParseContext<'_>) -> Element {
    leaf(def, ctx.inline_children(el))
}

/// First element child of `el` of kind `kind`.
pub(crate) fn child<'a>(el: &'a Element, kind: &str) -> Option<&'a Element> {
    el.children
        .iter()
        .filter_map(Descendant::as_element)
        .find(|child| child.kind == kind)
}

/// Element children of `el` of kind `kind`.
pub(crate) fn children<'a>(el: &'a Element, kind: &'a str) -> impl Iterator<Item = &'a Element> {
    el.children
        .iter()
        .filter_map(Descendant::as_element)
        .filter(move |child| child.kind == kind)
}
