//! Per-plugin serializers and HTML deserializers.
//!
//! ## Learning: Closures as Plugin Hooks
//!
//! A plugin's parsers are `Arc<dyn Fn(..)>` values rather than trait impls:
//! - Plugins are data, so they can be cloned and extended cheaply
//! - `Arc` shares one closure between a base plugin and its extensions
//! - `Send + Sync` lets a registry cross thread boundaries
//!
//! The walk over the document lives in the export crate; it reaches back
//! into these hooks through [`SerializeContext`] and [`ParseContext`].

use std::collections::BTreeMap;
use std::sync::Arc;

use blockwise_inline::{Descendant, Element};
use serde::{Deserialize, Serialize};

use crate::block::Align;

/// Output formats of the serialization engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Html,
    Markdown,
    Email,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Some(Format::Html),
            "markdown" | "md" => Some(Format::Markdown),
            "email" => Some(Format::Email),
            _ => None,
        }
    }
}

/// Renders inline content (text leaves and inline elements).
pub trait InlineRenderer {
    fn render(&self, children: &[Descendant], format: Format) -> String;
}

/// Turns HTML nodes into inline content.
pub trait InlineParser {
    fn parse_inline(&self, nodes: &[HtmlNode]) -> Vec<Descendant>;
}

/// What a serializer knows about the block being written.
pub struct SerializeContext<'a> {
    pub align: Option<Align>,
    pub depth: usize,
    pub format: Format,
    renderer: &'a dyn InlineRenderer,
}

impl<'a> SerializeContext<'a> {
    pub fn new(
        format: Format,
        depth: usize,
        align: Option<Align>,
        renderer: &'a dyn InlineRenderer,
    ) -> Self {
        Self {
            align,
            depth,
            format,
            renderer,
        }
    }

    /// Renders nested inline content in the current format.
    pub fn render(&self, children: &[Descendant]) -> String {
        self.renderer.render(children, self.format)
    }
}

/// Handed to HTML deserializers.
pub struct ParseContext<'a> {
    parser: &'a dyn InlineParser,
}

impl<'a> ParseContext<'a> {
    pub fn new(parser: &'a dyn InlineParser) -> Self {
        Self { parser }
    }

    /// Parses the children of `el` as inline content.
    pub fn inline_children(&self, el: &HtmlElement) -> Vec<Descendant> {
        self.parser.parse_inline(&el.children)
    }
}

/// `(root element, rendered inline text, context) -> output`
pub type SerializeFn = Arc<dyn Fn(&Element, &str, &SerializeContext<'_>) -> String + Send + Sync>;

/// Block deserializer; `None` hands the node to the next plugin.
pub type BlockParseFn =
    Arc<dyn Fn(&HtmlElement, &ParseContext<'_>) -> Option<Vec<ParsedBlock>> + Send + Sync>;

/// Inline deserializer; `None` hands the node to the next plugin.
pub type InlineParseFn =
    Arc<dyn Fn(&HtmlElement, &ParseContext<'_>) -> Option<Element> + Send + Sync>;

/// One block produced by an HTML deserializer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    pub value: Vec<Element>,
    /// Overrides the depth read from the node's attributes
    pub depth: Option<usize>,
    /// Overrides the alignment read from the node's attributes
    pub align: Option<Align>,
}

impl ParsedBlock {
    pub fn new(root: Element) -> Self {
        Self {
            value: vec![root],
            depth: None,
            align: None,
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

#[derive(Clone)]
pub enum HtmlParse {
    Block(BlockParseFn),
    Inline(InlineParseFn),
}

/// Claims HTML elements by tag name.
#[derive(Clone)]
pub struct HtmlDeserializer {
    /// Upper-case tag names this parser is tried on
    pub node_names: Vec<String>,
    pub parse: HtmlParse,
}

impl HtmlDeserializer {
    pub fn block<I, S>(
        node_names: I,
        parse: impl Fn(&HtmlElement, &ParseContext<'_>) -> Option<Vec<ParsedBlock>>
        + Send
        + Sync
        + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            node_names: upper(node_names),
            parse: HtmlParse::Block(Arc::new(parse)),
        }
    }

    pub fn inline<I, S>(
        node_names: I,
        parse: impl Fn(&HtmlElement, &ParseContext<'_>) -> Option<Element> + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            node_names: upper(node_names),
            parse: HtmlParse::Inline(Arc::new(parse)),
        }
    }

    /// Returns true if this parser is tried on tag `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.node_names
            .iter()
            .any(|node| node.eq_ignore_ascii_case(name))
    }
}

fn upper<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().to_ascii_uppercase())
        .collect()
}

/// Serializers and deserializers of one plugin.
#[derive(Clone, Default)]
pub struct Parsers {
    pub html: Option<SerializeFn>,
    pub html_deserialize: Option<HtmlDeserializer>,
    pub markdown: Option<SerializeFn>,
    pub email: Option<SerializeFn>,
}

impl Parsers {
    pub fn html(
        mut self,
        f: impl Fn(&Element, &str, &SerializeContext<'_>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.html = Some(Arc::new(f));
        self
    }

    pub fn deserialize(mut self, deserializer: HtmlDeserializer) -> Self {
        self.html_deserialize = Some(deserializer);
        self
    }

    pub fn markdown(
        mut self,
        f: impl Fn(&Element, &str, &SerializeContext<'_>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.markdown = Some(Arc::new(f));
        self
    }

    pub fn email(
        mut self,
        f: impl Fn(&Element, &str, &SerializeContext<'_>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.email = Some(Arc::new(f));
        self
    }

    /// The serializer for `format`, if the plugin defines one.
    pub fn serializer(&self, format: Format) -> Option<&SerializeFn> {
        match format {
            Format::Html => self.html.as_ref(),
            Format::Markdown => self.markdown.as_ref(),
            Format::Email => self.email.as_ref(),
        }
    }

    /// Overlays every parser set in `other`.
    pub fn merged(mut self, other: Parsers) -> Parsers {
        if other.html.is_some() {
            self.html = other.html;
        }
        if other.html_deserialize.is_some() {
            self.html_deserialize = other.html_deserialize;
        }
        if other.markdown.is_some() {
            self.markdown = other.markdown;
        }
        if other.email.is_some() {
            self.email = other.email;
        }
        self
    }
}

impl std::fmt::Debug for Parsers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parsers")
            .field("html", &self.html.is_some())
            .field(
                "html_deserialize",
                &self.html_deserialize.as_ref().map(|d| &d.node_names),
            )
            .field("markdown", &self.markdown.is_some())
            .field("email", &self.email.is_some())
            .finish()
    }
}

// ==================== HTML Tree ====================

/// A node of a parsed HTML document.
#[derive(Debug, Clone, PartialEq)]
pub enum HtmlNode {
    Element(HtmlElement),
    Text(String),
}

/// An HTML element with lower-case tag and attribute names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HtmlElement {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<HtmlNode>,
}

impl HtmlElement {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.attrs
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_child(mut self, child: HtmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(HtmlNode::Text(text.into()))
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Value of one property of the inline `style` attribute.
    pub fn style(&self, property: &str) -> Option<String> {
        self.attr("style")?.split(';').find_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case(property)
                .then(|| value.trim().to_string())
        })
    }

    /// Direct element children.
    pub fn child_elements(&self) -> impl Iterator<Item = &HtmlElement> {
        self.children.iter().filter_map(|child| match child {
            HtmlNode::Element(el) => Some(el),
            HtmlNode::Text(_) => None,
        })
    }

    /// First descendant element named `name`, depth first.
    pub fn find(&self, name: &str) -> Option<&HtmlElement> {
        self.child_elements().find_map(|child| {
            if child.name == name {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                HtmlNode::Text(t) => out.push_str(t),
                HtmlNode::Element(el) => out.push_str(&el.text_content()),
            }
        }
        out
    }

    /// Block depth from `data-meta-depth`, else from a `margin-left` style.
    pub fn meta_depth(&self) -> Option<usize> {
        if let Some(depth) = self.attr("data-meta-depth").and_then(|d| d.trim().parse().ok()) {
            return Some(depth);
        }
        let margin = self.style("margin-left")?;
        let px: f64 = margin.trim_end_matches("px").trim().parse().ok()?;
        (px > 0.0).then(|| (px / INDENT_PX as f64).round() as usize)
    }

    /// Block alignment from `data-meta-align`, else from `text-align`.
    pub fn meta_align(&self) -> Option<Align> {
        self.attr("data-meta-align")
            .and_then(Align::parse)
            .or_else(|| self.style("text-align").as_deref().and_then(Align::parse))
    }
}

// ==================== Output Helpers ====================

/// Pixels of left margin per depth level.
pub const INDENT_PX: usize = 20;

/// Escapes text for use in HTML content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inline style carrying depth and alignment, `extra` appended.
pub fn meta_style(ctx: &SerializeContext<'_>, extra: &str) -> String {
    let mut decls = Vec::new();
    if ctx.depth > 0 {
        decls.push(format!("margin-left: {}px", ctx.depth * INDENT_PX));
    }
    if let Some(align) = ctx.align {
        decls.push(format!("text-align: {}", align.as_str()));
    }
    if !extra.is_empty() {
        decls.push(extra.trim_end_matches(';').to_string());
    }
    decls.join("; ")
}

/// Attributes (with a leading space) that carry block meta through HTML.
pub fn html_block_attrs(ctx: &SerializeContext<'_>) -> String {
    let mut out = format!(" data-meta-depth=\"{}\"", ctx.depth);
    if let Some(align) = ctx.align {
        out.push_str(&format!(" data-meta-align=\"{}\"", align.as_str()));
    }
    let style = meta_style(ctx, "");
    if !style.is_empty() {
        out.push_str(&format!(" style=\"{style}\""));
    }
    out
}

/// Like [`html_block_attrs`] with extra email-client styles inlined.
pub fn email_block_attrs(ctx: &SerializeContext<'_>, extra_style: &str) -> String {
    let mut out = format!(" data-meta-depth=\"{}\"", ctx.depth);
    if let Some(align) = ctx.align {
        out.push_str(&format!(" data-meta-align=\"{}\"", align.as_str()));
    }
    let style = meta_style(ctx, extra_style);
    if !style.is_empty() {
        out.push_str(&format!(" style=\"{style}\""));
    }
    out
}

/// Leading indentation for a Markdown block at `depth`.
pub fn markdown_indent(depth: usize) -> String {
    "  ".repeat(depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PlainText;

    impl InlineRenderer for PlainText {
        fn render(&self, children: &[Descendant], _format: Format) -> String {
            children.iter().map(Descendant::text_content).collect()
        }
    }

    #[test]
    fn test_block_attrs() {
        let ctx = SerializeContext::new(Format::Html, 2, Some(Align::Center), &PlainText);
        assert_eq!(
            html_block_attrs(&ctx),
            " data-meta-depth=\"2\" data-meta-align=\"center\" style=\"margin-left: 40px; text-align: center\""
        );

        let flat = SerializeContext::new(Format::Html, 0, None, &PlainText);
        assert_eq!(html_block_attrs(&flat), " data-meta-depth=\"0\"");
    }

    #[test]
    fn test_meta_read_back() {
        let el = HtmlElement::new("P")
            .with_attr("STYLE", "margin-left: 40px; text-align: right;")
            .with_text("x");
        assert_eq!(el.name, "p");
        assert_eq!(el.meta_depth(), Some(2));
        assert_eq!(el.meta_align(), Some(Align::Right));

        let tagged = HtmlElement::new("p").with_attr("data-meta-depth", "3");
        assert_eq!(tagged.meta_depth(), Some(3));
        assert_eq!(tagged.meta_align(), None);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_deserializer_matches_case_insensitive() {
        let de = HtmlDeserializer::block(["p"], |_, _| None);
        assert!(de.matches("p"));
        assert!(de.matches("P"));
        assert!(!de.matches("div"));
    }

    #[test]
    fn test_context_renders_children() {
        let ctx = SerializeContext::new(Format::Markdown, 0, None, &PlainText);
        assert_eq!(ctx.render(&[Descendant::text("ab"), Descendant::text("c")]), "abc");
        assert_eq!(markdown_indent(2), "    ");
    }

    #[test]
    fn test_find_descendant() {
        let el = HtmlElement::new("li").with_child(HtmlNode::Element(
            HtmlElement::new("label")
                .with_child(HtmlNode::Element(HtmlElement::new("input").with_attr("type", "checkbox"))),
        ));
        assert_eq!(el.find("input").and_then(|i| i.attr("type")), Some("checkbox"));
        assert!(el.find("img").is_none());
    }
}
