//! Inline content in and out of every format.

use blockwise_core::parsers::{
    HtmlParse, InlineParser, InlineRenderer, ParseContext, SerializeContext, escape_html,
};
use blockwise_core::{Format, HtmlElement, HtmlNode, PluginRegistry};
use blockwise_inline::{Descendant, Element, Marks, Text};

/// Tags that only carry formatting and never start a block.
pub(crate) const PHRASING_TAGS: &[&str] = &[
    "a", "abbr", "b", "br", "cite", "code", "del", "em", "i", "kbd", "mark", "s", "small",
    "span", "strike", "strong", "sub", "sup", "u",
];

/// Renders and parses inline content, delegating inline elements to the
/// inline plugins of a registry.
pub struct InlineCodec<'r> {
    registry: &'r PluginRegistry,
}

impl<'r> InlineCodec<'r> {
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self { registry }
    }

    fn render_text(&self, text: &Text, format: Format) -> String {
        if text.text.is_empty() {
            return String::new();
        }
        let marks = &text.marks;
        match format {
            Format::Markdown => {
                let mut out = text.text.clone();
                if marks.code {
                    out = format!("`{out}`");
                }
                if marks.bold {
                    out = format!("**{out}**");
                }
                if marks.italic {
                    out = format!("_{out}_");
                }
                if marks.strike {
                    out = format!("~~{out}~~");
                }
                if marks.underline {
                    out = format!("<u>{out}</u>");
                }
                out
            }
            Format::Html | Format::Email => {
                let mut out = escape_html(&text.text);
                if marks.code {
                    out = match format {
                        Format::Email => format!(
                            "<code style=\"font-family: Menlo, Consolas, monospace; background-color: #f6f8fa\">{out}</code>"
                        ),
                        _ => format!("<code>{out}</code>"),
                    };
                }
                for (on, tag) in [
                    (marks.bold, "strong"),
                    (marks.italic, "em"),
                    (marks.underline, "u"),
                    (marks.strike, "s"),
                ] {
                    if on {
                        out = format!("<{tag}>{out}</{tag}>");
                    }
                }
                out
            }
        }
    }

    fn render_element(&self, el: &Element, format: Format) -> String {
        let inner = self.render(&el.children, format);
        let serializer = self
            .registry
            .inline_plugin_for(&el.kind)
            .and_then(|plugin| plugin.parsers.serializer(format));
        match serializer {
            Some(serialize) => serialize(el, &inner, &SerializeContext::new(format, 0, None, self)),
            None => inner,
        }
    }

    fn parse_element(&self, el: &HtmlElement) -> Option<Element> {
        let ctx = ParseContext::new(self);
        self.registry.inline_plugins().find_map(|plugin| {
            let deserializer = plugin.parsers.html_deserialize.as_ref()?;
            if !deserializer.matches(&el.name) {
                return None;
            }
            match &deserializer.parse {
                HtmlParse::Inline(parse) => parse(el, &ctx),
                HtmlParse::Block(_) => None,
            }
        })
    }

    fn walk(&self, nodes: &[HtmlNode], marks: &Marks, out: &mut Vec<Descendant>) {
        for node in nodes {
            match node {
                HtmlNode::Text(text) => push_text(out, &collapse_whitespace(text), marks),
                HtmlNode::Element(el) if el.name == "br" => push_text(out, "\n", marks),
                HtmlNode::Element(el) => {
                    if let Some(inline) = self.parse_element(el) {
                        out.push(Descendant::Element(inline));
                        continue;
                    }
                    let mut marks = marks.clone();
                    match el.name.as_str() {
                        "strong" | "b" => marks.bold = true,
                        "em" | "i" => marks.italic = true,
                        "u" => marks.underline = true,
                        "s" | "strike" | "del" => marks.strike = true,
                        "code" | "kbd" => marks.code = true,
                        _ => {}
                    }
                    self.walk(&el.children, &marks, out);
                }
            }
        }
    }
}

impl InlineRenderer for InlineCodec<'_> {
    fn render(&self, children: &[Descendant], format: Format) -> String {
        children
            .iter()
            .map(|child| match child {
                Descendant::Text(text) => self.render_text(text, format),
                Descendant::Element(el) => self.render_element(el, format),
            })
            .collect()
    }
}

impl InlineParser for InlineCodec<'_> {
    fn parse_inline(&self, nodes: &[HtmlNode]) -> Vec<Descendant> {
        let mut out = Vec::new();
        self.walk(nodes, &Marks::default(), &mut out);
        trim_edges(&mut out);
        out
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Appends text, merging into the previous leaf when the marks match.
fn push_text(out: &mut Vec<Descendant>, text: &str, marks: &Marks) {
    if text.is_empty() {
        return;
    }
    if let Some(Descendant::Text(prev)) = out.last_mut() {
        if prev.marks == *marks {
            prev.text.push_str(text);
            return;
        }
    }
    out.push(Descendant::Text(Text::with_marks(text, marks.clone())));
}

/// Drops the collapsed whitespace HTML leaves around block content.
fn trim_edges(out: &mut Vec<Descendant>) {
    if let Some(Descendant::Text(first)) = out.first_mut() {
        first.text = first.text.trim_start_matches(' ').to_string();
    }
    if let Some(Descendant::Text(last)) = out.last_mut() {
        last.text = last.text.trim_end_matches(' ').to_string();
    }
    out.retain(|child| !matches!(child, Descendant::Text(text) if text.text.is_empty()));
}
