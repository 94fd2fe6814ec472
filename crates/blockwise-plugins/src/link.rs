//! Inline hyperlinks.
//!
//! `Link` registers no block type. Its `link` element is injected into the
//! leaves of blocks that allow it (list items, todo items, accordion
//! content) and is rendered by the inline renderer of each format.

use blockwise_core::parsers::escape_html;
use blockwise_core::{ElementDef, ElementSchema, HtmlDeserializer, Parsers, Plugin};
use blockwise_inline::{Descendant, Element, NodeType};
use serde_json::Value;

pub const LINK: &str = "Link";
pub const LINK_ELEMENT: &str = "link";

fn link_def() -> ElementDef {
    ElementDef::new(LINK_ELEMENT)
        .node_type(NodeType::Inline)
        .prop("url", "")
        .prop("target", Value::Null)
        .prop("rel", Value::Null)
}

/// A link element wrapping `children`.
pub fn link_element(url: &str, children: Vec<Descendant>) -> Element {
    let mut el = link_def().instantiate();
    el.set_prop("url", url);
    el.children = if children.is_empty() {
        vec![Descendant::text("")]
    } else {
        children
    };
    el
}

fn anchor_attrs(el: &Element) -> String {
    let mut out = format!(" href=\"{}\"", escape_html(el.prop_str("url").unwrap_or_default()));
    for key in ["target", "rel"] {
        if let Some(value) = el.prop_str(key).filter(|value| !value.is_empty()) {
            out.push_str(&format!(" {key}=\"{}\"", escape_html(value)));
        }
    }
    out
}

pub fn link() -> Plugin {
    Plugin::inline(LINK, ElementSchema::new(link_def()))
        .display("Link", "Link text to a URL")
        .parsers(
            Parsers::default()
                .html(|el, text, _| format!("<a{}>{}</a>", anchor_attrs(el), text))
                .markdown(|el, text, _| {
                    format!("[{}]({})", text, el.prop_str("url").unwrap_or_default())
                })
                .email(|el, text, _| {
                    format!(
                        "<a{} style=\"color: #2563eb; text-decoration: underline\">{}</a>",
                        anchor_attrs(el),
                        text
                    )
                })
                .deserialize(HtmlDeserializer::inline(["A"], |el, ctx| {
                    let url = el.attr("href")?;
                    let mut link = link_element(url, ctx.inline_children(el));
                    for key in ["target", "rel"] {
                        if let Some(value) = el.attr(key) {
                            link.set_prop(key, value);
                        }
                    }
                    Some(link)
                })),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PlainText, ctx};
    use blockwise_core::parsers::{HtmlParse, ParseContext};
    use blockwise_core::{Format, HtmlElement};

    #[test]
    fn test_link_is_inline() {
        let plugin = link();
        assert!(plugin.is_inline());
        let el = link_element("https://a.test", vec![Descendant::text("A")]);
        assert!(el.is_inline());
        assert_eq!(el.text_content(), "A");
    }

    #[test]
    fn test_link_formats() {
        let mut el = link_element("https://a.test/?q=1&r=2", vec![Descendant::text("A")]);
        el.set_prop("target", "_blank");
        let plugin = link();

        let html = plugin.parsers.serializer(Format::Html).unwrap()(&el, "A", &ctx(Format::Html, 0, None));
        assert_eq!(html, "<a href=\"https://a.test/?q=1&amp;r=2\" target=\"_blank\">A</a>");

        let md = plugin.parsers.serializer(Format::Markdown).unwrap()(&el, "A", &ctx(Format::Markdown, 0, None));
        assert_eq!(md, "[A](https://a.test/?q=1&r=2)");

        let email = plugin.parsers.serializer(Format::Email).unwrap()(&el, "A", &ctx(Format::Email, 0, None));
        assert!(email.starts_with("<a href="));
        assert!(email.contains("text-decoration: underline"));
    }

    #[test]
    fn test_parse_anchor() {
        let plugin = link();
        let Some(HtmlParse::Inline(parse)) = plugin.parsers.html_deserialize.map(|d| d.parse) else {
            panic!("link parses inline");
        };
        let anchor = HtmlElement::new("a")
            .with_attr("href", "/docs")
            .with_attr("rel", "noopener")
            .with_text("Docs");
        let el = parse(&anchor, &ParseContext::new(&PlainText)).unwrap();
        assert_eq!(el.prop_str("url"), Some("/docs"));
        assert_eq!(el.prop_str("rel"), Some("noopener"));
        assert_eq!(el.text_content(), "Docs");

        assert!(parse(&HtmlElement::new("a").with_text("x"), &ParseContext::new(&PlainText)).is_none());
    }
}
