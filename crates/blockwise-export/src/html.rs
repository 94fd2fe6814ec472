//! A forgiving HTML tree builder on top of `quick-xml`.
//!
//! ## Learning: Streaming Events into a Tree
//!
//! `quick-xml` hands out a flat stream of start/end/text events. We keep a
//! stack of open elements and attach each one to its parent when it closes.
//! HTML is not XML, so a few rules are relaxed:
//! - Void tags (`<br>`, `<img>`, ...) never wait for an end tag
//! - End tags close everything opened after their match
//! - Unmatched end tags are ignored
//! - A `<` that cannot open a tag (`1 < 2`) is text
//! - Unknown entities (`&nbsp;` and friends) are resolved or kept verbatim

use std::borrow::Cow;

use blockwise_core::{HtmlElement, HtmlNode};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::ExportResult;

/// Tags that never have content or an end tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Tags whose content is never document text.
const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "template", "title"];

/// Parses an HTML fragment or document into top-level nodes.
pub fn parse_html(html: &str) -> ExportResult<Vec<HtmlNode>> {
    let html = escape_bare_lt(html);
    let mut reader = Reader::from_str(&html);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut builder = TreeBuilder::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let el = element(&e);
                if VOID_TAGS.contains(&el.name.as_str()) {
                    builder.append(HtmlNode::Element(el));
                } else {
                    builder.open(el);
                }
            }
            Event::Empty(e) => builder.append(HtmlNode::Element(element(&e))),
            Event::End(e) => builder.close(&lowercase(e.name().as_ref())),
            Event::Text(e) => {
                let text = e
                    .unescape_with(html_entity)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned().into());
                builder.text(text);
            }
            Event::CData(e) => builder.text(String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(builder.finish())
}

/// Escapes every `<` not followed by a tag name, `/`, `!` or `?`, which
/// browsers read as a literal character.
fn escape_bare_lt(html: &str) -> Cow<'_, str> {
    let opens_markup = |rest: &str| {
        rest.chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
    };
    let bare: Vec<usize> = html
        .match_indices('<')
        .map(|(ix, _)| ix)
        .filter(|ix| !opens_markup(&html[ix + 1..]))
        .collect();
    if bare.is_empty() {
        return Cow::Borrowed(html);
    }

    let mut out = String::with_capacity(html.len() + bare.len() * 3);
    let mut last = 0;
    for ix in bare {
        out.push_str(&html[last..ix]);
        out.push_str("&lt;");
        last = ix + 1;
    }
    out.push_str(&html[last..]);
    Cow::Owned(out)
}

fn lowercase(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_lowercase()
}

fn element(e: &BytesStart<'_>) -> HtmlElement {
    let mut el = HtmlElement::new(lowercase(e.name().as_ref()));
    for attr in e.html_attributes().filter_map(Result::ok) {
        let value = attr
            .unescape_value()
            .map(Cow::into_owned)
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        el = el.with_attr(lowercase(attr.key.as_ref()), value);
    }
    el
}

/// Named entities that HTML knows and XML does not.
fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "hellip" => Some("\u{2026}"),
        "copy" => Some("\u{a9}"),
        "reg" => Some("\u{ae}"),
        "trade" => Some("\u{2122}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "bull" => Some("\u{2022}"),
        "middot" => Some("\u{b7}"),
        "euro" => Some("\u{20ac}"),
        _ => quick_xml::escape::resolve_predefined_entity(name),
    }
}

#[derive(Default)]
struct TreeBuilder {
    roots: Vec<HtmlNode>,
    open: Vec<HtmlElement>,
}

impl TreeBuilder {
    fn append(&mut self, node: HtmlNode) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn open(&mut self, el: HtmlElement) {
        self.open.push(el);
    }

    fn close(&mut self, name: &str) {
        if !self.open.iter().any(|el| el.name == name) {
            return;
        }
        while let Some(el) = self.open.pop() {
            let done = el.name == name;
            self.attach(el);
            if done {
                break;
            }
        }
    }

    fn attach(&mut self, el: HtmlElement) {
        if !SKIPPED_TAGS.contains(&el.name.as_str()) {
            self.append(HtmlNode::Element(el));
        }
    }

    fn text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        let siblings = match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        match siblings.last_mut() {
            Some(HtmlNode::Text(prev)) => prev.push_str(&text),
            _ => siblings.push(HtmlNode::Text(text)),
        }
    }

    fn finish(mut self) -> Vec<HtmlNode> {
        while let Some(el) = self.open.pop() {
            self.attach(el);
        }
        self.roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(nodes: &[HtmlNode]) -> &HtmlElement {
        match &nodes[0] {
            HtmlNode::Element(el) => el,
            HtmlNode::Text(text) => panic!("expected an element, found text {text:?}"),
        }
    }

    #[test]
    fn test_nested_elements_and_attributes() {
        let nodes = parse_html(r#"<DIV Data-Type="callout" class='x'><p>Hi <b>there</b></p></DIV>"#).unwrap();
        let div = first(&nodes);
        assert_eq!(div.name, "div");
        assert_eq!(div.attr("data-type"), Some("callout"));
        assert_eq!(div.attr("class"), Some("x"));
        assert_eq!(div.text_content(), "Hi there");
        assert_eq!(div.find("b").map(HtmlElement::text_content), Some("there".to_string()));
    }

    #[test]
    fn test_void_tags_and_valueless_attributes() {
        let nodes = parse_html(r#"<p>a<br>b</p><input type="checkbox" disabled checked><hr>"#).unwrap();
        assert_eq!(nodes.len(), 3);
        let p = first(&nodes);
        assert_eq!(p.children.len(), 3);

        let HtmlNode::Element(input) = &nodes[1] else {
            panic!("input expected");
        };
        assert_eq!(input.attr("disabled"), Some(""));
        assert!(input.attr("checked").is_some());
    }

    #[test]
    fn test_unclosed_and_stray_end_tags() {
        let nodes = parse_html("<ul><li>one<li>two</ul></span><p>after").unwrap();
        let ul = first(&nodes);
        assert_eq!(ul.name, "ul");
        assert_eq!(ul.text_content(), "onetwo");
        let HtmlNode::Element(p) = &nodes[1] else {
            panic!("paragraph expected");
        };
        assert_eq!(p.text_content(), "after");
    }

    #[test]
    fn test_entities_and_skipped_tags() {
        let nodes =
            parse_html("<html><head><title>T</title></head><body><p>a&nbsp;&amp;&#39;b</p></body></html>")
                .unwrap();
        let html = first(&nodes);
        assert_eq!(html.text_content(), "a\u{a0}&'b");
        assert!(html.find("title").is_none());
    }

    #[test]
    fn test_bare_less_than_is_text() {
        let nodes = parse_html("<p>1 < 2</p><p>ok</p><p>a <3 b<</p>").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(first(&nodes).text_content(), "1 < 2");
        let texts: Vec<String> = nodes
            .iter()
            .map(|node| match node {
                HtmlNode::Element(el) => el.text_content(),
                HtmlNode::Text(text) => text.clone(),
            })
            .collect();
        assert_eq!(texts, ["1 < 2", "ok", "a <3 b<"]);
        assert_eq!(escape_bare_lt("<p>fine</p>"), Cow::Borrowed("<p>fine</p>"));
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parse_html("just text").unwrap(), vec![HtmlNode::Text("just text".into())]);
        assert!(parse_html("").unwrap().is_empty());
    }
}
