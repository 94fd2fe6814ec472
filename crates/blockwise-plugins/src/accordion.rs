//! Collapsible sections.
//!
//! ```text
//! accordion-list
//! └── accordion-item { open }
//!     ├── accordion-heading   (text)
//!     └── accordion-content   (text + inline elements)
//! ```

use blockwise_core::parsers::{
    ParseContext, SerializeContext, email_block_attrs, html_block_attrs, markdown_indent,
};
use blockwise_core::{
    ElementDef, ElementSchema, HtmlDeserializer, HtmlElement, HtmlNode, ParsedBlock, Parsers,
    Plugin,
};
use blockwise_inline::{Descendant, Element};
use serde_json::Value;

use crate::{child, children, leaf};

pub const ACCORDION: &str = "Accordion";

#[derive(Clone)]
struct Defs {
    list: ElementDef,
    item: ElementDef,
    heading: ElementDef,
    content: ElementDef,
}

impl Defs {
    fn new() -> Self {
        Self {
            list: ElementDef::new("accordion-list").children(["accordion-item"]),
            item: ElementDef::new("accordion-item")
                .prop("open", false)
                .children(["accordion-heading", "accordion-content"]),
            heading: ElementDef::new("accordion-heading"),
            content: ElementDef::new("accordion-content").allow_injected(),
        }
    }

    fn schema(&self) -> ElementSchema {
        ElementSchema::new(self.list.clone())
            .with_element(self.item.clone())
            .with_element(self.heading.clone())
            .with_element(self.content.clone())
    }

    fn item(&self, open: bool, heading: Vec<Descendant>, content: Vec<Descendant>) -> Element {
        let mut item = self.item.instantiate();
        item.set_prop("open", open);
        item.children = vec![
            leaf(&self.heading, heading).into(),
            leaf(&self.content, content).into(),
        ];
        item
    }

    /// One item from a `<details>` element.
    fn parse_details(&self, details: &HtmlElement, ctx: &ParseContext<'_>) -> Element {
        let heading = details
            .find("summary")
            .map(|summary| Descendant::text(summary.text_content().trim()))
            .into_iter()
            .collect();
        let body = HtmlElement {
            children: details
                .children
                .iter()
                .filter(|node| !matches!(node, HtmlNode::Element(el) if el.name == "summary"))
                .cloned()
                .collect(),
            ..HtmlElement::new("div")
        };
        let content = unwrap_single_wrapper(&body);
        self.item(
            details.attr("open").is_some(),
            heading,
            ctx.inline_children(content),
        )
    }
}

/// Descends through a lone wrapper element (`<div><p>..</p></div>`).
fn unwrap_single_wrapper(el: &HtmlElement) -> &HtmlElement {
    let mut current = el;
    loop {
        let has_text = current
            .children
            .iter()
            .any(|node| matches!(node, HtmlNode::Text(text) if !text.trim().is_empty()));
        let mut elements = current.child_elements();
        match (elements.next(), elements.next()) {
            (Some(only), None) if !has_text && matches!(only.name.as_str(), "div" | "p") => {
                current = only
            }
            _ => return current,
        }
    }
}

type ItemParts<'a> = (&'a Element, &'a [Descendant], &'a [Descendant]);

/// Each item with its heading and content children.
fn items(root: &Element) -> impl Iterator<Item = ItemParts<'_>> {
    children(root, "accordion-item").map(|item| {
        let heading = child(item, "accordion-heading").map_or(&[][..], |el| &el.children[..]);
        let content = child(item, "accordion-content").map_or(&[][..], |el| &el.children[..]);
        (item, heading, content)
    })
}

fn is_open(item: &Element) -> bool {
    item.prop("open").and_then(Value::as_bool).unwrap_or(false)
}

fn render_html(root: &Element, ctx: &SerializeContext<'_>) -> String {
    let body: String = items(root)
        .map(|(item, heading, content)| {
            format!(
                "<details{}><summary>{}</summary><div>{}</div></details>",
                if is_open(item) { " open" } else { "" },
                ctx.render(heading),
                ctx.render(content)
            )
        })
        .collect();
    format!(
        "<div data-type=\"accordion\"{}>{}</div>",
        html_block_attrs(ctx),
        body
    )
}

pub fn accordion() -> Plugin {
    let defs = Defs::new();
    let parse_defs = defs.clone();
    let create_defs = defs.clone();

    Plugin::block(ACCORDION, defs.schema())
        .display("Accordion", "Hide content under a toggleable heading")
        .before_create(move |_| {
            let mut list = create_defs.list.instantiate();
            list.children = vec![create_defs.item(true, Vec::new(), Vec::new()).into()];
            vec![list]
        })
        .parsers(
            Parsers::default()
                .html(|root, _, ctx| render_html(root, ctx))
                .markdown(|root, _, ctx| {
                    let indent = markdown_indent(ctx.depth);
                    items(root)
                        .map(|(_, heading, content)| {
                            format!(
                                "{indent}**{}**\n\n{indent}{}",
                                ctx.render(heading),
                                ctx.render(content)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n\n")
                })
                .email(|root, _, ctx| {
                    let rows: String = items(root)
                        .map(|(_, heading, content)| {
                            format!(
                                "<tr><td style=\"padding: 8px 0; font-weight: bold; border-bottom: 1px solid #e5e7eb\">{}</td></tr>\
                                 <tr><td style=\"padding: 8px 0 16px\">{}</td></tr>",
                                ctx.render(heading),
                                ctx.render(content)
                            )
                        })
                        .collect();
                    format!(
                        "<table role=\"presentation\" width=\"100%\"{}>{}</table>",
                        email_block_attrs(ctx, "margin: 0 0 16px; border-collapse: collapse"),
                        rows
                    )
                })
                .deserialize(HtmlDeserializer::block(["DIV", "DETAILS"], move |el, ctx| {
                    let details: Vec<&HtmlElement> = match el.name.as_str() {
                        "details" => vec![el],
                        _ if el.attr("data-type") == Some("accordion") => el
                            .child_elements()
                            .filter(|child| child.name == "details")
                            .collect(),
                        _ => return None,
                    };

                    let mut list = parse_defs.list.instantiate();
                    list.children = details
                        .into_iter()
                        .map(|details| parse_defs.parse_details(details, ctx).into())
                        .collect();
                    if list.children.is_empty() {
                        list.children = vec![parse_defs.item(false, Vec::new(), Vec::new()).into()];
                    }
                    Some(vec![ParsedBlock::new(list)])
                })),
        )
}

/// Plain text of every heading, for tests and previews.
pub fn headings(root: &Element) -> Vec<String> {
    items(root)
        .map(|(_, heading, _)| {
            heading
                .iter()
                .map(Descendant::text_content)
                .collect::<String>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PlainText, ctx};
    use blockwise_core::parsers::HtmlParse;
    use blockwise_core::{BlockData, Editor, Format, PluginRegistry};

    fn parse(el: &HtmlElement) -> Option<Vec<ParsedBlock>> {
        match &accordion().parsers.html_deserialize.as_ref()?.parse {
            HtmlParse::Block(parse) => parse(el, &ParseContext::new(&PlainText)),
            HtmlParse::Inline(_) => None,
        }
    }

    fn details(summary: &str, body: &str) -> HtmlNode {
        HtmlNode::Element(
            HtmlElement::new("details")
                .with_child(HtmlNode::Element(HtmlElement::new("summary").with_text(summary)))
                .with_child(HtmlNode::Element(
                    HtmlElement::new("div")
                        .with_child(HtmlNode::Element(HtmlElement::new("p").with_text(body))),
                )),
        )
    }

    #[test]
    fn test_insert_uses_open_item() {
        let registry = PluginRegistry::with_plugins([accordion()]).unwrap();
        let mut editor = Editor::new(registry);
        let id = editor
            .insert_block(ACCORDION, None, BlockData::default(), false)
            .unwrap();
        let root = &editor.block(&id).unwrap().value[0];
        let (item, _, _) = items(root).next().unwrap();
        assert!(is_open(item));
    }

    #[test]
    fn test_parse_wrapper_and_bare_details() {
        let wrapper = HtmlElement::new("div")
            .with_attr("data-type", "accordion")
            .with_child(details("Q1", "A1"))
            .with_child(details("Q2", "A2"));
        let parsed = parse(&wrapper).unwrap();
        let root = &parsed[0].value[0];
        assert_eq!(headings(root), ["Q1", "Q2"]);
        let (_, _, content) = items(root).nth(1).unwrap();
        assert_eq!(content[0].text_content(), "A2");

        let HtmlNode::Element(bare) = details("Only", "Body") else {
            unreachable!()
        };
        let parsed = parse(&bare).unwrap();
        assert_eq!(headings(&parsed[0].value[0]), ["Only"]);

        assert!(parse(&HtmlElement::new("div").with_text("x")).is_none());
    }

    #[test]
    fn test_formats() {
        let defs = Defs::new();
        let mut root = defs.list.instantiate();
        root.children = vec![
            defs.item(true, vec![Descendant::text("Q")], vec![Descendant::text("A")])
                .into(),
        ];

        let html = render_html(&root, &ctx(Format::Html, 0, None));
        assert_eq!(
            html,
            "<div data-type=\"accordion\" data-meta-depth=\"0\"><details open><summary>Q</summary><div>A</div></details></div>"
        );

        let md = accordion().parsers.serializer(Format::Markdown).unwrap()(&root, "", &ctx(Format::Markdown, 0, None));
        assert_eq!(md, "**Q**\n\nA");
    }
}
