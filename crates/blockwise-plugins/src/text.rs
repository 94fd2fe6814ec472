//! Plain text blocks: paragraph, headings, blockquote, callout and code.

use blockwise_core::parsers::{
    email_block_attrs, escape_html, html_block_attrs, markdown_indent,
};
use blockwise_core::{ElementDef, ElementSchema, HtmlDeserializer, ParsedBlock, Parsers, Plugin};
use blockwise_inline::{Descendant, InlineDocument, InlineExtension, Marks, Text, element_at_mut};

use crate::{leaf, leaf_from_html};

pub const PARAGRAPH: &str = "Paragraph";
pub const BLOCKQUOTE: &str = "Blockquote";
pub const CALLOUT: &str = "Callout";
pub const CODE: &str = "Code";

/// Callout themes; anything else falls back to `default`.
const CALLOUT_THEMES: [&str; 5] = ["default", "info", "success", "warning", "error"];

pub fn paragraph() -> Plugin {
    let def = ElementDef::new("paragraph").allow_injected();
    let parse_def = def.clone();

    Plugin::block(PARAGRAPH, ElementSchema::new(def))
        .display("Text", "Start writing plain text")
        .parsers(
            Parsers::default()
                .html(|_, text, ctx| format!("<p{}>{}</p>", html_block_attrs(ctx), text))
                .markdown(|_, text, ctx| format!("{}{}", markdown_indent(ctx.depth), text))
                .email(|_, text, ctx| {
                    format!(
                        "<p{}>{}</p>",
                        email_block_attrs(ctx, "margin: 0 0 16px; font-size: 16px; line-height: 1.5"),
                        text
                    )
                })
                .deserialize(HtmlDeserializer::block(["P"], move |el, ctx| {
                    Some(vec![ParsedBlock::new(leaf_from_html(&parse_def, el, ctx))])
                })),
        )
}

/// `HeadingOne`, `HeadingTwo` or `HeadingThree`; levels past 3 clamp.
pub fn heading(level: u8) -> Plugin {
    let (kind, element, title, size) = match level {
        0 | 1 => ("HeadingOne", "heading-one", "Heading 1", 32),
        2 => ("HeadingTwo", "heading-two", "Heading 2", 24),
        _ => ("HeadingThree", "heading-three", "Heading 3", 20),
    };
    let level = level.clamp(1, 3) as usize;
    let def = ElementDef::new(element).allow_injected();
    let parse_def = def.clone();
    let tag = format!("H{level}");

    Plugin::block(kind, ElementSchema::new(def))
        .display(title, format!("Level {level} section heading"))
        .shortcuts(["#".repeat(level)])
        .parsers(
            Parsers::default()
                .html(move |_, text, ctx| {
                    format!("<h{level}{}>{}</h{level}>", html_block_attrs(ctx), text)
                })
                .markdown(move |_, text, ctx| {
                    format!("{}{} {}", markdown_indent(ctx.depth), "#".repeat(level), text)
                })
                .email(move |_, text, ctx| {
                    let style = format!("margin: 0 0 16px; font-size: {size}px; font-weight: bold");
                    format!("<h{level}{}>{}</h{level}>", email_block_attrs(ctx, &style), text)
                })
                .deserialize(HtmlDeserializer::block([tag], move |el, ctx| {
                    Some(vec![ParsedBlock::new(leaf_from_html(&parse_def, el, ctx))])
                })),
        )
}

pub fn blockquote() -> Plugin {
    let def = ElementDef::new("blockquote").allow_injected();
    let parse_def = def.clone();

    Plugin::block(BLOCKQUOTE, ElementSchema::new(def))
        .display("Blockquote", "Capture a quote")
        .shortcuts([">"])
        .parsers(
            Parsers::default()
                .html(|_, text, ctx| {
                    format!("<blockquote{}>{}</blockquote>", html_block_attrs(ctx), text)
                })
                .markdown(|_, text, ctx| format!("{}> {}", markdown_indent(ctx.depth), text))
                .email(|_, text, ctx| {
                    let style = "margin: 0 0 16px; padding-left: 12px; border-left: 3px solid #d1d5db; color: #4b5563";
                    format!("<blockquote{}>{}</blockquote>", email_block_attrs(ctx, style), text)
                })
                .deserialize(HtmlDeserializer::block(["BLOCKQUOTE"], move |el, ctx| {
                    Some(vec![ParsedBlock::new(leaf_from_html(&parse_def, el, ctx))])
                })),
        )
}

fn callout_background(theme: &str) -> &'static str {
    match theme {
        "info" => "#e0f2fe",
        "success" => "#dcfce7",
        "warning" => "#fef9c3",
        "error" => "#fee2e2",
        _ => "#f3f4f6",
    }
}

/// Highlighted note; the `theme` prop picks its colours.
pub fn callout() -> Plugin {
    let def = ElementDef::new("callout")
        .prop("theme", "default")
        .allow_injected();
    let parse_def = def.clone();

    Plugin::block(CALLOUT, ElementSchema::new(def))
        .display("Callout", "Make writing stand out")
        .parsers(
            Parsers::default()
                .html(|root, text, ctx| {
                    let theme = root.prop_str("theme").unwrap_or("default");
                    format!(
                        "<div data-type=\"callout\" data-theme=\"{}\"{}>{}</div>",
                        escape_html(theme),
                        html_block_attrs(ctx),
                        text
                    )
                })
                .markdown(|_, text, ctx| format!("{}> {}", markdown_indent(ctx.depth), text))
                .email(|root, text, ctx| {
                    let theme = root.prop_str("theme").unwrap_or("default");
                    let style = format!(
                        "margin: 0 0 16px; padding: 12px 16px; border-radius: 6px; background-color: {}",
                        callout_background(theme)
                    );
                    format!("<div{}>{}</div>", email_block_attrs(ctx, &style), text)
                })
                .deserialize(HtmlDeserializer::block(["DIV"], move |el, ctx| {
                    if el.attr("data-type") != Some("callout") {
                        return None;
                    }
                    let mut root = leaf_from_html(&parse_def, el, ctx);
                    let theme = el
                        .attr("data-theme")
                        .filter(|theme| CALLOUT_THEMES.contains(theme))
                        .unwrap_or("default");
                    root.set_prop("theme", theme);
                    Some(vec![ParsedBlock::new(root)])
                })),
        )
}

/// Keeps code blocks plain: marks are cleared and inline elements reduced
/// to their text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodeExtension;

impl InlineExtension for PlainCodeExtension {
    fn id(&self) -> &str {
        "code-plain-text"
    }

    fn normalize_node(&self, doc: &mut InlineDocument, path: &[usize]) -> bool {
        let needs_repair = doc.element(path).is_some_and(|el| {
            el.kind == "code"
                && el.children.iter().any(|child| match child {
                    Descendant::Text(text) => !text.marks.is_empty(),
                    Descendant::Element(_) => true,
                })
        });
        if !needs_repair {
            return false;
        }

        let mut roots = doc.children().to_vec();
        if let Some(el) = element_at_mut(&mut roots, path) {
            let plain: String = el.children.iter().map(Descendant::text_content).collect();
            el.children = vec![Descendant::Text(Text::with_marks(plain, Marks::default()))];
        }
        doc.set_children(roots);
        true
    }
}

pub fn code() -> Plugin {
    let def = ElementDef::new("code").prop("language", "plaintext");
    let parse_def = def.clone();

    Plugin::block(CODE, ElementSchema::new(def))
        .display("Code", "Write code with a language label")
        .shortcuts(["```"])
        .extension(PlainCodeExtension)
        .parsers(
            Parsers::default()
                .html(|root, text, ctx| {
                    let language = root.prop_str("language").unwrap_or("plaintext");
                    format!(
                        "<pre data-language=\"{}\"{}><code>{}</code></pre>",
                        escape_html(language),
                        html_block_attrs(ctx),
                        text
                    )
                })
                .markdown(|root, _, ctx| {
                    let indent = markdown_indent(ctx.depth);
                    let language = root.prop_str("language").unwrap_or("");
                    let body = root
                        .text_content()
                        .lines()
                        .map(|line| format!("{indent}{line}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    format!("{indent}```{language}\n{body}\n{indent}```")
                })
                .email(|_, text, ctx| {
                    let style = "margin: 0 0 16px; padding: 12px; background-color: #f6f8fa; font-family: Menlo, Consolas, monospace; font-size: 14px; white-space: pre-wrap";
                    format!("<pre{}><code>{}</code></pre>", email_block_attrs(ctx, style), text)
                })
                .deserialize(HtmlDeserializer::block(["PRE"], move |el, _| {
                    let language = el
                        .attr("data-language")
                        .map(str::to_string)
                        .or_else(|| {
                            el.find("code")?
                                .attr("class")?
                                .split_whitespace()
                                .find_map(|class| class.strip_prefix("language-"))
                                .map(str::to_string)
                        })
                        .unwrap_or_else(|| "plaintext".to_string());
                    let mut root = leaf(&parse_def, vec![Descendant::text(el.text_content())]);
                    root.set_prop("language", language);
                    Some(vec![ParsedBlock::new(root)])
                })),
        )
}
