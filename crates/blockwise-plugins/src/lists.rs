//! List blocks.
//!
//! Bulleted and numbered lists are containers of `list-item` leaves, so
//! one block holds a whole run of items. A todo list is a single checkable
//! line; consecutive todo blocks form the visual list.

use blockwise_core::parsers::{
    ParseContext, SerializeContext, email_block_attrs, html_block_attrs, markdown_indent,
};
use blockwise_core::{
    BlockId, BlockPatch, CommandSpec, CoreError, ElementDef, ElementSchema, HtmlDeserializer,
    HtmlElement, InlineTarget, Key, KeyOutcome, ParsedBlock, Parsers, Plugin, ResultExt,
};
use blockwise_inline::{Descendant, Element, Point, Range};
use serde_json::{Value, json};

use crate::{children, leaf, leaf_from_html};

pub const BULLETED_LIST: &str = "BulletedList";
pub const NUMBERED_LIST: &str = "NumberedList";
pub const TODO_LIST: &str = "TodoList";

const LIST_ITEM: &str = "list-item";

/// Which marker a container list renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListStyle {
    Bulleted,
    Numbered,
}

impl ListStyle {
    fn tag(self) -> &'static str {
        match self {
            ListStyle::Bulleted => "ul",
            ListStyle::Numbered => "ol",
        }
    }

    fn marker(self, index: usize) -> String {
        match self {
            ListStyle::Bulleted => "-".to_string(),
            ListStyle::Numbered => format!("{}.", index + 1),
        }
    }
}

fn render_items(root: &Element, ctx: &SerializeContext<'_>, item: impl Fn(usize, String) -> String) -> String {
    children(root, LIST_ITEM)
        .enumerate()
        .map(|(index, el)| item(index, ctx.render(&el.children)))
        .collect::<Vec<_>>()
        .join(if ctx.format == blockwise_core::Format::Markdown { "\n" } else { "" })
}

fn parse_items(root_def: &ElementDef, item_def: &ElementDef, el: &HtmlElement, ctx: &ParseContext<'_>) -> Element {
    let items: Vec<Descendant> = el
        .child_elements()
        .filter(|child| child.name == "li")
        .map(|li| leaf_from_html(item_def, li, ctx).into())
        .collect();
    let mut root = root_def.instantiate();
    root.children = if items.is_empty() {
        vec![leaf(item_def, Vec::new()).into()]
    } else {
        items
    };
    root
}

fn container_list(kind: &'static str, root: &'static str, style: ListStyle) -> Plugin {
    let root_def = ElementDef::new(root).children([LIST_ITEM]);
    let item_def = ElementDef::new(LIST_ITEM).allow_injected();
    let (parse_root, parse_item) = (root_def.clone(), item_def.clone());
    let tag = style.tag();
    let (title, description, shortcut) = match style {
        ListStyle::Bulleted => ("Bulleted List", "Create a simple bulleted list", "-"),
        ListStyle::Numbered => ("Numbered List", "Create a list with numbering", "1."),
    };

    Plugin::block(kind, ElementSchema::new(root_def).with_element(item_def))
        .display(title, description)
        .shortcuts([shortcut])
        .parsers(
            Parsers::default()
                .html(move |root, _, ctx| {
                    let items = render_items(root, ctx, |_, text| format!("<li>{text}</li>"));
                    format!("<{tag}{}>{items}</{tag}>", html_block_attrs(ctx))
                })
                .markdown(move |root, _, ctx| {
                    let indent = markdown_indent(ctx.depth);
                    render_items(root, ctx, |index, text| {
                        format!("{indent}{} {text}", style.marker(index))
                    })
                })
                .email(move |root, _, ctx| {
                    let items = render_items(root, ctx, |_, text| {
                        format!("<li style=\"margin: 0 0 4px\">{text}</li>")
                    });
                    let style = "margin: 0 0 16px; padding-left: 24px; font-size: 16px; line-height: 1.5";
                    format!("<{tag}{}>{items}</{tag}>", email_block_attrs(ctx, style))
                })
                .deserialize(HtmlDeserializer::block([tag], move |el, ctx| {
                    let root = parse_items(&parse_root, &parse_item, el, ctx);
                    Some(vec![ParsedBlock::new(root)])
                })),
        )
}

pub fn bulleted_list() -> Plugin {
    container_list(BULLETED_LIST, "bulleted-list", ListStyle::Bulleted)
}

pub fn numbered_list() -> Plugin {
    container_list(NUMBERED_LIST, "numbered-list", ListStyle::Numbered)
}

// ==================== Todo List ====================

fn is_checked(root: &Element) -> bool {
    root.prop("checked").and_then(Value::as_bool).unwrap_or(false)
}

fn todo_element(def: &ElementDef, checked: bool, children: Vec<Descendant>) -> Element {
    let mut el = leaf(def, children);
    el.set_prop("checked", checked);
    el
}

/// Converts the focused default block into a todo when its whole text is
/// one of the todo shortcuts (`[]`, `[ ]`, `[x]`) and Space is pressed.
fn convert_shortcut(editor: &mut blockwise_core::Editor, def: &ElementDef) -> KeyOutcome {
    let Some(block) = editor.current_block() else {
        return KeyOutcome::Pass;
    };
    if block.kind != editor.config().editor.default_block {
        return KeyOutcome::Pass;
    }
    let text = block.text();
    let shortcuts = editor
        .registry()
        .get(TODO_LIST)
        .map(|plugin| plugin.options.shortcuts.clone())
        .unwrap_or_default();
    if !shortcuts.iter().any(|shortcut| *shortcut == text) {
        return KeyOutcome::Pass;
    }

    let id = block.id.clone();
    let checked = text.contains(['x', 'X']);
    let value = vec![todo_element(def, checked, Vec::new())];
    let result = editor.batch_operations(|editor| {
        editor.toggle_block(&id, TODO_LIST, true)?;
        editor.update_block(&id, BlockPatch::value(value))?;
        editor.set_inline_selection(
            &InlineTarget::block(id.clone()),
            Some(Range::collapsed(Point::new(vec![0, 0], 0))),
        )
    });
    match result {
        Ok(()) => {
            tracing::debug!(block = %id, checked, "Converted shortcut to todo");
            KeyOutcome::Claimed
        }
        Err(e) => {
            tracing::warn!(block = %id, error = %e, "Todo shortcut failed");
            KeyOutcome::Pass
        }
    }
}

/// A checkable line. `todo.toggle` flips the `checked` prop; typing `[]`
/// then Space in an empty paragraph turns it into a todo.
pub fn todo_list() -> Plugin {
    let def = ElementDef::new("todo-list")
        .prop("checked", false)
        .allow_injected();
    let parse_def = def.clone();
    let key_def = def.clone();

    Plugin::block(TODO_LIST, ElementSchema::new(def))
        .display("Todo List", "Track tasks with a checkbox")
        .shortcuts(["[]", "[ ]", "[x]"])
        .command(
            CommandSpec::new("todo.toggle", |editor, args| {
                let id = args
                    .as_ref()
                    .and_then(|args| args.get("id"))
                    .and_then(Value::as_str)
                    .map(BlockId::from);
                let id = editor.target_block(id.as_ref())?;
                let block = editor.content().require(&id)?;
                if block.kind != TODO_LIST {
                    return Err(CoreError::InvalidOperation(format!(
                        "Block {id} is a {}, not a todo",
                        block.kind
                    )));
                }

                let mut value = block.value.clone();
                let checked = !value.first().is_some_and(is_checked);
                for root in &mut value {
                    root.set_prop("checked", checked);
                }
                editor.update_block(&id, BlockPatch::value(value))?;
                Ok(Some(json!(checked)))
            })
            .description("Check or uncheck a todo item"),
        )
        .on_key_down(move |editor, event| {
            if event.key != Key::Space || !event.modifiers.is_empty() {
                return KeyOutcome::Pass;
            }
            convert_shortcut(editor, &key_def)
        })
        .parsers(
            Parsers::default()
                .html(|root, text, ctx| {
                    let checked = is_checked(root);
                    format!(
                        "<div data-type=\"todo\" data-checked=\"{checked}\"{}><input type=\"checkbox\" disabled{} /> {}</div>",
                        html_block_attrs(ctx),
                        if checked { " checked" } else { "" },
                        text
                    )
                })
                .markdown(|root, text, ctx| {
                    let mark = if is_checked(root) { "x" } else { " " };
                    format!("{}- [{mark}] {text}", markdown_indent(ctx.depth))
                })
                .email(|root, text, ctx| {
                    let box_char = if is_checked(root) { "&#9745;" } else { "&#9744;" };
                    let style = "margin: 0 0 8px; font-size: 16px; line-height: 1.5";
                    format!("<p{}>{box_char} {text}</p>", email_block_attrs(ctx, style))
                })
                .deserialize(HtmlDeserializer::block(["DIV"], move |el, ctx| {
                    if el.attr("data-type") != Some("todo") {
                        return None;
                    }
                    let checked = el.attr("data-checked") == Some("true")
                        || el.find("input").is_some_and(|input| input.attr("checked").is_some());
                    let mut root = todo_element(&parse_def, checked, ctx.inline_children(el));
                    trim_leading_space(&mut root);
                    Some(vec![ParsedBlock::new(root)])
                })),
        )
}

/// Drops the space the serializer puts after the checkbox.
fn trim_leading_space(root: &mut Element) {
    if let Some(Descendant::Text(text)) = root.children.first_mut() {
        if let Some(rest) = text.text.strip_prefix(' ') {
            text.text = rest.to_string();
        }
    }
}

/// Runs `todo.toggle` on a block and returns the new state, or `None` when
/// the block no longer exists.
pub fn toggle_todo(editor: &mut blockwise_core::Editor, id: &BlockId) -> blockwise_core::CoreResult<Option<bool>> {
    let out = editor
        .run_command("todo.toggle", Some(json!({ "id": id.as_str() })))
        .ignore_miss()?;
    Ok(out.flatten().and_then(|value| value.as_bool()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PlainText, ctx};
    use crate::{default_registry, paragraph};
    use blockwise_core::parsers::HtmlParse;
    use blockwise_core::{BlockData, Editor, Format, HtmlNode, KeyEvent, PluginRegistry};

    fn parse(plugin: &Plugin, el: &HtmlElement) -> Option<Vec<ParsedBlock>> {
        match &plugin.parsers.html_deserialize.as_ref()?.parse {
            HtmlParse::Block(parse) => parse(el, &ParseContext::new(&PlainText)),
            HtmlParse::Inline(_) => None,
        }
    }

    fn list_html(tag: &str, items: &[&str]) -> HtmlElement {
        items.iter().fold(HtmlElement::new(tag), |el, item| {
            el.with_child(HtmlNode::Element(HtmlElement::new("li").with_text(*item)))
        })
    }

    #[test]
    fn test_numbered_list_round_trip() {
        let plugin = numbered_list();
        let parsed = parse(&plugin, &list_html("ol", &["one", "two"])).unwrap();
        let root = &parsed[0].value[0];
        assert_eq!(root.kind, "numbered-list");
        assert_eq!(root.children.len(), 2);

        let markdown = plugin.parsers.serializer(Format::Markdown).unwrap();
        assert_eq!(
            markdown(root, "", &ctx(Format::Markdown, 1, None)),
            "  1. one\n  2. two"
        );
        let html = plugin.parsers.serializer(Format::Html).unwrap();
        assert_eq!(
            html(root, "", &ctx(Format::Html, 0, None)),
            "<ol data-meta-depth=\"0\"><li>one</li><li>two</li></ol>"
        );
    }

    #[test]
    fn test_empty_list_gets_one_item() {
        let parsed = parse(&bulleted_list(), &HtmlElement::new("ul")).unwrap();
        let root = &parsed[0].value[0];
        assert_eq!(root.children.len(), 1);
        let registry = PluginRegistry::with_plugins([bulleted_list()]).unwrap();
        let block = blockwise_core::Block::new(BULLETED_LIST, parsed[0].value.clone(), 0);
        assert_eq!(registry.validate_block(&block), Ok(()));
    }

    #[test]
    fn test_todo_html_round_trip() {
        let plugin = todo_list();
        let def = ElementDef::new("todo-list");
        let root = todo_element(&def, true, vec![Descendant::text("Ship it")]);

        let html = plugin.parsers.serializer(Format::Html).unwrap()(&root, "Ship it", &ctx(Format::Html, 0, None));
        assert!(html.contains("data-checked=\"true\""));
        assert!(html.contains(" checked"));

        let el = HtmlElement::new("div")
            .with_attr("data-type", "todo")
            .with_attr("data-checked", "true")
            .with_child(HtmlNode::Element(HtmlElement::new("input").with_attr("type", "checkbox")))
            .with_text(" Ship it");
        let parsed = parse(&plugin, &el).unwrap();
        let parsed_root = &parsed[0].value[0];
        assert!(is_checked(parsed_root));
        assert_eq!(parsed_root.text_content(), "Ship it");

        let md = plugin.parsers.serializer(Format::Markdown).unwrap()(&root, "Ship it", &ctx(Format::Markdown, 0, None));
        assert_eq!(md, "- [x] Ship it");
    }

    #[test]
    fn test_toggle_command() {
        let mut editor = Editor::new(default_registry().unwrap());
        let id = editor
            .insert_block(TODO_LIST, None, BlockData::default(), true)
            .unwrap();

        assert_eq!(toggle_todo(&mut editor, &id).unwrap(), Some(true));
        assert!(is_checked(&editor.block(&id).unwrap().value[0]));
        assert_eq!(toggle_todo(&mut editor, &id).unwrap(), Some(false));

        assert_eq!(toggle_todo(&mut editor, &BlockId::from("gone")).unwrap(), None);

        let para = editor
            .insert_block("Paragraph", None, BlockData::default(), false)
            .unwrap();
        assert!(toggle_todo(&mut editor, &para).is_err());
    }

    #[test]
    fn test_space_converts_shortcut() {
        let registry = PluginRegistry::with_plugins([paragraph(), todo_list()]).unwrap();
        let mut editor = Editor::new(registry);
        let id = editor
            .insert_block(
                "Paragraph",
                None,
                BlockData::default().with_value(vec![Element::new("paragraph").with_text("[x]")]),
                true,
            )
            .unwrap();

        let outcome = editor.handle_key_down(&KeyEvent::plain(Key::Space)).unwrap();
        assert_eq!(outcome, KeyOutcome::Claimed);

        let block = editor.block(&id).unwrap();
        assert_eq!(block.kind, TODO_LIST);
        assert_eq!(block.text(), "");
        assert!(is_checked(&block.value[0]));
        assert!(editor.undo().unwrap());
        assert_eq!(editor.block(&id).unwrap().kind, "Paragraph");

        let other = editor
            .insert_block(
                "Paragraph",
                None,
                BlockData::default().with_value(vec![Element::new("paragraph").with_text("hello")]),
                true,
            )
            .unwrap();
        assert_eq!(
            editor.handle_key_down(&KeyEvent::plain(Key::Space)).unwrap(),
            KeyOutcome::Pass
        );
        assert_eq!(editor.block(&other).unwrap().kind, "Paragraph");
    }
}
