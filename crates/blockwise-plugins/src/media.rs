//! Void blocks: divider and image.
//!
//! Void elements hold a single empty text leaf and no editable text, so the
//! caret skips over them and Backspace after one deletes it whole.

use blockwise_core::parsers::{email_block_attrs, escape_html, html_block_attrs, markdown_indent};
use blockwise_core::{
    BlockId, BlockPatch, CommandSpec, ConfigurationError, CoreError, ElementDef, ElementSchema,
    HtmlDeserializer, ParsedBlock, Parsers, Plugin, PluginOverrides,
};
use blockwise_inline::{Element, NodeType};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::leaf;

pub const DIVIDER: &str = "Divider";
pub const IMAGE: &str = "Image";

pub const DEFAULT_IMAGE_ACCEPT: &str = "image/png, image/jpeg, image/gif, image/webp";
pub const DEFAULT_IMAGE_MAX_WIDTH: u64 = 650;

pub fn divider() -> Plugin {
    let def = ElementDef::new("divider").node_type(NodeType::Void);
    let parse_def = def.clone();

    Plugin::block(DIVIDER, ElementSchema::new(def))
        .display("Divider", "Separate sections with a line")
        .shortcuts(["---"])
        .parsers(
            Parsers::default()
                .html(|_, _, ctx| format!("<hr{} />", html_block_attrs(ctx)))
                .markdown(|_, _, ctx| format!("{}---", markdown_indent(ctx.depth)))
                .email(|_, _, ctx| {
                    let style = "margin: 16px 0; border: none; border-top: 1px solid #e5e7eb";
                    format!("<hr{} />", email_block_attrs(ctx, style))
                })
                .deserialize(HtmlDeserializer::block(["HR"], move |_, _| {
                    Some(vec![ParsedBlock::new(leaf(&parse_def, Vec::new()))])
                })),
        )
}

/// Arguments of the `image.set_source` command.
#[derive(Debug, Deserialize)]
struct SetSource {
    id: Option<String>,
    src: String,
    alt: Option<String>,
    width: Option<u64>,
    height: Option<u64>,
}

/// Upload constraints of the image plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    /// Comma-separated MIME types offered by the host's file picker
    pub accept: String,
    pub max_width: u64,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            accept: DEFAULT_IMAGE_ACCEPT.to_string(),
            max_width: DEFAULT_IMAGE_MAX_WIDTH,
        }
    }
}

fn image_element(def: &ElementDef, src: &str, alt: &str, width: Option<u64>, height: Option<u64>) -> Element {
    let mut el = leaf(def, Vec::new());
    el.set_prop("src", src);
    el.set_prop("alt", alt);
    el.set_prop("width", width.map_or(Value::Null, Value::from));
    el.set_prop("height", height.map_or(Value::Null, Value::from));
    el
}

/// `width`/`height` attributes, skipping unknown sizes.
fn size_attrs(root: &Element) -> String {
    let mut out = String::new();
    for key in ["width", "height"] {
        if let Some(px) = root.prop(key).and_then(Value::as_u64) {
            out.push_str(&format!(" {key}=\"{px}\""));
        }
    }
    out
}

/// Image block. The host uploads the file and reports the result through
/// the `image.set_source` command, whose width is capped by `max_width`.
pub fn image() -> Plugin {
    let def = ElementDef::new("image")
        .node_type(NodeType::Void)
        .prop("src", Value::Null)
        .prop("alt", "")
        .prop("width", Value::Null)
        .prop("height", Value::Null);
    let parse_def = def.clone();
    let command_def = def.clone();
    let defaults = ImageOptions::default();

    Plugin::block(IMAGE, ElementSchema::new(def))
        .display("Image", "Upload or embed an image")
        .option("accept", defaults.accept)
        .option("max_width", defaults.max_width)
        .command(
            CommandSpec::new("image.set_source", move |editor, args| {
                let args: SetSource = serde_json::from_value(args.unwrap_or(Value::Null))?;
                if args.src.trim().is_empty() {
                    return Err(CoreError::InvalidOperation(
                        "image.set_source needs a non-empty src".to_string(),
                    ));
                }
                let id = editor.target_block(args.id.map(BlockId::from).as_ref())?;
                let kind = editor.content().require(&id)?.kind.clone();
                if kind != IMAGE {
                    return Err(CoreError::InvalidOperation(format!(
                        "Block {id} is a {kind}, not an image"
                    )));
                }

                let max_width = editor
                    .registry()
                    .get(IMAGE)
                    .and_then(|plugin| plugin.extra("max_width"))
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_IMAGE_MAX_WIDTH);
                let (width, height) = match (args.width, args.height) {
                    (Some(w), Some(h)) if w > max_width => (Some(max_width), Some(h * max_width / w)),
                    (Some(w), h) => (Some(w.min(max_width)), h),
                    (None, h) => (None, h),
                };

                let alt = args.alt.unwrap_or_default();
                let value = vec![image_element(&command_def, &args.src, &alt, width, height)];
                editor.update_block(&id, BlockPatch::value(value))?;
                tracing::debug!(block = %id, src = %args.src, "Image source set");
                Ok(Some(json!({ "width": width, "height": height })))
            })
            .description("Set the source of an image block after an upload"),
        )
        .parsers(
            Parsers::default()
                .html(|root, _, ctx| {
                    let src = root.prop_str("src").unwrap_or_default();
                    let alt = root.prop_str("alt").unwrap_or_default();
                    format!(
                        "<img src=\"{}\" alt=\"{}\"{}{} />",
                        escape_html(src),
                        escape_html(alt),
                        size_attrs(root),
                        html_block_attrs(ctx)
                    )
                })
                .markdown(|root, _, ctx| {
                    let src = root.prop_str("src").unwrap_or_default();
                    let alt = root.prop_str("alt").unwrap_or_default();
                    format!("{}![{}]({})", markdown_indent(ctx.depth), alt, src)
                })
                .email(|root, _, ctx| {
                    let src = root.prop_str("src").unwrap_or_default();
                    let alt = root.prop_str("alt").unwrap_or_default();
                    format!(
                        "<div{}><img src=\"{}\" alt=\"{}\"{} style=\"display: block; max-width: 100%; height: auto; border: 0\" /></div>",
                        email_block_attrs(ctx, "margin: 0 0 16px"),
                        escape_html(src),
                        escape_html(alt),
                        size_attrs(root)
                    )
                })
                .deserialize(HtmlDeserializer::block(["IMG"], move |el, _| {
                    let src = el.attr("src")?;
                    let size = |key: &str| -> Option<u64> {
                        el.attr(key)?.trim_end_matches("px").parse().ok()
                    };
                    let root = image_element(
                        &parse_def,
                        src,
                        el.attr("alt").unwrap_or_default(),
                        size("width"),
                        size("height"),
                    );
                    Some(vec![ParsedBlock::new(root)])
                })),
        )
}

/// The image plugin with custom upload constraints.
pub fn image_with(options: ImageOptions) -> Result<Plugin, ConfigurationError> {
    image().extend(
        PluginOverrides::default()
            .option("accept", options.accept)
            .option("max_width", options.max_width),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paragraph;
    use crate::testing::ctx;
    use blockwise_core::{BlockData, Editor, Format, PluginRegistry};

    fn editor_with(image: Plugin) -> (Editor, BlockId) {
        let registry = PluginRegistry::with_plugins([paragraph(), image]).unwrap();
        let mut editor = Editor::new(registry);
        let id = editor
            .insert_block(IMAGE, None, BlockData::default(), true)
            .unwrap();
        (editor, id)
    }

    #[test]
    fn test_set_source_caps_width() {
        let (mut editor, id) = editor_with(image());
        let out = editor
            .run_command(
                "image.set_source",
                Some(json!({ "src": "https://cdn.test/a.png", "alt": "A", "width": 1300, "height": 600 })),
            )
            .unwrap();
        assert_eq!(out, Some(json!({ "width": 650, "height": 300 })));

        let root = &editor.block(&id).unwrap().value[0];
        assert_eq!(root.prop_str("src"), Some("https://cdn.test/a.png"));
        assert_eq!(root.prop("width"), Some(&json!(650)));
        assert!(editor.can_undo());
    }

    #[test]
    fn test_set_source_rejects_bad_input() {
        let (mut editor, _) = editor_with(image());
        assert!(matches!(
            editor.run_command("image.set_source", Some(json!({ "src": " " }))),
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            editor.run_command("image.set_source", None),
            Err(CoreError::Json(_))
        ));

        let paragraph = editor
            .insert_block("Paragraph", None, BlockData::default(), false)
            .unwrap();
        let result = editor.run_command(
            "image.set_source",
            Some(json!({ "id": paragraph.as_str(), "src": "x.png" })),
        );
        assert!(matches!(result, Err(CoreError::InvalidOperation(_))));
    }

    #[test]
    fn test_extended_image_keeps_base_untouched() {
        let base = image();
        let custom = image_with(ImageOptions {
            accept: "image/svg+xml".into(),
            max_width: 200,
        })
        .unwrap();
        assert_eq!(base.extra("max_width"), Some(&json!(650)));
        assert_eq!(custom.extra("accept"), Some(&json!("image/svg+xml")));

        let (mut editor, _) = editor_with(custom);
        let out = editor
            .run_command("image.set_source", Some(json!({ "src": "a.png", "width": 400 })))
            .unwrap();
        assert_eq!(out, Some(json!({ "width": 200, "height": null })));
    }

    #[test]
    fn test_image_and_divider_formats() {
        let def = ElementDef::new("image").node_type(NodeType::Void);
        let root = image_element(&def, "a.png", "Cat \"1\"", Some(100), None);
        let html = image().parsers.serializer(Format::Html).unwrap()(&root, "", &ctx(Format::Html, 0, None));
        assert_eq!(
            html,
            "<img src=\"a.png\" alt=\"Cat &quot;1&quot;\" width=\"100\" data-meta-depth=\"0\" />"
        );
        let md = image().parsers.serializer(Format::Markdown).unwrap()(&root, "", &ctx(Format::Markdown, 1, None));
        assert_eq!(md, "  ![Cat \"1\"](a.png)");

        let hr = divider().parsers.serializer(Format::Markdown).unwrap()(&root, "", &ctx(Format::Markdown, 0, None));
        assert_eq!(hr, "---");
    }
}
