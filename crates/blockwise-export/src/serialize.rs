//! Document export.

use blockwise_core::config::ExportConfig;
use blockwise_core::parsers::{InlineRenderer, SerializeContext, escape_html};
use blockwise_core::{Block, ContentStore, Format, PluginRegistry};
use blockwise_inline::element_at;

use crate::inline::InlineCodec;

/// Serializes a [`ContentStore`] with the parsers of a registry.
///
/// Blocks are written in ascending order. A block whose plugin has no
/// serializer for the format, or whose type is not registered, contributes
/// nothing.
pub struct Exporter<'r> {
    registry: &'r PluginRegistry,
    config: ExportConfig,
}

impl<'r> Exporter<'r> {
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self::with_config(registry, ExportConfig::default())
    }

    pub fn with_config(registry: &'r PluginRegistry, config: ExportConfig) -> Self {
        Self { registry, config }
    }

    pub fn to_html(&self, store: &ContentStore) -> String {
        self.blocks(store, Format::Html).concat()
    }

    pub fn to_markdown(&self, store: &ContentStore) -> String {
        self.blocks(store, Format::Markdown)
            .join(&self.config.markdown_block_separator)
    }

    /// A complete email document: a centred fixed-width table around the
    /// serialized blocks.
    pub fn to_email_html(&self, store: &ContentStore) -> String {
        let body = self.blocks(store, Format::Email).concat();
        let width = self.config.email_width;
        let background = escape_html(&self.config.email_background);
        let font = escape_html(&self.config.email_font_family);
        format!(
            "<!DOCTYPE html>\
             <html><head><meta charset=\"utf-8\" />\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" /></head>\
             <body style=\"margin: 0; padding: 0; background-color: {background}\">\
             <table role=\"presentation\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\" style=\"background-color: {background}\">\
             <tr><td align=\"center\">\
             <table role=\"presentation\" width=\"{width}\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\" \
             style=\"width: {width}px; max-width: 100%; font-family: {font}; font-size: 16px; line-height: 1.5; color: #111827\">\
             <tr><td style=\"padding: 24px\">{body}</td></tr>\
             </table></td></tr></table></body></html>"
        )
    }

    /// Serialized blocks in order, skipping empty output.
    fn blocks(&self, store: &ContentStore, format: Format) -> Vec<String> {
        let codec = InlineCodec::new(self.registry);
        store
            .ordered()
            .into_iter()
            .map(|block| self.block(&codec, block, format))
            .filter(|out| !out.is_empty())
            .collect()
    }

    fn block(&self, codec: &InlineCodec<'_>, block: &Block, format: Format) -> String {
        let Some(plugin) = self.registry.get(&block.kind) else {
            tracing::warn!(block = %block.id, kind = %block.kind, "Skipping block of unknown type");
            return String::new();
        };
        let Some(serialize) = plugin.parsers.serializer(format) else {
            tracing::debug!(kind = %block.kind, ?format, "No serializer for format");
            return String::new();
        };
        let Some(root) = block.value.first() else {
            return String::new();
        };

        let text = plugin
            .schema
            .text_leaf_path(&block.value)
            .and_then(|path| element_at(&block.value, &path))
            .map(|leaf| codec.render(&leaf.children, format))
            .unwrap_or_default();
        let ctx = SerializeContext::new(format, block.meta.depth, block.meta.align, codec);
        serialize(root, &text, &ctx)
    }
}

/// HTML of every block, concatenated.
pub fn to_html(store: &ContentStore, registry: &PluginRegistry) -> String {
    Exporter::new(registry).to_html(store)
}

/// Markdown of every block, separated by blank lines.
pub fn to_markdown(store: &ContentStore, registry: &PluginRegistry) -> String {
    Exporter::new(registry).to_markdown(store)
}

/// A standalone email document with default styling.
pub fn to_email_html(store: &ContentStore, registry: &PluginRegistry) -> String {
    Exporter::new(registry).to_email_html(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockwise_core::{Align, BlockData, Editor};
    use blockwise_plugins::default_registry;
    use blockwise_plugins::text::PARAGRAPH;

    fn document() -> Editor {
        let mut editor = Editor::new(default_registry().unwrap());
        let heading = editor
            .insert_block("HeadingOne", None, BlockData::default(), true)
            .unwrap();
        editor.insert_text("Title").unwrap();
        editor
            .insert_block(PARAGRAPH, None, BlockData::default().with_depth(1), true)
            .unwrap();
        editor.insert_text("Body & more").unwrap();
        editor
            .update_block(&heading, blockwise_core::BlockPatch::align(Some(Align::Center)))
            .unwrap();
        editor
    }

    #[test]
    fn test_to_html() {
        let editor = document();
        let html = to_html(editor.value(), editor.registry());
        assert_eq!(
            html,
            "<h1 data-meta-depth=\"0\" data-meta-align=\"center\" style=\"text-align: center\">Title</h1>\
             <p data-meta-depth=\"1\" style=\"margin-left: 20px\">Body &amp; more</p>"
        );
    }

    #[test]
    fn test_to_markdown() {
        let editor = document();
        let md = to_markdown(editor.value(), editor.registry());
        assert_eq!(md, "# Title\n\n  Body & more");

        let config = ExportConfig {
            markdown_block_separator: "\n---\n".to_string(),
            ..ExportConfig::default()
        };
        let md = Exporter::with_config(editor.registry(), config).to_markdown(editor.value());
        assert_eq!(md, "# Title\n---\n  Body & more");
    }

    #[test]
    fn test_to_email_html() {
        let editor = document();
        let config = ExportConfig {
            email_width: 480,
            ..ExportConfig::default()
        };
        let email = Exporter::with_config(editor.registry(), config).to_email_html(editor.value());
        assert!(email.starts_with("<!DOCTYPE html>"));
        assert!(email.contains("width=\"480\""));
        assert!(email.contains("Body &amp; more"));
        assert!(email.contains("margin-left: 20px"));
    }

    #[test]
    fn test_unknown_and_empty_stores() {
        let registry = default_registry().unwrap();
        assert_eq!(to_html(&ContentStore::new(), &registry), "");
        assert_eq!(to_markdown(&ContentStore::new(), &registry), "");
    }
}
