//! HTML import.
//!
//! Every element is offered to the block plugins in registration order;
//! the first deserializer returning `Some` claims it. Elements nobody
//! claims are descended into, and runs of loose text or phrasing elements
//! become blocks of the default type.

use blockwise_core::config::EditorConfig;
use blockwise_core::parsers::{HtmlParse, InlineParser, ParseContext, ParsedBlock};
use blockwise_core::{
    Block, BlockMeta, ContentStore, CoreError, HtmlElement, HtmlNode, PluginRegistry,
};
use blockwise_inline::{Descendant, Element, InlineDocument, Text, element_at_mut};

use crate::ExportResult;
use crate::html::parse_html;
use crate::inline::{InlineCodec, PHRASING_TAGS};

/// Builds a [`ContentStore`] out of HTML.
pub struct Importer<'r> {
    registry: &'r PluginRegistry,
    default_block: String,
    max_depth: usize,
}

impl<'r> Importer<'r> {
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self::with_config(registry, &EditorConfig::default())
    }

    /// Uses the default block type and depth limit of `config`.
    pub fn with_config(registry: &'r PluginRegistry, config: &EditorConfig) -> Self {
        Self {
            registry,
            default_block: config.default_block.clone(),
            max_depth: config.max_depth,
        }
    }

    pub fn import(&self, html: &str) -> ExportResult<ContentStore> {
        let nodes = parse_html(html)?;
        let codec = InlineCodec::new(self.registry);
        let mut blocks = Vec::new();
        self.import_nodes(&codec, &nodes, &mut blocks)?;

        let mut store = Vec::with_capacity(blocks.len());
        for (kind, parsed, source) in blocks {
            let depth = parsed
                .depth
                .or_else(|| source.as_ref().and_then(HtmlElement::meta_depth))
                .unwrap_or(0)
                .min(self.max_depth);
            let align = parsed
                .align
                .or_else(|| source.as_ref().and_then(HtmlElement::meta_align));
            let value = self.fit_value(&kind, parsed.value);

            let mut block = Block::new(kind, value, store.len());
            block.meta = BlockMeta {
                order: store.len(),
                depth,
                align,
            };
            match self.registry.validate_block(&block) {
                Ok(()) => store.push(block),
                Err(e) => tracing::warn!(kind = %block.kind, error = %e, "Dropping imported block"),
            }
        }

        tracing::debug!(blocks = store.len(), "Imported HTML");
        Ok(ContentStore::from_blocks(store))
    }

    fn import_nodes(
        &self,
        codec: &InlineCodec<'_>,
        nodes: &[HtmlNode],
        out: &mut Vec<(String, ParsedBlock, Option<HtmlElement>)>,
    ) -> ExportResult<()> {
        let mut loose: Vec<HtmlNode> = Vec::new();
        for node in nodes {
            match node {
                HtmlNode::Text(_) => loose.push(node.clone()),
                HtmlNode::Element(el) => {
                    if let Some((kind, parsed)) = self.claim(codec, el) {
                        self.flush_loose(codec, &mut loose, out)?;
                        out.extend(
                            parsed
                                .into_iter()
                                .map(|block| (kind.clone(), block, Some(el.clone()))),
                        );
                    } else if self.is_phrasing(&el.name) {
                        loose.push(node.clone());
                    } else {
                        self.flush_loose(codec, &mut loose, out)?;
                        self.import_nodes(codec, &el.children, out)?;
                    }
                }
            }
        }
        self.flush_loose(codec, &mut loose, out)
    }

    /// The first block plugin claiming `el`.
    fn claim(&self, codec: &InlineCodec<'_>, el: &HtmlElement) -> Option<(String, Vec<ParsedBlock>)> {
        let ctx = ParseContext::new(codec);
        self.registry
            .iter()
            .filter(|plugin| !plugin.is_inline())
            .find_map(|plugin| {
                let deserializer = plugin.parsers.html_deserialize.as_ref()?;
                if !deserializer.matches(&el.name) {
                    return None;
                }
                match &deserializer.parse {
                    HtmlParse::Block(parse) => parse(el, &ctx).map(|blocks| (plugin.kind.clone(), blocks)),
                    HtmlParse::Inline(_) => None,
                }
            })
    }

    fn is_phrasing(&self, name: &str) -> bool {
        PHRASING_TAGS.contains(&name)
            || self.registry.inline_plugins().any(|plugin| {
                plugin
                    .parsers
                    .html_deserialize
                    .as_ref()
                    .is_some_and(|d| d.matches(name))
            })
    }

    /// Turns collected loose nodes into one default block.
    fn flush_loose(
        &self,
        codec: &InlineCodec<'_>,
        loose: &mut Vec<HtmlNode>,
        out: &mut Vec<(String, ParsedBlock, Option<HtmlElement>)>,
    ) -> ExportResult<()> {
        let nodes = std::mem::take(loose);
        let children = codec.parse_inline(&nodes);
        if children.iter().all(|child| child.text_content().trim().is_empty()) {
            return Ok(());
        }

        let plugin = self
            .registry
            .get(&self.default_block)
            .filter(|plugin| !plugin.is_inline())
            .ok_or_else(|| CoreError::BlockTypeNotFound(self.default_block.clone()))?;
        let mut value = plugin.schema.default_tree();
        if let Some(leaf) = plugin
            .schema
            .text_leaf_path(&value)
            .and_then(|path| element_at_mut(&mut value, &path))
        {
            leaf.children = children;
        }
        out.push((
            plugin.kind.clone(),
            ParsedBlock {
                value,
                depth: None,
                align: None,
            },
            None,
        ));
        Ok(())
    }

    /// Normalizes a parsed value and flattens inline elements its schema
    /// does not accept.
    fn fit_value(&self, kind: &str, value: Vec<Element>) -> Vec<Element> {
        let mut value = value;
        for root in &mut value {
            self.fit_element(kind, root);
        }
        InlineDocument::with_extensions(value, self.registry.extensions_for(kind)).into_children()
    }

    fn fit_element(&self, kind: &str, el: &mut Element) {
        let Some(def) = self.registry.element_def(kind, &el.kind) else {
            return;
        };
        if !def.is_leaf() {
            for child in &mut el.children {
                if let Descendant::Element(child) = child {
                    self.fit_element(kind, child);
                }
            }
            return;
        }

        let allow = def.allow_injected;
        for child in &mut el.children {
            let Descendant::Element(inline) = child else {
                continue;
            };
            if allow && self.registry.is_injectable(inline) {
                flatten_elements(&mut inline.children);
            } else {
                *child = Descendant::Text(Text::new(inline.text_content()));
            }
        }
        if el.children.is_empty() {
            el.children.push(Descendant::text(""));
        }
    }
}

/// Replaces nested elements with their plain text.
fn flatten_elements(children: &mut [Descendant]) {
    for child in children {
        if let Descendant::Element(el) = child {
            *child = Descendant::Text(Text::new(el.text_content()));
        }
    }
}

/// Imports HTML with the default editor settings.
pub fn from_html(html: &str, registry: &PluginRegistry) -> ExportResult<ContentStore> {
    Importer::new(registry).import(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockwise_core::{Align, ElementDef, ElementSchema, HtmlDeserializer, Parsers, Plugin};
    use blockwise_plugins::{default_registry, link, paragraph};

    fn kinds(store: &ContentStore) -> Vec<String> {
        store.ordered().iter().map(|block| block.kind.clone()).collect()
    }

    fn texts(store: &ContentStore) -> Vec<String> {
        store.ordered().iter().map(|block| block.text()).collect()
    }

    #[test]
    fn test_import_blocks_in_order() {
        let registry = default_registry().unwrap();
        let store = from_html(
            "<h2>Intro</h2><p>First <b>bold</b></p><hr><ul><li>a</li><li>b</li></ul>",
            &registry,
        )
        .unwrap();
        assert_eq!(kinds(&store), ["HeadingTwo", "Paragraph", "Divider", "BulletedList"]);
        assert_eq!(texts(&store)[..2], ["Intro".to_string(), "First bold".to_string()]);
        assert_eq!(store.check_orders(), Ok(()));
        assert_eq!(store.validate(&registry), Ok(()));
    }

    #[test]
    fn test_bare_less_than_keeps_blocks_apart() {
        let registry = default_registry().unwrap();
        let store = from_html("<p>1 < 2</p><p>ok</p>", &registry).unwrap();
        assert_eq!(kinds(&store), ["Paragraph", "Paragraph"]);
        assert_eq!(texts(&store), ["1 < 2", "ok"]);
    }

    #[test]
    fn test_wrappers_and_loose_text() {
        let registry = default_registry().unwrap();
        let store = from_html(
            "<html><body><article>Loose <em>words</em><section><p>Inside</p></section></article></body></html>",
            &registry,
        )
        .unwrap();
        assert_eq!(kinds(&store), ["Paragraph", "Paragraph"]);
        assert_eq!(texts(&store), ["Loose words", "Inside"]);
    }

    #[test]
    fn test_meta_from_attributes_and_styles() {
        let registry = default_registry().unwrap();
        let store = from_html(
            "<p data-meta-depth=\"2\" data-meta-align=\"right\">a</p>\
             <p style=\"margin-left: 20px; text-align: center\">b</p>\
             <p data-meta-depth=\"99\">c</p>",
            &registry,
        )
        .unwrap();
        let blocks = store.ordered();
        assert_eq!(blocks[0].meta.depth, 2);
        assert_eq!(blocks[0].meta.align, Some(Align::Right));
        assert_eq!(blocks[1].meta.depth, 1);
        assert_eq!(blocks[1].meta.align, Some(Align::Center));
        assert_eq!(blocks[2].meta.depth, EditorConfig::default().max_depth);
    }

    #[test]
    fn test_links_kept_only_where_injection_is_allowed() {
        let note_def = ElementDef::new("note");
        let note = Plugin::block("Note", ElementSchema::new(note_def.clone())).parsers(
            Parsers::default().deserialize(HtmlDeserializer::block(["ASIDE"], move |el, ctx| {
                let mut root = note_def.instantiate();
                root.children = ctx.inline_children(el);
                Some(vec![ParsedBlock::new(root)])
            })),
        );
        let registry = PluginRegistry::with_plugins([paragraph(), note, link()]).unwrap();

        let store = from_html(
            "<p>see <a href=\"/a\">docs</a></p><aside>also <a href=\"/b\">this</a></aside>",
            &registry,
        )
        .unwrap();
        let blocks = store.ordered();
        let injected = blocks[0].value[0].children[1].as_element();
        assert_eq!(injected.map(|el| el.kind.as_str()), Some("link"));
        assert_eq!(blocks[1].kind, "Note");
        assert!(blocks[1].value[0].children.iter().all(|child| child.as_text().is_some()));
        assert_eq!(blocks[1].text(), "also this");
        assert_eq!(store.validate(&registry), Ok(()));
    }

    #[test]
    fn test_unknown_default_block() {
        let registry = default_registry().unwrap();
        let config = EditorConfig {
            default_block: "Missing".to_string(),
            ..EditorConfig::default()
        };
        let result = Importer::with_config(&registry, &config).import("loose text");
        assert!(matches!(
            result,
            Err(crate::ExportError::Core(CoreError::BlockTypeNotFound(_)))
        ));
    }
}
