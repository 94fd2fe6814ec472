//! The plugin contract.
//!
//! ## Learning: Plugins as Values
//!
//! A [`Plugin`] is plain data: a schema, some options and a handful of
//! `Arc`-wrapped closures. Deriving a customised plugin is therefore a clone
//! plus field updates (`extend`), and the base plugin is never mutated.

use std::sync::Arc;

use blockwise_inline::{Element, InlineExtension, NodeType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::command::CommandSpec;
use crate::editor::Editor;
use crate::keymap::{KeyEvent, KeyOutcome};
use crate::parsers::Parsers;
use crate::schema::{ConfigurationError, ElementDef, ElementSchema};

/// Whether a plugin owns whole blocks or elements inside other blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginRole {
    Block,
    Inline,
}

/// Human-facing plugin metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDisplay {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    pub display: PluginDisplay,
    /// Typed shortcuts that convert a block into this type (`#`, `[]`)
    pub shortcuts: Vec<String>,
    /// Plugin-specific settings
    pub extra: Map<String, Value>,
}

pub type BeforeCreateFn = Arc<dyn Fn(&Editor) -> Vec<Element> + Send + Sync>;
pub type KeyDownFn = Arc<dyn Fn(&mut Editor, &KeyEvent) -> KeyOutcome + Send + Sync>;

#[derive(Clone, Default)]
pub struct Lifecycle {
    /// Supplies the value of a block inserted without one
    pub before_create: Option<BeforeCreateFn>,
}

#[derive(Clone, Default)]
pub struct PluginEvents {
    pub on_key_down: Option<KeyDownFn>,
}

/// A content plugin.
#[derive(Clone)]
pub struct Plugin {
    pub kind: String,
    pub role: PluginRole,
    pub schema: ElementSchema,
    pub options: PluginOptions,
    pub commands: Vec<CommandSpec>,
    pub parsers: Parsers,
    pub lifecycle: Lifecycle,
    pub events: PluginEvents,
    pub extensions: Vec<Arc<dyn InlineExtension>>,
}

impl Plugin {
    /// Creates a block plugin.
    pub fn block(kind: impl Into<String>, schema: ElementSchema) -> Self {
        Self::with_role(kind, PluginRole::Block, schema)
    }

    /// Creates an inline plugin.
    pub fn inline(kind: impl Into<String>, schema: ElementSchema) -> Self {
        Self::with_role(kind, PluginRole::Inline, schema)
    }

    fn with_role(kind: impl Into<String>, role: PluginRole, schema: ElementSchema) -> Self {
        Self {
            kind: kind.into(),
            role,
            schema,
            options: PluginOptions::default(),
            commands: Vec::new(),
            parsers: Parsers::default(),
            lifecycle: Lifecycle::default(),
            events: PluginEvents::default(),
            extensions: Vec::new(),
        }
    }

    // ==================== Builder ====================

    pub fn display(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.options.display = PluginDisplay {
            title: title.into(),
            description: description.into(),
        };
        self
    }

    pub fn shortcuts<I, S>(mut self, shortcuts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.shortcuts = shortcuts.into_iter().map(Into::into).collect();
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.extra.insert(key.into(), value.into());
        self
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn parsers(mut self, parsers: Parsers) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn before_create(
        mut self,
        f: impl Fn(&Editor) -> Vec<Element> + Send + Sync + 'static,
    ) -> Self {
        self.lifecycle.before_create = Some(Arc::new(f));
        self
    }

    pub fn on_key_down(
        mut self,
        f: impl Fn(&mut Editor, &KeyEvent) -> KeyOutcome + Send + Sync + 'static,
    ) -> Self {
        self.events.on_key_down = Some(Arc::new(f));
        self
    }

    pub fn extension(mut self, extension: impl InlineExtension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    // ==================== Queries ====================

    pub fn is_inline(&self) -> bool {
        self.role == PluginRole::Inline
    }

    /// Looks up a plugin-specific option.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.options.extra.get(key)
    }

    /// Returns true if this plugin declares an element of type `kind`.
    pub fn declares(&self, kind: &str) -> bool {
        self.schema.get(kind).is_some()
    }

    /// Checks the plugin on its own, before it joins a registry.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.schema.validate_config()?;

        if self.is_inline()
            && self
                .schema
                .root_def()
                .is_some_and(|root| root.node_type != NodeType::Inline)
        {
            return Err(ConfigurationError::InlineRootNotInline(self.kind.clone()));
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.commands {
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigurationError::DuplicateCommand(spec.id.clone()));
            }
        }
        Ok(())
    }

    /// Derives a customised plugin without touching `self`.
    pub fn extend(&self, overrides: PluginOverrides) -> Result<Plugin, ConfigurationError> {
        let mut plugin = self.clone();

        if let Some(display) = overrides.display {
            plugin.options.display = display;
        }
        if let Some(shortcuts) = overrides.shortcuts {
            plugin.options.shortcuts = shortcuts;
        }
        plugin.options.extra.extend(overrides.extra);

        for def in overrides.elements {
            plugin.schema.upsert(def);
        }
        for spec in overrides.commands {
            match plugin.commands.iter_mut().find(|c| c.id == spec.id) {
                Some(existing) => *existing = spec,
                None => plugin.commands.push(spec),
            }
        }
        if let Some(parsers) = overrides.parsers {
            plugin.parsers = plugin.parsers.merged(parsers);
        }
        if overrides.before_create.is_some() {
            plugin.lifecycle.before_create = overrides.before_create;
        }
        if overrides.on_key_down.is_some() {
            plugin.events.on_key_down = overrides.on_key_down;
        }

        plugin.validate()?;
        tracing::debug!(plugin = %plugin.kind, "Extended plugin");
        Ok(plugin)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let commands: Vec<&str> = self.commands.iter().map(|c| c.id.as_str()).collect();
        f.debug_struct("Plugin")
            .field("kind", &self.kind)
            .field("role", &self.role)
            .field("schema", &self.schema)
            .field("options", &self.options)
            .field("commands", &commands)
            .field("parsers", &self.parsers)
            .field("before_create", &self.lifecycle.before_create.is_some())
            .field("on_key_down", &self.events.on_key_down.is_some())
            .finish()
    }
}

/// Changes applied by [`Plugin::extend`].
#[derive(Clone, Default)]
pub struct PluginOverrides {
    pub display: Option<PluginDisplay>,
    pub shortcuts: Option<Vec<String>>,
    /// Merged key by key into the base options
    pub extra: Map<String, Value>,
    /// Replace element declarations of the same kind, or add new ones
    pub elements: Vec<ElementDef>,
    /// Replace commands with the same id, or add new ones
    pub commands: Vec<CommandSpec>,
    /// Parsers set here replace the base plugin's
    pub parsers: Option<Parsers>,
    pub before_create: Option<BeforeCreateFn>,
    pub on_key_down: Option<KeyDownFn>,
}

impl PluginOverrides {
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn element(mut self, def: ElementDef) -> Self {
        self.elements.push(def);
        self
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn display(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.display = Some(PluginDisplay {
            title: title.into(),
            description: description.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph() -> Plugin {
        Plugin::block(
            "Paragraph",
            ElementSchema::new(ElementDef::new("paragraph").allow_injected()),
        )
        .display("Text", "Start writing plain text")
        .option("placeholder", "Type something")
    }

    #[test]
    fn test_validate_plugin() {
        assert_eq!(paragraph().validate(), Ok(()));
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let plugin = paragraph()
            .command(CommandSpec::new("paragraph.clear", |_, _| Ok(None)))
            .command(CommandSpec::new("paragraph.clear", |_, _| Ok(None)));
        assert_eq!(
            plugin.validate(),
            Err(ConfigurationError::DuplicateCommand("paragraph.clear".to_string()))
        );
    }

    #[test]
    fn test_inline_plugin_needs_inline_root() {
        let plugin = Plugin::inline("Link", ElementSchema::new(ElementDef::new("link")));
        assert!(matches!(
            plugin.validate(),
            Err(ConfigurationError::InlineRootNotInline(_))
        ));
    }

    #[test]
    fn test_extend_leaves_base_untouched() {
        let base = paragraph();
        let extended = base
            .extend(
                PluginOverrides::default()
                    .display("Body", "Body text")
                    .option("maxLength", 280),
            )
            .unwrap();

        assert_eq!(extended.options.display.title, "Body");
        assert_eq!(extended.extra("placeholder"), base.extra("placeholder"));
        assert_eq!(extended.extra("maxLength"), Some(&Value::from(280)));
        assert_eq!(base.options.display.title, "Text");
        assert_eq!(base.extra("maxLength"), None);
    }

    #[test]
    fn test_extend_revalidates() {
        let bad = PluginOverrides::default()
            .element(ElementDef::new("paragraph").children(["span"]).allow_injected());
        assert!(paragraph().extend(bad).is_err());
    }
}
