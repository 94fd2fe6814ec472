//! The flat plugin registry.
//!
//! Plugins are looked up by their `kind` string. Registration order is kept
//! because it decides which HTML deserializer and which key handler gets a
//! chance first.

use std::collections::HashMap;
use std::sync::Arc;

use blockwise_inline::{Element, InlineExtension};

use crate::block::Block;
use crate::command::CommandSpec;
use crate::plugin::{KeyDownFn, Plugin};
use crate::schema::{ConfigurationError, ElementDef, ValidationError};
use crate::{CoreError, CoreResult};

/// Registered plugins, immutable once handed to an editor.
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<Plugin>>,
    /// Plugin kinds in registration order
    order: Vec<String>,
    /// Command id to the kind of the plugin that owns it
    commands: HashMap<String, String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry, failing on the first invalid plugin.
    pub fn with_plugins(
        plugins: impl IntoIterator<Item = Plugin>,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        for plugin in plugins {
            registry.register(plugin)?;
        }
        Ok(registry)
    }

    /// Validates and adds a plugin.
    pub fn register(&mut self, plugin: Plugin) -> Result<(), ConfigurationError> {
        plugin.validate()?;

        if self.plugins.contains_key(&plugin.kind) {
            return Err(ConfigurationError::DuplicatePlugin(plugin.kind));
        }
        for spec in &plugin.commands {
            if self.commands.contains_key(&spec.id) {
                return Err(ConfigurationError::DuplicateCommand(spec.id.clone()));
            }
        }

        for spec in &plugin.commands {
            self.commands.insert(spec.id.clone(), plugin.kind.clone());
        }
        tracing::debug!(plugin = %plugin.kind, role = ?plugin.role, "Registered plugin");
        self.order.push(plugin.kind.clone());
        self.plugins.insert(plugin.kind.clone(), Arc::new(plugin));
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<Plugin>> {
        self.plugins.get(kind)
    }

    /// Like [`get`](Self::get), failing with `BlockTypeNotFound`.
    pub fn require(&self, kind: &str) -> CoreResult<&Arc<Plugin>> {
        self.get(kind)
            .ok_or_else(|| CoreError::BlockTypeNotFound(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.plugins.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Plugins in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Plugin>> {
        self.order.iter().filter_map(|kind| self.plugins.get(kind))
    }

    /// Inline plugins in registration order.
    pub fn inline_plugins(&self) -> impl Iterator<Item = &Arc<Plugin>> {
        self.iter().filter(|plugin| plugin.is_inline())
    }

    /// The inline plugin whose root element type is `kind`.
    pub fn inline_plugin_for(&self, kind: &str) -> Option<&Arc<Plugin>> {
        self.inline_plugins()
            .find(|plugin| plugin.schema.root() == kind)
    }

    /// Returns true if `el` belongs to an inline plugin.
    pub fn is_injectable(&self, el: &Element) -> bool {
        self.inline_plugin_for(&el.kind).is_some()
    }

    /// Declaration of element type `element` within block type `kind`.
    pub fn element_def(&self, kind: &str, element: &str) -> Option<&ElementDef> {
        self.get(kind)?.schema.get(element)
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        let kind = self.commands.get(id)?;
        self.get(kind)?
            .commands
            .iter()
            .find(|spec| spec.id == id)
            .cloned()
    }

    /// All command ids, sorted.
    pub fn command_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Inline engine extensions for blocks of type `kind`.
    ///
    /// A block gets its own plugin's extensions plus those of every inline
    /// plugin, since inline elements can be injected into any block.
    pub fn extensions_for(&self, kind: &str) -> Vec<Arc<dyn InlineExtension>> {
        let own = self
            .get(kind)
            .filter(|plugin| !plugin.is_inline())
            .map(|plugin| plugin.extensions.clone())
            .unwrap_or_default();
        own.into_iter()
            .chain(
                self.inline_plugins()
                    .flat_map(|plugin| plugin.extensions.iter().cloned()),
            )
            .collect()
    }

    /// Checks a block against its plugin's schema.
    pub fn validate_block(&self, block: &Block) -> Result<(), ValidationError> {
        let plugin = self
            .get(&block.kind)
            .filter(|plugin| !plugin.is_inline())
            .ok_or_else(|| ValidationError::UnknownBlockType(block.kind.clone()))?;
        plugin
            .schema
            .validate_value(&block.value, &|el: &Element| self.is_injectable(el))
            .map_err(|e| e.in_block(&block.id))
    }

    /// `on_key_down` handlers in registration order.
    pub fn key_down_handlers(&self) -> Vec<(String, KeyDownFn)> {
        self.iter()
            .filter_map(|plugin| {
                plugin
                    .events
                    .on_key_down
                    .clone()
                    .map(|handler| (plugin.kind.clone(), handler))
            })
            .collect()
    }
}
