//! Command system for editor actions.
//!
//! ## Learning: The Command Pattern
//!
//! Commands encapsulate actions as values:
//! - Key bindings map to them without knowing how they run
//! - They can be named in a config file and parsed back
//!
//! ## Enums vs Closures
//!
//! Built-in commands are an enum (exhaustive, no allocation). Plugin
//! commands are [`CommandSpec`]s holding an `Arc`'d closure, looked up by id
//! in the registry and always run inside a batch.

use std::sync::Arc;

use serde_json::Value;

use crate::block::{BlockData, BlockId};
use crate::editor::{DepthChange, Editor};
use crate::{CoreError, CoreResult};

/// Built-in editor commands.
///
/// Variants that take an `id: Option<BlockId>` act on the focused block
/// when it is `None`.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Command {
    // Block structure
    InsertBlock {
        kind: String,
        at: Option<usize>,
        focus: bool,
    },
    DeleteBlock { id: Option<BlockId> },
    DeleteSelectedBlocks,
    DuplicateBlock { id: Option<BlockId> },
    MoveBlock { id: Option<BlockId>, to: usize },
    ToggleBlock { id: Option<BlockId>, kind: String },
    IncreaseDepth { id: Option<BlockId> },
    DecreaseDepth { id: Option<BlockId> },

    // Text
    SplitBlock,
    MergeBlock { id: Option<BlockId> },
    InsertText { text: String },
    DeleteBackward,

    // Focus
    SelectAllBlocks,
    Blur,

    // History
    Undo,
    Redo,

    /// A plugin command, by id
    Custom { name: String, args: Option<Value> },
}

impl Command {
    pub fn display_name(&self) -> &str {
        match self {
            Command::InsertBlock { .. } => "Insert Block",
            Command::DeleteBlock { .. } => "Delete Block",
            Command::DeleteSelectedBlocks => "Delete Selected Blocks",
            Command::DuplicateBlock { .. } => "Duplicate Block",
            Command::MoveBlock { .. } => "Move Block",
            Command::ToggleBlock { .. } => "Toggle Block",
            Command::IncreaseDepth { .. } => "Increase Depth",
            Command::DecreaseDepth { .. } => "Decrease Depth",
            Command::SplitBlock => "Split Block",
            Command::MergeBlock { .. } => "Merge Block",
            Command::InsertText { .. } => "Insert Text",
            Command::DeleteBackward => "Delete Backward",
            Command::SelectAllBlocks => "Select All Blocks",
            Command::Blur => "Blur",
            Command::Undo => "Undo",
            Command::Redo => "Redo",
            Command::Custom { name, .. } => name,
        }
    }

    /// Parses a command name from a key binding config.
    ///
    /// Names of argument-free built-ins map to those; anything else is taken
    /// to be a plugin command id.
    pub fn from_name(name: &str) -> Self {
        match name {
            "split_block" => Command::SplitBlock,
            "delete_backward" => Command::DeleteBackward,
            "increase_depth" => Command::IncreaseDepth { id: None },
            "decrease_depth" => Command::DecreaseDepth { id: None },
            "duplicate_block" => Command::DuplicateBlock { id: None },
            "delete_block" => Command::DeleteBlock { id: None },
            "delete_selected_blocks" => Command::DeleteSelectedBlocks,
            "merge_block" => Command::MergeBlock { id: None },
            "select_all_blocks" => Command::SelectAllBlocks,
            "blur" => Command::Blur,
            "undo" => Command::Undo,
            "redo" => Command::Redo,
            other => Command::Custom {
                name: other.to_string(),
                args: None,
            },
        }
    }
}

pub type CommandFn =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> CoreResult<Option<Value>> + Send + Sync>;

/// A command contributed by a plugin.
#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub description: Option<String>,
    pub handler: CommandFn,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> CoreResult<Option<Value>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn call(&self, editor: &mut Editor, args: Option<Value>) -> CoreResult<Option<Value>> {
        (self.handler)(editor, args)
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Editor {
    /// Runs a plugin command inside a batch.
    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> CoreResult<Option<Value>> {
        let spec = self
            .registry()
            .command(id)
            .ok_or_else(|| CoreError::CommandNotFound(id.to_string()))?;
        tracing::debug!(command = %id, "Running plugin command");
        self.batch_operations(|editor| spec.call(editor, args))
    }

    /// Executes a built-in command.
    pub fn execute(&mut self, command: &Command) -> CoreResult<()> {
        tracing::debug!(command = command.display_name(), "Executing command");

        match command {
            Command::InsertBlock { kind, at, focus } => {
                self.insert_block(kind, *at, BlockData::default(), *focus)?;
            }
            Command::DeleteBlock { id } => {
                let id = self.target_block(id.as_ref())?;
                self.delete_block(&id, true)?;
            }
            Command::DeleteSelectedBlocks => {
                self.delete_selected_blocks()?;
            }
            Command::DuplicateBlock { id } => {
                let id = self.target_block(id.as_ref())?;
                self.duplicate_block(&id)?;
            }
            Command::MoveBlock { id, to } => {
                let id = self.target_block(id.as_ref())?;
                self.move_block(&id, *to)?;
            }
            Command::ToggleBlock { id, kind } => {
                let id = self.target_block(id.as_ref())?;
                self.toggle_block(&id, kind, true)?;
            }
            Command::IncreaseDepth { id } => {
                let id = self.target_block(id.as_ref())?;
                self.change_block_depth(&id, DepthChange::Increase)?;
            }
            Command::DecreaseDepth { id } => {
                let id = self.target_block(id.as_ref())?;
                self.change_block_depth(&id, DepthChange::Decrease)?;
            }
            Command::SplitBlock => {
                self.split_block(None)?;
            }
            Command::MergeBlock { id } => {
                let id = self.target_block(id.as_ref())?;
                self.merge_block(&id)?;
            }
            Command::InsertText { text } => self.insert_text(text)?,
            Command::DeleteBackward => {
                self.delete_backward()?;
            }
            Command::SelectAllBlocks => self.select_all_blocks(),
            Command::Blur => self.blur(),
            Command::Undo => {
                self.undo()?;
            }
            Command::Redo => {
                self.redo()?;
            }
            Command::Custom { name, args } => {
                self.run_command(name, args.clone())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display_name() {
        assert_eq!(Command::SplitBlock.display_name(), "Split Block");
        let custom = Command::Custom {
            name: "todo.toggle".into(),
            args: None,
        };
        assert_eq!(custom.display_name(), "todo.toggle");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Command::from_name("undo"), Command::Undo);
        assert_eq!(
            Command::from_name("increase_depth"),
            Command::IncreaseDepth { id: None }
        );
        assert_eq!(
            Command::from_name("image.set_source"),
            Command::Custom {
                name: "image.set_source".into(),
                args: None
            }
        );
    }

    #[test]
    fn test_spec_debug_hides_handler() {
        let spec = CommandSpec::new("noop", |_, _| Ok(None)).description("Does nothing");
        let debug = format!("{:?}", spec);
        assert!(debug.contains("noop"));
        assert!(debug.contains("Does nothing"));
    }
}
