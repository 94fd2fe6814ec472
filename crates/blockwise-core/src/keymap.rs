//! Keyboard mapping.
//!
//! ## Learning: Chains of Handlers
//!
//! A key press first visits every plugin's `on_key_down` handler in
//! registration order; the first one to return [`KeyOutcome::Claimed`]
//! stops the chain. Only unclaimed keys reach the keymap below, which maps
//! combos like `mod+z` to built-in commands.

use crate::command::Command;
use crate::config::Config;

/// Keyboard modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool, // Cmd on macOS, Win on Windows
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        alt: false,
        shift: false,
        meta: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        alt: false,
        shift: false,
        meta: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        ctrl: false,
        alt: false,
        shift: true,
        meta: false,
    };

    pub const ALT: Modifiers = Modifiers {
        ctrl: false,
        alt: true,
        shift: false,
        meta: false,
    };

    pub const META: Modifiers = Modifiers {
        ctrl: false,
        alt: false,
        shift: false,
        meta: true,
    };

    pub const CTRL_SHIFT: Modifiers = Modifiers {
        ctrl: true,
        alt: false,
        shift: true,
        meta: false,
    };

    pub fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift && !self.meta
    }
}

/// A key code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Delete,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Space,
}

impl Key {
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "enter" | "return" => Some(Key::Enter),
            "tab" => Some(Key::Tab),
            "backspace" => Some(Key::Backspace),
            "delete" | "del" => Some(Key::Delete),
            "escape" | "esc" => Some(Key::Escape),
            "up" => Some(Key::Up),
            "down" => Some(Key::Down),
            "left" => Some(Key::Left),
            "right" => Some(Key::Right),
            "home" => Some(Key::Home),
            "end" => Some(Key::End),
            "space" => Some(Key::Space),
            _ => {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Key::Char(c)),
                    _ => None,
                }
            }
        }
    }

    fn matches(&self, other: &Key) -> bool {
        match (self, other) {
            (Key::Char(a), Key::Char(b)) => a.to_lowercase().eq(b.to_lowercase()),
            (Key::Char(' '), Key::Space) | (Key::Space, Key::Char(' ')) => true,
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c.to_uppercase()),
            Key::Enter => write!(f, "Enter"),
            Key::Tab => write!(f, "Tab"),
            Key::Backspace => write!(f, "Backspace"),
            Key::Delete => write!(f, "Delete"),
            Key::Escape => write!(f, "Escape"),
            Key::Up => write!(f, "Up"),
            Key::Down => write!(f, "Down"),
            Key::Left => write!(f, "Left"),
            Key::Right => write!(f, "Right"),
            Key::Home => write!(f, "Home"),
            Key::End => write!(f, "End"),
            Key::Space => write!(f, "Space"),
        }
    }
}

/// A key press delivered to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    /// A key press without modifiers.
    pub fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::NONE)
    }
}

/// Whether a key handler consumed the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Handled; stop the chain
    Claimed,
    /// Not handled; let the next handler try
    Pass,
}

/// A binding pattern such as `mod+shift+z`.
///
/// `mod` is the platform command key and matches either Ctrl or Meta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub key: Key,
    pub primary: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyCombo {
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let (key, mods) = parts.split_last()?;
        let mut combo = Self {
            key: Key::parse(key)?,
            primary: false,
            shift: false,
            alt: false,
        };
        for part in mods {
            match part.to_lowercase().as_str() {
                "mod" | "ctrl" | "control" | "cmd" | "meta" => combo.primary = true,
                "shift" => combo.shift = true,
                "alt" | "option" => combo.alt = true,
                _ => return None,
            }
        }
        Some(combo)
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        let primary = event.modifiers.ctrl || event.modifiers.meta;
        self.key.matches(&event.key)
            && self.primary == primary
            && self.shift == event.modifiers.shift
            && self.alt == event.modifiers.alt
    }
}

impl std::fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.primary {
            write!(f, "Mod+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// A key binding maps a combo to a command.
#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub combo: KeyCombo,
    pub command: Command,
}

impl KeyBinding {
    pub fn new(combo: KeyCombo, command: Command) -> Self {
        Self { combo, command }
    }
}

/// Keyboard mapping configuration.
#[derive(Debug, Clone)]
pub struct Keymap {
    /// Earlier bindings win
    bindings: Vec<KeyBinding>,
}

impl Keymap {
    /// Creates a keymap with the default bindings.
    pub fn new() -> Self {
        let mut keymap = Self {
            bindings: Vec::new(),
        };
        keymap.add_default_bindings();
        keymap
    }

    /// Creates a keymap whose configured bindings take precedence over the
    /// defaults.
    pub fn from_config(config: &Config) -> Self {
        let mut bindings = Vec::new();
        for (combo_str, name) in &config.keyboard.bindings {
            match KeyCombo::parse(combo_str) {
                Some(combo) => bindings.push(KeyBinding::new(combo, Command::from_name(name))),
                None => tracing::warn!(combo = %combo_str, "Ignoring unparsable key binding"),
            }
        }

        let mut keymap = Self { bindings };
        keymap.add_default_bindings();
        keymap
    }

    fn add_default_bindings(&mut self) {
        use crate::command::Command::*;

        let defaults = [
            ("enter", SplitBlock),
            ("backspace", DeleteBackward),
            ("tab", IncreaseDepth { id: None }),
            ("shift+tab", DecreaseDepth { id: None }),
            ("mod+z", Undo),
            ("mod+shift+z", Redo),
            ("mod+y", Redo),
            ("mod+d", DuplicateBlock { id: None }),
            ("mod+a", SelectAllBlocks),
        ];

        for (combo, command) in defaults {
            if let Some(combo) = KeyCombo::parse(combo) {
                self.bindings.push(KeyBinding::new(combo, command));
            }
        }
    }

    /// Finds the command bound to a key press.
    pub fn lookup(&self, event: &KeyEvent) -> Option<&Command> {
        self.bindings
            .iter()
            .find(|binding| binding.combo.matches(event))
            .map(|binding| &binding.command)
    }

    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    /// Adds a binding ahead of the existing ones.
    pub fn add_binding(&mut self, binding: KeyBinding) {
        self.bindings.insert(0, binding);
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::new()
    }
}
