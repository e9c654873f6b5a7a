// Keyboard shortcuts
// Maps key chords to editor actions. The primary modifier is Command on
// macOS and Control elsewhere unless the configuration pins one.

use serde::{Deserialize, Serialize};

use super::structured_document::StyleFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyChord {
    pub fn new(key: Key) -> Self {
        KeyChord {
            key,
            modifiers: Modifiers::default(),
        }
    }

    pub fn shift(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    pub fn ctrl(mut self) -> Self {
        self.modifiers.ctrl = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.modifiers.alt = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.modifiers.meta = true;
        self
    }
}

/// Which modifier key triggers editor shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortcutModifier {
    /// Command on macOS, Control elsewhere
    #[default]
    Auto,
    Control,
    Command,
}

impl ShortcutModifier {
    /// Resolve `Auto` for the platform we were built for
    pub fn resolve(self) -> ShortcutModifier {
        match self {
            ShortcutModifier::Auto if cfg!(target_os = "macos") => ShortcutModifier::Command,
            ShortcutModifier::Auto => ShortcutModifier::Control,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    Up,
    Down,
    WordLeft,
    WordRight,
    LineStart,
    LineEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    ToggleStyle(StyleFlag),
    InsertLink,
    Undo,
    Redo,
    SelectAll,
    SplitBlock,
    DeleteBackward,
    DeleteForward,
    Indent,
    Outdent,
    Move { motion: Motion, extend: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct Keymap {
    modifier: ShortcutModifier,
}

impl Keymap {
    pub fn new(modifier: ShortcutModifier) -> Self {
        Keymap {
            modifier: modifier.resolve(),
        }
    }

    pub fn modifier(&self) -> ShortcutModifier {
        self.modifier
    }

    fn primary_held(&self, modifiers: &Modifiers) -> bool {
        match self.modifier {
            ShortcutModifier::Command => modifiers.meta,
            _ => modifiers.ctrl,
        }
    }

    fn word_modifier_held(&self, modifiers: &Modifiers) -> bool {
        match self.modifier {
            ShortcutModifier::Command => modifiers.alt,
            _ => modifiers.ctrl,
        }
    }

    /// Look up the action bound to a chord
    pub fn resolve(&self, chord: &KeyChord) -> Option<Shortcut> {
        let modifiers = &chord.modifiers;
        let primary = self.primary_held(modifiers);
        let word = self.word_modifier_held(modifiers);
        let extend = modifiers.shift;
        let movement = |motion| Some(Shortcut::Move { motion, extend });

        match chord.key {
            Key::Char(c) if primary => match c.to_ascii_lowercase() {
                'b' => Some(Shortcut::ToggleStyle(StyleFlag::Bold)),
                'i' => Some(Shortcut::ToggleStyle(StyleFlag::Italic)),
                'u' => Some(Shortcut::ToggleStyle(StyleFlag::Underline)),
                'k' => Some(Shortcut::InsertLink),
                'z' if modifiers.shift => Some(Shortcut::Redo),
                'z' => Some(Shortcut::Undo),
                'y' => Some(Shortcut::Redo),
                'a' => Some(Shortcut::SelectAll),
                _ => None,
            },
            Key::Char(_) => None,
            Key::Enter if !primary => Some(Shortcut::SplitBlock),
            Key::Backspace => Some(Shortcut::DeleteBackward),
            Key::Delete => Some(Shortcut::DeleteForward),
            Key::Tab if modifiers.shift => Some(Shortcut::Outdent),
            Key::Tab => Some(Shortcut::Indent),
            Key::Left if word => movement(Motion::WordLeft),
            Key::Left => movement(Motion::Left),
            Key::Right if word => movement(Motion::WordRight),
            Key::Right => movement(Motion::Right),
            Key::Up => movement(Motion::Up),
            Key::Down => movement(Motion::Down),
            Key::Home => movement(Motion::LineStart),
            Key::End => movement(Motion::LineEnd),
            Key::Enter | Key::Escape => None,
        }
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::new(ShortcutModifier::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> Keymap {
        Keymap::new(ShortcutModifier::Control)
    }

    #[test]
    fn test_style_shortcuts() {
        let keymap = control();
        assert_eq!(
            keymap.resolve(&KeyChord::new(Key::Char('b')).ctrl()),
            Some(Shortcut::ToggleStyle(StyleFlag::Bold))
        );
        assert_eq!(
            keymap.resolve(&KeyChord::new(Key::Char('K')).ctrl()),
            Some(Shortcut::InsertLink)
        );
        assert_eq!(keymap.resolve(&KeyChord::new(Key::Char('b'))), None);
    }

    #[test]
    fn test_undo_and_redo_chords() {
        let keymap = control();
        assert_eq!(keymap.resolve(&KeyChord::new(Key::Char('z')).ctrl()), Some(Shortcut::Undo));
        assert_eq!(
            keymap.resolve(&KeyChord::new(Key::Char('z')).ctrl().shift()),
            Some(Shortcut::Redo)
        );
        assert_eq!(keymap.resolve(&KeyChord::new(Key::Char('y')).ctrl()), Some(Shortcut::Redo));
    }

    #[test]
    fn test_command_modifier_ignores_control() {
        let keymap = Keymap::new(ShortcutModifier::Command);
        assert_eq!(keymap.resolve(&KeyChord::new(Key::Char('b')).ctrl()), None);
        assert_eq!(
            keymap.resolve(&KeyChord::new(Key::Char('b')).meta()),
            Some(Shortcut::ToggleStyle(StyleFlag::Bold))
        );
        assert_eq!(
            keymap.resolve(&KeyChord::new(Key::Left).alt()),
            Some(Shortcut::Move {
                motion: Motion::WordLeft,
                extend: false
            })
        );
    }

    #[test]
    fn test_movement_extends_with_shift() {
        let keymap = control();
        assert_eq!(
            keymap.resolve(&KeyChord::new(Key::Right).ctrl().shift()),
            Some(Shortcut::Move {
                motion: Motion::WordRight,
                extend: true
            })
        );
        assert_eq!(
            keymap.resolve(&KeyChord::new(Key::Tab).shift()),
            Some(Shortcut::Outdent)
        );
    }

    #[test]
    fn test_auto_resolves_to_platform_modifier() {
        let expected = if cfg!(target_os = "macos") {
            ShortcutModifier::Command
        } else {
            ShortcutModifier::Control
        };
        assert_eq!(Keymap::default().modifier(), expected);
    }
}
