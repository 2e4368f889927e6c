//! Keyboard events as seen by the activation state machine

use std::time::Instant;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const CONTROL = 1 << 0;
        const OPTION = 1 << 1;
        const SHIFT = 1 << 2;
        const COMMAND = 1 << 3;
    }
}

impl Modifiers {
    /// Short symbolic form, e.g. `⌃⌥`.
    pub fn symbols(self) -> String {
        let mut out = String::new();
        if self.contains(Modifiers::CONTROL) {
            out.push('⌃');
        }
        if self.contains(Modifiers::OPTION) {
            out.push('⌥');
        }
        if self.contains(Modifiers::SHIFT) {
            out.push('⇧');
        }
        if self.contains(Modifiers::COMMAND) {
            out.push('⌘');
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    KeyDown,
    /// A modifier key went down or up; `modifiers` holds the state after the change.
    ModifierChange,
}

/// One physical keyboard event delivered by the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub timestamp: Instant,
    pub key_code: u16,
    pub kind: KeyEventKind,
    pub modifiers: Modifiers,
    /// Generated by the OS while the key is held.
    pub is_repeat: bool,
}

impl KeyEvent {
    pub fn key_down(timestamp: Instant, key_code: u16, modifiers: Modifiers) -> Self {
        KeyEvent {
            timestamp,
            key_code,
            kind: KeyEventKind::KeyDown,
            modifiers,
            is_repeat: false,
        }
    }

    pub fn modifier_change(timestamp: Instant, key_code: u16, modifiers: Modifiers) -> Self {
        KeyEvent {
            timestamp,
            key_code,
            kind: KeyEventKind::ModifierChange,
            modifiers,
            is_repeat: false,
        }
    }

    pub fn repeated(mut self, is_repeat: bool) -> Self {
        self.is_repeat = is_repeat;
        self
    }

    pub fn is_key_down(&self) -> bool {
        self.kind == KeyEventKind::KeyDown
    }
}
