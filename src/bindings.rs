//! Selector bindings and the settings snapshot read by the state machine

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::key_event::Modifiers;
use crate::keycode;

/// A selector character bound to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotkeyBinding {
    pub key: char,
    pub app_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
}

impl HotkeyBinding {
    pub fn new(key: char, app_name: impl Into<String>, bundle_id: Option<String>) -> Self {
        HotkeyBinding {
            key: key.to_ascii_lowercase(),
            app_name: app_name.into(),
            bundle_id,
        }
    }

    pub fn display_string(&self) -> String {
        match &self.bundle_id {
            Some(id) => format!("{}  {} ({})", keycode::display_name(self.key), self.app_name, id),
            None => format!("{}  {}", keycode::display_name(self.key), self.app_name),
        }
    }
}

/// Bindings keyed by selector character, at most one per character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingRegistry {
    bindings: BTreeMap<char, HotkeyBinding>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding, returning the one it replaced for the same character.
    pub fn insert(&mut self, mut binding: HotkeyBinding) -> Option<HotkeyBinding> {
        binding.key = binding.key.to_ascii_lowercase();
        self.bindings.insert(binding.key, binding)
    }

    pub fn get(&self, key: char) -> Option<&HotkeyBinding> {
        self.bindings.get(&key.to_ascii_lowercase())
    }

    /// Binding typed by `key_code`, if the code maps to a bound character.
    pub fn lookup(&self, key_code: u16) -> Option<&HotkeyBinding> {
        keycode::character_for(key_code).and_then(|c| self.get(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = &HotkeyBinding> {
        self.bindings.values()
    }

    pub fn to_vec(&self) -> Vec<HotkeyBinding> {
        self.bindings.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl FromIterator<HotkeyBinding> for BindingRegistry {
    fn from_iter<I: IntoIterator<Item = HotkeyBinding>>(iter: I) -> Self {
        let mut registry = BindingRegistry::new();
        for binding in iter {
            registry.insert(binding);
        }
        registry
    }
}

/// Modifier set that turns a selector character into a direct activation.
/// Empty disables the direct path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluckKeyConfig {
    pub modifiers: Modifiers,
}

impl PluckKeyConfig {
    pub fn is_enabled(&self) -> bool {
        !self.modifiers.is_empty()
    }

    pub fn is_held(&self, modifiers: Modifiers) -> bool {
        self.is_enabled() && modifiers.contains(self.modifiers)
    }
}

/// Everything the state machine reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub pluck_key: PluckKeyConfig,
    pub bindings: BindingRegistry,
    pub double_shift_enabled: bool,
    pub command_tab_blocked: bool,
    pub pluck_overlay_enabled: bool,
}

/// Shared pointer to the current settings snapshot.
///
/// Updates swap in a whole new `Settings`; readers keep whatever snapshot
/// they grabbed until they ask again.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        SettingsHandle {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, settings: Settings) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }
}
