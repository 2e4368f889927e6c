//! Configuration management for Pluck
//!
//! Handles TOML config file parsing, conversion into the settings snapshot
//! the state machine reads, live reload, and LaunchAgent management for
//! autostart.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bindings::{BindingRegistry, HotkeyBinding, PluckKeyConfig, Settings, SettingsHandle};
use crate::error::{PluckError, Result};
use crate::key_event::Modifiers;
use crate::keycode;

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_pluck_key")]
    pub pluck_key: String,

    #[serde(default = "default_true")]
    pub double_shift: bool,

    #[serde(default)]
    pub block_command_tab: bool,

    /// Show the selector while the pluck key is held
    #[serde(default)]
    pub pluck_overlay: bool,

    #[serde(default)]
    pub autostart: bool,

    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEntry {
    pub key: String,
    pub app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
}

fn default_pluck_key() -> String {
    "ctrl+option".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pluck_key: default_pluck_key(),
            double_shift: true,
            block_command_tab: false,
            pluck_overlay: false,
            autostart: false,
            bindings: Vec::new(),
        }
    }
}

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("pluck");
    path.push("config.toml");
    path
}

impl Config {
    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Config> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PluckError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PluckError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| PluckError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Build the settings snapshot. Invalid bindings are skipped with a warning.
    pub fn settings(&self) -> Result<Settings> {
        let modifiers = parse_pluck_key(&self.pluck_key)?;

        let mut bindings = BindingRegistry::new();
        for entry in &self.bindings {
            let Some(key) = parse_selector_key(&entry.key) else {
                tracing::warn!("Skipping binding for {}: invalid key {:?}", entry.app, entry.key);
                continue;
            };
            if entry.app.trim().is_empty() && entry.bundle_id.is_none() {
                tracing::warn!("Skipping binding for key {:?}: no application", entry.key);
                continue;
            }

            let binding = HotkeyBinding::new(key, entry.app.trim(), entry.bundle_id.clone());
            if let Some(previous) = bindings.insert(binding) {
                tracing::warn!(
                    "Key {:?} bound more than once, replacing {}",
                    entry.key,
                    previous.app_name
                );
            }
        }

        Ok(Settings {
            pluck_key: PluckKeyConfig { modifiers },
            bindings,
            double_shift_enabled: self.double_shift,
            command_tab_blocked: self.block_command_tab,
            pluck_overlay_enabled: self.pluck_overlay,
        })
    }

    /// Insert or replace the binding for `key`, keeping entries sorted.
    pub fn set_binding(&mut self, key: char, app: &str, bundle_id: Option<String>) {
        let key = key.to_ascii_lowercase();
        self.bindings
            .retain(|entry| parse_selector_key(&entry.key) != Some(key));
        self.bindings.push(BindingEntry {
            key: selector_key_string(key),
            app: app.to_string(),
            bundle_id,
        });
        self.bindings
            .sort_by_key(|entry| parse_selector_key(&entry.key));
    }

    /// Remove the binding for `key`, returning whether one existed.
    pub fn remove_binding(&mut self, key: char) -> bool {
        let key = key.to_ascii_lowercase();
        let before = self.bindings.len();
        self.bindings
            .retain(|entry| parse_selector_key(&entry.key) != Some(key));
        self.bindings.len() != before
    }
}

/// Parse a modifier combination such as `ctrl+option`. Empty means disabled.
pub fn parse_pluck_key(key: &str) -> Result<Modifiers> {
    let key_lower = key.trim().to_lowercase();
    if key_lower.is_empty() || key_lower == "none" {
        return Ok(Modifiers::empty());
    }

    key_lower
        .split('+')
        .map(|part| parse_modifier(part.trim()))
        .try_fold(Modifiers::empty(), |acc, modifier| Ok(acc | modifier?))
}

fn parse_modifier(s: &str) -> Result<Modifiers> {
    match s {
        "cmd" | "command" | "super" => Ok(Modifiers::COMMAND),
        "alt" | "option" | "opt" => Ok(Modifiers::OPTION),
        "shift" => Ok(Modifiers::SHIFT),
        "ctrl" | "control" => Ok(Modifiers::CONTROL),
        _ => Err(PluckError::Config(format!("Unknown modifier: {}", s))),
    }
}

/// Parse a selector key: one character from the key table, or `space`.
pub fn parse_selector_key(s: &str) -> Option<char> {
    if s.eq_ignore_ascii_case("space") {
        return Some(' ');
    }

    let mut chars = s.chars();
    let c = chars.next()?.to_ascii_lowercase();
    if chars.next().is_some() {
        return None;
    }
    keycode::key_code_for(c).map(|_| c)
}

fn selector_key_string(key: char) -> String {
    match key {
        ' ' => "space".to_string(),
        _ => key.to_string(),
    }
}

/// Reports writes to the config file, as seen by the OS file watcher.
///
/// The parent directory is watched rather than the file itself so editors
/// that save by rename are still picked up.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<()>,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf) -> Result<Self> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| PluckError::Config(format!("No parent directory for {}", path.display())))?;
        fs::create_dir_all(&dir)?;

        let (tx, events) = mpsc::unbounded_channel();
        let file_name = path.file_name().map(|name| name.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|name| name.to_os_string()) == file_name);
                    if touches_config {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::warn!("Config watcher error: {}", e),
            }
        })
        .map_err(|e| PluckError::Config(format!("Failed to create config watcher: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| PluckError::Config(format!("Failed to watch {}: {}", dir.display(), e)))?;

        tracing::debug!("Watching {} for changes", path.display());
        Ok(ConfigWatcher {
            path,
            _watcher: watcher,
            events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next change, collapsing a burst of events into one.
    ///
    /// Returns false once the underlying watcher has gone away.
    pub async fn changed(&mut self) -> bool {
        if self.events.recv().await.is_none() {
            return false;
        }
        while let Ok(Some(())) = tokio::time::timeout(RELOAD_DEBOUNCE, self.events.recv()).await {}
        true
    }
}

/// Swap in new settings whenever the watched config file changes.
///
/// A file that fails to load or validate leaves the previous settings active.
pub async fn watch(mut watcher: ConfigWatcher, settings: SettingsHandle) {
    while watcher.changed().await {
        let reloaded = Config::load_from(watcher.path()).and_then(|config| config.settings());
        match reloaded {
            Ok(next) => {
                tracing::info!("Config reloaded ({} bindings)", next.bindings.len());
                settings.replace(next);
            }
            Err(e) => tracing::error!("Keeping previous settings: {}", e),
        }
    }
    tracing::debug!("Config watcher stopped");
}

fn launch_agent_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    path.push("Library");
    path.push("LaunchAgents");
    path.push("com.pluck.plist");
    path
}

fn launch_agent_plist(program: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>com.pluck</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>--headless</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
</dict>
</plist>
"#,
        program.display()
    )
}

pub fn is_autostart_enabled() -> bool {
    let path = launch_agent_path();

    if !path.exists() {
        return false;
    }

    let output = Command::new("launchctl")
        .args(["list", "com.pluck"])
        .output();

    match output {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

pub fn set_autostart(enabled: bool) -> Result<()> {
    let path = launch_agent_path();

    if enabled {
        let parent = path.parent().ok_or_else(|| {
            PluckError::Config("Could not determine LaunchAgents directory".to_string())
        })?;

        fs::create_dir_all(parent).map_err(|e| {
            PluckError::Config(format!("Failed to create LaunchAgents directory: {}", e))
        })?;

        let program = std::env::current_exe()?;
        fs::write(&path, launch_agent_plist(&program))
            .map_err(|e| PluckError::Config(format!("Failed to write LaunchAgent plist: {}", e)))?;

        let output = Command::new("launchctl")
            .args(["load", "-w"])
            .arg(&path)
            .output()
            .map_err(|e| PluckError::Config(format!("Failed to run launchctl load: {}", e)))?;

        if !output.status.success() {
            return Err(PluckError::Config(format!(
                "launchctl load failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
    } else if path.exists() {
        match Command::new("launchctl")
            .args(["unload", "-w"])
            .arg(&path)
            .output()
        {
            Ok(output) if !output.status.success() => tracing::warn!(
                "launchctl unload failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to run launchctl unload: {}", e),
        }

        fs::remove_file(&path).map_err(|e| {
            PluckError::Config(format!("Failed to remove LaunchAgent plist: {}", e))
        })?;
    }

    Ok(())
}
