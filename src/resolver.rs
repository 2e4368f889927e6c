//! Resolve a binding to a running application or a launch target
//!
//! Resolution order:
//! 1. running instance with the binding's bundle identifier
//! 2. running instance whose name matches exactly, then by substring
//!    (case-insensitive, first in enumeration order)
//! 3. install location of the bundle identifier
//! 4. `<name>.app` in the well-known application directories
//! 5. launch by name, unverified

use std::path::{Path, PathBuf};

use crate::bindings::HotkeyBinding;
use crate::error::Result;

/// A running application as enumerated by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningApp {
    pub pid: i32,
    pub name: String,
    pub bundle_id: Option<String>,
}

/// OS primitives the resolver drives.
pub trait Workspace: Send + Sync {
    /// Running applications in OS enumeration order.
    fn running_apps(&self) -> Vec<RunningApp>;
    fn activate(&self, app: &RunningApp) -> Result<()>;
    fn location_for_bundle_id(&self, bundle_id: &str) -> Option<PathBuf>;
    /// Launch the application bundle at `path` and bring it to front.
    fn launch(&self, path: &Path) -> Result<()>;
    fn launch_by_name(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Activated,
    Launched,
    Failed,
}

pub fn default_search_dirs() -> Vec<PathBuf> {
    let mut search_dirs = vec![
        PathBuf::from("/Applications"),
        PathBuf::from("/Applications/Utilities"),
        PathBuf::from("/System/Applications"),
        PathBuf::from("/System/Applications/Utilities"),
    ];
    if let Some(home) = dirs::home_dir() {
        search_dirs.push(home.join("Applications"));
    }
    search_dirs
}

pub struct AppResolver<W> {
    workspace: W,
    search_dirs: Vec<PathBuf>,
}

impl<W: Workspace> AppResolver<W> {
    pub fn new(workspace: W) -> Self {
        AppResolver {
            workspace,
            search_dirs: default_search_dirs(),
        }
    }

    #[cfg(test)]
    pub fn with_search_dirs(mut self, search_dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = search_dirs;
        self
    }

    #[cfg(test)]
    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    /// Bring the binding's application to front, launching it if needed.
    ///
    /// Once a target is found, a failing OS call ends the attempt.
    pub fn activate(&self, binding: &HotkeyBinding) -> Outcome {
        let running = self.workspace.running_apps();
        if let Some(app) = find_running(&running, binding) {
            return match self.workspace.activate(app) {
                Ok(()) => {
                    tracing::info!("Activated {} (pid {})", app.name, app.pid);
                    Outcome::Activated
                }
                Err(e) => {
                    tracing::warn!("Failed to activate {}: {}", app.name, e);
                    Outcome::Failed
                }
            };
        }

        if let Some(bundle_id) = &binding.bundle_id {
            if let Some(path) = self.workspace.location_for_bundle_id(bundle_id) {
                return self.launch(&path);
            }
            tracing::debug!("No install location for bundle id {}", bundle_id);
        }

        if let Some(path) = self.find_installed(&binding.app_name) {
            return self.launch(&path);
        }

        match self.workspace.launch_by_name(&binding.app_name) {
            Ok(()) => {
                tracing::info!("Launched {} by name", binding.app_name);
                Outcome::Launched
            }
            Err(e) => {
                tracing::warn!("Could not find or launch {}: {}", binding.app_name, e);
                Outcome::Failed
            }
        }
    }

    fn launch(&self, path: &Path) -> Outcome {
        match self.workspace.launch(path) {
            Ok(()) => {
                tracing::info!("Launched {}", path.display());
                Outcome::Launched
            }
            Err(e) => {
                tracing::warn!("Failed to launch {}: {}", path.display(), e);
                Outcome::Failed
            }
        }
    }

    fn find_installed(&self, app_name: &str) -> Option<PathBuf> {
        if app_name.is_empty() {
            return None;
        }
        let bundle = format!("{}.app", app_name);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&bundle))
            .find(|candidate| candidate.exists())
    }
}

/// Pick the running instance a binding refers to.
pub fn find_running<'a>(
    running: &'a [RunningApp],
    binding: &HotkeyBinding,
) -> Option<&'a RunningApp> {
    if let Some(bundle_id) = binding.bundle_id.as_deref() {
        if let Some(app) = running
            .iter()
            .find(|app| app.bundle_id.as_deref() == Some(bundle_id))
        {
            return Some(app);
        }
    }

    let wanted = binding.app_name.to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    running
        .iter()
        .find(|app| app.name.to_lowercase() == wanted)
        .or_else(|| {
            running
                .iter()
                .find(|app| app.name.to_lowercase().contains(&wanted))
        })
}
