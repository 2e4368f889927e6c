//! Pluck - macOS app switcher driven by a pluck key or a double shift tap
#![cfg_attr(not(target_os = "macos"), allow(dead_code))]

#[cfg(target_os = "macos")]
mod accessibility;
mod activation;
mod bindings;
mod config;
mod dispatch;
mod error;
#[cfg(target_os = "macos")]
mod event_tap;
mod key_event;
mod keycode;
mod overlay;
mod resolver;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use bindings::Settings;
use config::Config;

/// Pluck - activate or launch apps with a pluck key or a double shift tap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run without menu bar UI (daemon mode)
    #[arg(long)]
    headless: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand for one-shot operations
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List bindings
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Bind a key to an application
    Bind {
        key: String,
        app: String,
        #[arg(long)]
        bundle_id: Option<String>,
    },
    /// Remove the binding for a key
    Unbind { key: String },
    /// Activate the application bound to a key
    Activate { key: String },
    /// Start Pluck at login
    Autostart {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::config_path);

    match args.command {
        Some(cmd) => handle_command(cmd, &config_path),
        None => run_daemon(&config_path, args.headless),
    }
}

fn handle_command(cmd: Commands, config_path: &Path) -> anyhow::Result<()> {
    match cmd {
        Commands::List { json } => {
            let settings = load_settings(config_path)?;
            let bindings = settings.bindings.to_vec();
            if json {
                println!("{}", serde_json::to_string_pretty(&bindings)?);
            } else if bindings.is_empty() {
                println!("No bindings. Use 'pluck bind <KEY> <APP>' to add one.");
            } else {
                if settings.pluck_key.is_enabled() {
                    println!("Pluck key: {}", settings.pluck_key.modifiers.symbols());
                }
                for binding in &bindings {
                    println!("  {}", binding.display_string());
                }
            }
        }
        Commands::Bind {
            key,
            app,
            bundle_id,
        } => {
            let selector = parse_key(&key)?;
            let mut config = Config::load_from(config_path)?;
            config.set_binding(selector, &app, bundle_id);
            config.save_to(config_path)?;
            println!("✓ Bound {} to {}", keycode::display_name(selector), app);
        }
        Commands::Unbind { key } => {
            let selector = parse_key(&key)?;
            let mut config = Config::load_from(config_path)?;
            if config.remove_binding(selector) {
                config.save_to(config_path)?;
                println!("✓ Removed binding for {}", keycode::display_name(selector));
            } else {
                println!("No binding for {}", keycode::display_name(selector));
            }
        }
        Commands::Activate { key } => {
            let selector = parse_key(&key)?;
            let settings = load_settings(config_path)?;
            let binding = settings
                .bindings
                .get(selector)
                .with_context(|| format!("No binding for {}", keycode::display_name(selector)))?;
            activate_now(binding)?;
        }
        Commands::Autostart { state } => {
            let enabled = matches!(state, Toggle::On);
            config::set_autostart(enabled).context("Failed to update autostart")?;
            let mut config = Config::load_from(config_path)?;
            config.autostart = enabled;
            config.save_to(config_path)?;
            println!(
                "✓ Autostart {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    Ok(())
}

fn parse_key(key: &str) -> anyhow::Result<char> {
    config::parse_selector_key(key).with_context(|| format!("Invalid key: {:?}", key))
}

fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    let config = Config::load_from(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    Ok(config.settings()?)
}

/// Settings for the daemon: a broken config falls back to the defaults.
fn daemon_settings(config_path: &Path) -> Settings {
    match load_settings(config_path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{:#}, using defaults", e);
            Config::default().settings().unwrap_or_default()
        }
    }
}

#[cfg(target_os = "macos")]
fn activate_now(binding: &bindings::HotkeyBinding) -> anyhow::Result<()> {
    use resolver::{AppResolver, Outcome};

    let resolver = AppResolver::new(accessibility::MacWorkspace);
    match resolver.activate(binding) {
        Outcome::Activated => println!("✓ Activated {}", binding.app_name),
        Outcome::Launched => println!("✓ Launched {}", binding.app_name),
        Outcome::Failed => anyhow::bail!("Failed to activate {}", binding.app_name),
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn activate_now(_binding: &bindings::HotkeyBinding) -> anyhow::Result<()> {
    Err(error::PluckError::Unsupported("Activating applications").into())
}

#[cfg(target_os = "macos")]
fn wait_for_accessibility() {
    // Check if we're running from Terminal - if so, Terminal needs permissions too
    let is_from_terminal = std::env::var("TERM_PROGRAM").is_ok();
    if is_from_terminal {
        println!("Note: Running from Terminal. If permissions don't work,");
        println!("      try running as: open /Applications/Pluck.app\n");
    }

    let mut attempts = 0;
    loop {
        match accessibility::test_api_access() {
            Ok(()) => {
                tracing::info!("Accessibility API working");
                break;
            }
            Err(e) => {
                if attempts == 0 {
                    println!("\n⚠️  Accessibility API not available: {}", e);
                    println!("\nSteps to fix:");
                    println!("1. System Preferences → Privacy & Security → Accessibility");
                    println!("2. Make sure Pluck.app is in the list AND CHECKED");
                    println!("3. If running from Terminal, also add Terminal.app");
                    println!("\nOpening System Preferences...\n");

                    accessibility::request_accessibility_permissions();

                    let _ = std::process::Command::new("open")
                        .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility")
                        .spawn();
                }

                attempts += 1;
                if attempts % 5 == 0 {
                    println!("Still waiting for permissions... (attempt {})", attempts);
                }

                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    }
}

/// Make the LaunchAgent match the `autostart` setting.
#[cfg(target_os = "macos")]
fn sync_autostart(config_path: &Path) {
    let Ok(config) = Config::load_from(config_path) else {
        return;
    };
    if config.autostart != config::is_autostart_enabled() {
        if let Err(e) = config::set_autostart(config.autostart) {
            tracing::warn!("Failed to update autostart: {}", e);
        }
    }
}

#[cfg(target_os = "macos")]
fn run_daemon(config_path: &Path, headless: bool) -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use activation::ActivationStateMachine;
    use bindings::SettingsHandle;
    use overlay::{LogPresenter, OverlayCoordinator};
    use resolver::AppResolver;

    static RUNNING: AtomicBool = AtomicBool::new(true);

    wait_for_accessibility();
    sync_autostart(config_path);

    let settings = SettingsHandle::new(daemon_settings(config_path));
    let snapshot = settings.snapshot();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("pluck-worker")
        .build()
        .context("Failed to start async runtime")?;

    let (effect_tx, effect_rx) = tokio::sync::mpsc::unbounded_channel();
    let (overlay_tx, overlay_rx) = tokio::sync::mpsc::unbounded_channel();
    let (timeout_tx, timeout_rx) = crossbeam::channel::unbounded();

    let coordinator = OverlayCoordinator::new(LogPresenter, timeout_tx);
    let resolver = Arc::new(AppResolver::new(accessibility::MacWorkspace));
    runtime.spawn(coordinator.run(overlay_rx));
    runtime.spawn(dispatch::run(effect_rx, overlay_tx, resolver));
    match config::ConfigWatcher::new(config_path.to_path_buf()) {
        Ok(watcher) => {
            runtime.spawn(config::watch(watcher, settings.clone()));
        }
        Err(e) => tracing::warn!("Config live reload disabled: {}", e),
    }

    let machine = ActivationStateMachine::new(settings, effect_tx, timeout_rx);
    let tap = event_tap::EventTap::start(machine)?;

    println!("🪶 Pluck started");
    if snapshot.pluck_key.is_enabled() {
        println!("  {} + key - Activate app", snapshot.pluck_key.modifiers.symbols());
    }
    if snapshot.double_shift_enabled {
        println!("  ⇧⇧ then key - Activate app");
    }
    for binding in snapshot.bindings.iter() {
        println!("  {}", binding.display_string());
    }

    ctrlc::set_handler(move || {
        println!("\nShutting down...");
        RUNNING.store(false, Ordering::SeqCst);
        if !headless {
            std::process::exit(0);
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    if headless {
        println!("Running in headless mode (Ctrl+C to quit)...");
        while RUNNING.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    } else {
        run_with_menu_bar(&snapshot)?;
    }

    tap.stop();
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn run_daemon(config_path: &Path, _headless: bool) -> anyhow::Result<()> {
    let settings = daemon_settings(config_path);
    tracing::debug!("{} bindings configured", settings.bindings.len());
    Err(error::PluckError::Unsupported("The Pluck daemon").into())
}

#[cfg(target_os = "macos")]
fn run_with_menu_bar(settings: &Settings) -> error::Result<()> {
    use cocoa::appkit::{NSApplication, NSStatusBar};
    use cocoa::base::{NO, id, nil};
    use cocoa::foundation::NSString;
    use objc::{class, msg_send, sel, sel_impl};

    unsafe {
        let app = NSApplication::sharedApplication(nil);
        app.setActivationPolicy_(
            cocoa::appkit::NSApplicationActivationPolicy::NSApplicationActivationPolicyAccessory,
        );

        let status_bar = NSStatusBar::systemStatusBar(nil);
        let status_item: id = msg_send![status_bar, statusItemWithLength: -1.0f64];
        if status_item == nil {
            return Err(error::PluckError::MenuBar(
                "Failed to create status item".to_string(),
            ));
        }

        let button: id = msg_send![status_item, button];
        let title = NSString::alloc(nil).init_str("🪶");
        let _: () = msg_send![button, setTitle: title];

        let menu: id = msg_send![class!(NSMenu), alloc];
        let _: () = msg_send![menu, init];
        let _: () = msg_send![menu, setAutoenablesItems: NO];

        let empty_key = NSString::alloc(nil).init_str("");
        for binding in settings.bindings.iter() {
            let label = NSString::alloc(nil).init_str(&binding.display_string());
            let item: id = msg_send![class!(NSMenuItem), alloc];
            let _: () = msg_send![item, initWithTitle: label action: sel!(description) keyEquivalent: empty_key];
            let _: () = msg_send![item, setEnabled: NO];
            let _: () = msg_send![menu, addItem: item];
        }
        if !settings.bindings.is_empty() {
            let separator: id = msg_send![class!(NSMenuItem), separatorItem];
            let _: () = msg_send![menu, addItem: separator];
        }

        let quit_title = NSString::alloc(nil).init_str("Quit Pluck");
        let quit_item: id = msg_send![class!(NSMenuItem), alloc];
        let quit_key = NSString::alloc(nil).init_str("q");
        let _: () = msg_send![quit_item, initWithTitle: quit_title action: sel!(terminate:) keyEquivalent: quit_key];
        let _: () = msg_send![menu, addItem: quit_item];

        let _: () = msg_send![status_item, setMenu: menu];
        std::mem::forget(status_item);
    }

    println!("Menu bar icon active. Quit from menu or Ctrl+C.");

    unsafe {
        let app = NSApplication::sharedApplication(nil);
        app.run();
    }

    Ok(())
}
