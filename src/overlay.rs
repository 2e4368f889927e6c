//! Selector overlay lifecycle
//!
//! The coordinator owns the single overlay instance and its one-shot
//! timeout. It runs as a task on the runtime, away from the capture thread,
//! and reports expiry back to the state machine over a crossbeam channel.

use std::time::Duration;

use crossbeam::channel::Sender;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep_until};

use crate::activation::SelectorSource;
use crate::bindings::HotkeyBinding;
use crate::keycode;

pub const OVERLAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sent when an overlay session expires on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayTimeout {
    pub session: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayCommand {
    Show {
        session: u64,
        mode: SelectorSource,
        bindings: Vec<HotkeyBinding>,
    },
    Hide,
    ResetTimeout,
}

/// Draws and removes the selector affordance.
pub trait OverlayPresenter: Send {
    fn show(&mut self, bindings: &[HotkeyBinding], mode: SelectorSource);
    fn hide(&mut self);
}

/// Presenter that writes the selector listing to the log.
#[derive(Debug, Default)]
pub struct LogPresenter;

impl OverlayPresenter for LogPresenter {
    fn show(&mut self, bindings: &[HotkeyBinding], mode: SelectorSource) {
        for line in selector_lines(bindings, mode) {
            tracing::info!("{}", line);
        }
    }

    fn hide(&mut self) {
        tracing::debug!("selector overlay hidden");
    }
}

/// Text rows of the selector listing: a header, then one row per binding.
pub fn selector_lines(bindings: &[HotkeyBinding], mode: SelectorSource) -> Vec<String> {
    let header = match mode {
        SelectorSource::DoubleShift => "⇧⇧ then press a key:",
        SelectorSource::PluckKey => "Pluck key + key:",
    };

    let mut lines = Vec::with_capacity(bindings.len() + 1);
    lines.push(header.to_string());
    if bindings.is_empty() {
        lines.push("  (no bindings)".to_string());
    }
    for binding in bindings {
        lines.push(format!(
            "  {:<6} {}",
            keycode::display_name(binding.key),
            binding.app_name
        ));
    }
    lines
}

pub struct OverlayCoordinator<P> {
    presenter: P,
    timeouts: Sender<OverlayTimeout>,
    /// Session of the visible overlay.
    visible: Option<u64>,
    deadline: Option<Instant>,
}

impl<P: OverlayPresenter> OverlayCoordinator<P> {
    pub fn new(presenter: P, timeouts: Sender<OverlayTimeout>) -> Self {
        OverlayCoordinator {
            presenter,
            timeouts,
            visible: None,
            deadline: None,
        }
    }

    /// Show the overlay, replacing any visible one, and start its countdown.
    pub fn show(&mut self, session: u64, bindings: &[HotkeyBinding], mode: SelectorSource) {
        if self.visible.is_some() {
            self.presenter.hide();
        }
        self.presenter.show(bindings, mode);
        self.visible = Some(session);
        self.deadline = Some(Instant::now() + OVERLAY_TIMEOUT);
    }

    pub fn hide(&mut self) {
        self.deadline = None;
        if self.visible.take().is_some() {
            self.presenter.hide();
        }
    }

    /// Restart the countdown of a visible overlay.
    pub fn reset_timeout(&mut self) {
        if self.visible.is_some() {
            self.deadline = Some(Instant::now() + OVERLAY_TIMEOUT);
        }
    }

    pub fn apply(&mut self, command: OverlayCommand) {
        match command {
            OverlayCommand::Show {
                session,
                mode,
                bindings,
            } => self.show(session, &bindings, mode),
            OverlayCommand::Hide => self.hide(),
            OverlayCommand::ResetTimeout => self.reset_timeout(),
        }
    }

    fn expire(&mut self) {
        self.deadline = None;
        if let Some(session) = self.visible.take() {
            self.presenter.hide();
            tracing::debug!(session, "overlay timed out");
            if self.timeouts.send(OverlayTimeout { session }).is_err() {
                tracing::warn!("state machine no longer listening for overlay timeouts");
            }
        }
    }

    /// Process commands until the sender side is dropped.
    pub async fn run(mut self, mut commands: UnboundedReceiver<OverlayCommand>) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = wait_until(deadline) => self.expire(),
            }
        }
        self.hide();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
