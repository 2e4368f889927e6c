//! Routes effects from the state machine to the overlay and the resolver
//!
//! Activation work runs on the blocking pool so a slow launch never delays
//! the next overlay command.

use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

use crate::activation::Effect;
use crate::overlay::OverlayCommand;
use crate::resolver::{AppResolver, Outcome, Workspace};

pub async fn run<W: Workspace + 'static>(
    mut effects: UnboundedReceiver<Effect>,
    overlay: UnboundedSender<OverlayCommand>,
    resolver: Arc<AppResolver<W>>,
) {
    let mut activations: JoinSet<Outcome> = JoinSet::new();

    loop {
        tokio::select! {
            effect = effects.recv() => {
                let Some(effect) = effect else { break };
                match effect {
                    Effect::ShowOverlay { session, mode, bindings } => {
                        forward(&overlay, OverlayCommand::Show { session, mode, bindings });
                    }
                    Effect::HideOverlay => forward(&overlay, OverlayCommand::Hide),
                    Effect::ResetOverlayTimeout => forward(&overlay, OverlayCommand::ResetTimeout),
                    Effect::Activate(binding) => {
                        let resolver = Arc::clone(&resolver);
                        activations.spawn_blocking(move || resolver.activate(&binding));
                    }
                }
            }
            Some(finished) = activations.join_next(), if !activations.is_empty() => {
                log_finished(finished);
            }
        }
    }

    while let Some(finished) = activations.join_next().await {
        log_finished(finished);
    }
}

fn forward(overlay: &UnboundedSender<OverlayCommand>, command: OverlayCommand) {
    if overlay.send(command).is_err() {
        tracing::warn!("overlay coordinator is gone, dropping command");
    }
}

fn log_finished(finished: Result<Outcome, tokio::task::JoinError>) {
    match finished {
        Ok(outcome) => tracing::debug!(?outcome, "activation finished"),
        Err(e) => tracing::error!("activation task failed: {}", e),
    }
}
