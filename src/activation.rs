//! Hotkey activation state machine
//!
//! Consumes keyboard events one at a time on the capture thread and decides
//! whether each one is swallowed. Overlay and activation requests leave as
//! [`Effect`]s on an unbounded channel, so handling an event never waits on
//! UI or process work.

use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use tokio::sync::mpsc::UnboundedSender;

use crate::bindings::{HotkeyBinding, Settings, SettingsHandle};
use crate::key_event::{KeyEvent, KeyEventKind, Modifiers};
use crate::keycode::{self, KEY_ESCAPE, KEY_TAB};
use crate::overlay::OverlayTimeout;

/// Maximum gap between two shift releases that still counts as a double tap.
pub const DOUBLE_SHIFT_WINDOW: Duration = Duration::from_millis(500);

/// What opened the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorSource {
    PluckKey,
    DoubleShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Idle,
    /// A double-shift gesture is in progress. `last_release` is the previous
    /// shift release still waiting for its partner.
    ShiftArmed {
        shift_down: bool,
        last_release: Option<Instant>,
    },
    AwaitingSelector {
        source: SelectorSource,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    pub consumed: bool,
}

impl Decision {
    pub const CONSUME: Decision = Decision { consumed: true };
    pub const PASS: Decision = Decision { consumed: false };
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ShowOverlay {
        session: u64,
        mode: SelectorSource,
        bindings: Vec<HotkeyBinding>,
    },
    /// Hide the overlay and cancel its timeout.
    HideOverlay,
    ResetOverlayTimeout,
    Activate(HotkeyBinding),
}

pub struct ActivationStateMachine {
    settings: SettingsHandle,
    state: ActivationState,
    /// Session number of the most recent overlay show.
    session: u64,
    /// Key whose press last activated a binding; its autorepeats are swallowed.
    held_key: Option<u16>,
    effects: UnboundedSender<Effect>,
    timeouts: Receiver<OverlayTimeout>,
}

impl ActivationStateMachine {
    pub fn new(
        settings: SettingsHandle,
        effects: UnboundedSender<Effect>,
        timeouts: Receiver<OverlayTimeout>,
    ) -> Self {
        ActivationStateMachine {
            settings,
            state: ActivationState::Idle,
            session: 0,
            held_key: None,
            effects,
            timeouts,
        }
    }

    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// Drop any gesture in progress, e.g. when the capture layer goes away.
    pub fn reset(&mut self) {
        if matches!(self.state, ActivationState::AwaitingSelector { .. }) {
            self.send(Effect::HideOverlay);
        }
        self.held_key = None;
        self.transition(ActivationState::Idle);
    }

    /// Apply a timeout reported by the overlay coordinator.
    ///
    /// Only a timeout for the live overlay session closes the selector.
    pub fn on_overlay_timeout(&mut self, timeout: OverlayTimeout) {
        match self.state {
            ActivationState::AwaitingSelector { .. } if timeout.session == self.session => {
                tracing::debug!(session = timeout.session, "selector timed out");
                self.transition(ActivationState::Idle);
            }
            _ => {
                tracing::trace!(session = timeout.session, "ignoring stale overlay timeout");
            }
        }
    }

    /// Decide whether `event` is consumed, requesting side effects on the way.
    pub fn handle(&mut self, event: &KeyEvent) -> Decision {
        while let Ok(timeout) = self.timeouts.try_recv() {
            self.on_overlay_timeout(timeout);
        }

        if event.is_key_down() {
            if event.is_repeat && self.held_key == Some(event.key_code) {
                tracing::trace!(key_code = event.key_code, "swallowed autorepeat");
                return Decision::CONSUME;
            }
            self.held_key = None;
        }

        let settings = self.settings.snapshot();

        if !settings.double_shift_enabled
            && matches!(self.state, ActivationState::ShiftArmed { .. })
        {
            self.transition(ActivationState::Idle);
        }

        if let Some(decision) = self.double_shift(&settings, event) {
            return decision;
        }
        if let Some(decision) = self.pluck_overlay(&settings, event) {
            return decision;
        }
        if let Some(decision) = self.cancel(&settings, event) {
            return decision;
        }
        self.reset_interrupted_timing(&settings, event);
        if let Some(decision) = self.resolve_selector(&settings, event) {
            return decision;
        }
        if settings.command_tab_blocked && is_command_tab(event) {
            tracing::trace!("blocked command-tab");
            return Decision::CONSUME;
        }
        if let Some(decision) = self.pluck_direct(&settings, event) {
            return decision;
        }

        Decision::PASS
    }

    fn double_shift(&mut self, settings: &Settings, event: &KeyEvent) -> Option<Decision> {
        if !settings.double_shift_enabled
            || event.kind != KeyEventKind::ModifierChange
            || !keycode::is_shift(event.key_code)
        {
            return None;
        }

        let shift_held = event.modifiers.contains(Modifiers::SHIFT);
        match (self.state, shift_held) {
            (ActivationState::Idle, true) => {
                self.transition(ActivationState::ShiftArmed {
                    shift_down: true,
                    last_release: None,
                });
            }
            (
                ActivationState::ShiftArmed {
                    shift_down: false,
                    last_release,
                },
                true,
            ) => {
                self.transition(ActivationState::ShiftArmed {
                    shift_down: true,
                    last_release,
                });
            }
            (
                ActivationState::ShiftArmed {
                    shift_down: true,
                    last_release,
                },
                false,
            ) => {
                let within_window = last_release.is_some_and(|previous| {
                    event.timestamp.saturating_duration_since(previous) <= DOUBLE_SHIFT_WINDOW
                });
                if within_window {
                    self.open_selector(SelectorSource::DoubleShift, settings);
                    return Some(Decision::CONSUME);
                }
                self.transition(ActivationState::ShiftArmed {
                    shift_down: false,
                    last_release: Some(event.timestamp),
                });
            }
            _ => {}
        }

        None
    }

    fn pluck_overlay(&mut self, settings: &Settings, event: &KeyEvent) -> Option<Decision> {
        if event.kind != KeyEventKind::ModifierChange {
            return None;
        }

        let held = settings.pluck_key.is_held(event.modifiers);
        match self.state {
            ActivationState::Idle | ActivationState::ShiftArmed { .. }
                if held && settings.pluck_overlay_enabled =>
            {
                self.open_selector(SelectorSource::PluckKey, settings);
            }
            ActivationState::AwaitingSelector {
                source: SelectorSource::PluckKey,
            } if !held => {
                self.transition(ActivationState::Idle);
                self.send(Effect::HideOverlay);
            }
            _ => return None,
        }

        Some(Decision::PASS)
    }

    fn cancel(&mut self, settings: &Settings, event: &KeyEvent) -> Option<Decision> {
        if !settings.double_shift_enabled || !event.is_key_down() || event.key_code != KEY_ESCAPE {
            return None;
        }
        if self.state == ActivationState::Idle {
            return Some(Decision::PASS);
        }

        tracing::debug!(state = ?self.state, "selector cancelled");
        self.transition(ActivationState::Idle);
        self.send(Effect::HideOverlay);
        Some(Decision::CONSUME)
    }

    /// Any other keystroke breaks a half-finished double tap.
    fn reset_interrupted_timing(&mut self, settings: &Settings, event: &KeyEvent) {
        if settings.double_shift_enabled
            && event.is_key_down()
            && !keycode::is_shift(event.key_code)
            && matches!(self.state, ActivationState::ShiftArmed { .. })
        {
            self.transition(ActivationState::Idle);
        }
    }

    /// Unresolved keys fall through so later rules still see them.
    fn resolve_selector(&mut self, settings: &Settings, event: &KeyEvent) -> Option<Decision> {
        if !event.is_key_down() {
            return None;
        }
        let ActivationState::AwaitingSelector { source } = self.state else {
            return None;
        };

        self.send(Effect::ResetOverlayTimeout);
        let binding = settings.bindings.lookup(event.key_code)?;
        if event.is_repeat {
            return Some(Decision::CONSUME);
        }

        tracing::debug!(
            key = %binding.key,
            app = %binding.app_name,
            ?source,
            "selector resolved"
        );
        self.send(Effect::Activate(binding.clone()));
        self.held_key = Some(event.key_code);
        self.transition(ActivationState::Idle);
        self.send(Effect::HideOverlay);
        Some(Decision::CONSUME)
    }

    fn pluck_direct(&mut self, settings: &Settings, event: &KeyEvent) -> Option<Decision> {
        if !event.is_key_down() || !settings.pluck_key.is_held(event.modifiers) {
            return None;
        }
        let binding = settings.bindings.lookup(event.key_code)?;
        if event.is_repeat {
            return Some(Decision::CONSUME);
        }

        tracing::debug!(
            key = %binding.key,
            app = %binding.app_name,
            modifiers = %event.modifiers.symbols(),
            "pluck key resolved"
        );
        self.send(Effect::Activate(binding.clone()));
        self.held_key = Some(event.key_code);
        Some(Decision::CONSUME)
    }

    fn open_selector(&mut self, source: SelectorSource, settings: &Settings) {
        self.session += 1;
        self.transition(ActivationState::AwaitingSelector { source });
        self.send(Effect::ShowOverlay {
            session: self.session,
            mode: source,
            bindings: settings.bindings.to_vec(),
        });
    }

    fn transition(&mut self, next: ActivationState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "activation state");
            self.state = next;
        }
    }

    fn send(&self, effect: Effect) {
        if self.effects.send(effect).is_err() {
            tracing::warn!("effect receiver dropped");
        }
    }
}

fn is_command_tab(event: &KeyEvent) -> bool {
    event.is_key_down() && event.key_code == KEY_TAB && event.modifiers.contains(Modifiers::COMMAND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{BindingRegistry, PluckKeyConfig};
    use crate::keycode::{KEY_SHIFT_LEFT, KEY_SHIFT_RIGHT};
    use crossbeam::channel::Sender;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    const KEY_M: u16 = 46;
    const KEY_T: u16 = 17;
    const KEY_A: u16 = 0;
    const KEY_Q: u16 = 12;
    const KEY_F5: u16 = 96;

    struct Harness {
        machine: ActivationStateMachine,
        effects: UnboundedReceiver<Effect>,
        timeouts: Sender<OverlayTimeout>,
        settings: SettingsHandle,
        start: Instant,
    }

    impl Harness {
        fn new(settings: Settings) -> Self {
            let settings = SettingsHandle::new(settings);
            let (effect_tx, effects) = mpsc::unbounded_channel();
            let (timeouts, timeout_rx) = crossbeam::channel::unbounded();
            Harness {
                machine: ActivationStateMachine::new(settings.clone(), effect_tx, timeout_rx),
                effects,
                timeouts,
                settings,
                start: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.start + Duration::from_millis(ms)
        }

        fn shift(&mut self, ms: u64, pressed: bool) -> Decision {
            let modifiers = if pressed {
                Modifiers::SHIFT
            } else {
                Modifiers::empty()
            };
            let event = KeyEvent::modifier_change(self.at(ms), KEY_SHIFT_LEFT, modifiers);
            self.machine.handle(&event)
        }

        fn key(&mut self, ms: u64, key_code: u16, modifiers: Modifiers) -> Decision {
            let event = KeyEvent::key_down(self.at(ms), key_code, modifiers);
            self.machine.handle(&event)
        }

        fn repeat(&mut self, ms: u64, key_code: u16, modifiers: Modifiers) -> Decision {
            let event = KeyEvent::key_down(self.at(ms), key_code, modifiers).repeated(true);
            self.machine.handle(&event)
        }

        fn double_shift(&mut self, start_ms: u64) {
            assert!(!self.shift(start_ms, true).consumed);
            assert!(!self.shift(start_ms + 80, false).consumed);
            assert!(!self.shift(start_ms + 200, true).consumed);
            assert!(self.shift(start_ms + 280, false).consumed);
        }

        fn drain(&mut self) -> Vec<Effect> {
            let mut out = Vec::new();
            while let Ok(effect) = self.effects.try_recv() {
                out.push(effect);
            }
            out
        }

        fn activations(effects: &[Effect]) -> Vec<&HotkeyBinding> {
            effects
                .iter()
                .filter_map(|e| match e {
                    Effect::Activate(binding) => Some(binding),
                    _ => None,
                })
                .collect()
        }
    }

    fn messages() -> HotkeyBinding {
        HotkeyBinding::new('m', "Messages", Some("com.apple.MobileSMS".to_string()))
    }

    fn terminal() -> HotkeyBinding {
        HotkeyBinding::new('t', "Terminal", None)
    }

    fn settings() -> Settings {
        Settings {
            pluck_key: PluckKeyConfig {
                modifiers: Modifiers::CONTROL | Modifiers::OPTION,
            },
            bindings: [messages(), terminal()].into_iter().collect::<BindingRegistry>(),
            double_shift_enabled: true,
            command_tab_blocked: false,
            pluck_overlay_enabled: false,
        }
    }

    #[test]
    fn double_shift_opens_selector_and_consumes_only_second_release() {
        let mut h = Harness::new(settings());

        assert!(!h.shift(0, true).consumed);
        assert!(!h.shift(90, false).consumed);
        assert!(matches!(
            h.machine.state(),
            ActivationState::ShiftArmed {
                shift_down: false,
                last_release: Some(_)
            }
        ));
        assert!(!h.shift(300, true).consumed);
        assert!(h.shift(400, false).consumed);

        assert_eq!(
            h.machine.state(),
            ActivationState::AwaitingSelector {
                source: SelectorSource::DoubleShift
            }
        );
        assert_eq!(
            h.drain(),
            vec![Effect::ShowOverlay {
                session: 1,
                mode: SelectorSource::DoubleShift,
                bindings: vec![messages(), terminal()],
            }]
        );
    }

    #[test]
    fn release_exactly_at_window_edge_still_counts() {
        let mut h = Harness::new(settings());
        h.shift(0, true);
        h.shift(100, false);
        h.shift(500, true);
        assert!(h.shift(600, false).consumed);
    }

    #[test]
    fn slow_second_release_becomes_new_reference() {
        let mut h = Harness::new(settings());
        h.shift(0, true);
        h.shift(100, false);
        h.shift(550, true);
        assert!(!h.shift(601, false).consumed);
        assert_eq!(
            h.machine.state(),
            ActivationState::ShiftArmed {
                shift_down: false,
                last_release: Some(h.at(601)),
            }
        );
        assert!(h.drain().is_empty());

        h.shift(700, true);
        assert!(h.shift(800, false).consumed);
    }

    #[test]
    fn third_tap_does_not_retrigger() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.drain();

        assert!(!h.shift(350, true).consumed);
        assert!(!h.shift(420, false).consumed);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn interleaved_keystroke_breaks_double_shift() {
        let mut h = Harness::new(settings());
        h.shift(0, true);
        h.shift(80, false);
        assert!(!h.key(150, KEY_A, Modifiers::empty()).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);

        h.shift(200, true);
        assert!(!h.shift(260, false).consumed);
        assert!(!matches!(
            h.machine.state(),
            ActivationState::AwaitingSelector { .. }
        ));
        assert!(h.drain().is_empty());
    }

    #[test]
    fn typing_with_shift_held_does_not_arm() {
        let mut h = Harness::new(settings());
        h.shift(0, true);
        h.key(50, KEY_A, Modifiers::SHIFT);
        assert!(!h.shift(90, false).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);

        h.shift(200, true);
        assert!(!h.shift(260, false).consumed);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn second_shift_key_while_first_held_is_ignored() {
        let mut h = Harness::new(settings());
        h.shift(0, true);
        let right = KeyEvent::modifier_change(h.at(20), KEY_SHIFT_RIGHT, Modifiers::SHIFT);
        assert!(!h.machine.handle(&right).consumed);
        assert_eq!(
            h.machine.state(),
            ActivationState::ShiftArmed {
                shift_down: true,
                last_release: None,
            }
        );
    }

    #[test]
    fn disabled_double_shift_never_fires() {
        let mut h = Harness::new(Settings {
            double_shift_enabled: false,
            ..settings()
        });

        for start in [0, 1000] {
            assert!(!h.shift(start, true).consumed);
            assert!(!h.shift(start + 50, false).consumed);
            assert!(!h.shift(start + 100, true).consumed);
            assert!(!h.shift(start + 150, false).consumed);
        }
        assert!(!h.key(2000, KEY_ESCAPE, Modifiers::empty()).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn turning_double_shift_off_drops_armed_state() {
        let mut h = Harness::new(settings());
        h.shift(0, true);
        h.shift(50, false);
        h.settings.replace(Settings {
            double_shift_enabled: false,
            ..settings()
        });
        h.key(60, KEY_A, Modifiers::empty());
        assert_eq!(h.machine.state(), ActivationState::Idle);
    }

    #[test]
    fn selector_key_activates_binding() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.drain();

        assert!(h.key(500, KEY_M, Modifiers::empty()).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert_eq!(
            h.drain(),
            vec![
                Effect::ResetOverlayTimeout,
                Effect::Activate(messages()),
                Effect::HideOverlay,
            ]
        );
    }

    #[test]
    fn unbound_selector_key_extends_overlay_and_keeps_waiting() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.drain();

        assert!(!h.key(500, KEY_Q, Modifiers::empty()).consumed);
        assert!(!h.key(600, KEY_F5, Modifiers::empty()).consumed);
        assert_eq!(
            h.machine.state(),
            ActivationState::AwaitingSelector {
                source: SelectorSource::DoubleShift
            }
        );
        assert_eq!(
            h.drain(),
            vec![Effect::ResetOverlayTimeout, Effect::ResetOverlayTimeout]
        );

        assert!(h.key(700, KEY_T, Modifiers::empty()).consumed);
        assert_eq!(Harness::activations(&h.drain()), vec![&terminal()]);
    }

    #[test]
    fn escape_cancels_selector_without_activation() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.drain();

        assert!(h.key(500, KEY_ESCAPE, Modifiers::empty()).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert_eq!(h.drain(), vec![Effect::HideOverlay]);
    }

    #[test]
    fn escape_clears_pending_release() {
        let mut h = Harness::new(settings());
        h.shift(0, true);
        h.shift(50, false);

        assert!(h.key(100, KEY_ESCAPE, Modifiers::empty()).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);

        h.shift(150, true);
        assert!(!h.shift(200, false).consumed);
    }

    #[test]
    fn escape_when_idle_passes_through() {
        let mut h = Harness::new(settings());
        assert!(!h.key(0, KEY_ESCAPE, Modifiers::empty()).consumed);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn pluck_key_activates_directly_without_overlay() {
        let mut h = Harness::new(settings());
        let decision = h.key(0, KEY_M, Modifiers::CONTROL | Modifiers::OPTION);
        assert!(decision.consumed);
        assert_eq!(h.drain(), vec![Effect::Activate(messages())]);
        assert_eq!(h.machine.state(), ActivationState::Idle);
    }

    #[test]
    fn pluck_key_accepts_extra_modifiers() {
        let mut h = Harness::new(settings());
        let mods = Modifiers::CONTROL | Modifiers::OPTION | Modifiers::COMMAND;
        assert!(h.key(0, KEY_T, mods).consumed);
        assert_eq!(Harness::activations(&h.drain()), vec![&terminal()]);
    }

    #[test]
    fn held_pluck_key_activates_once() {
        let mut h = Harness::new(settings());
        let mods = Modifiers::CONTROL | Modifiers::OPTION;

        assert!(h.key(0, KEY_M, mods).consumed);
        for i in 1..5 {
            assert!(h.repeat(400 + i * 33, KEY_M, mods).consumed);
        }
        assert_eq!(h.drain(), vec![Effect::Activate(messages())]);

        assert!(h.key(1000, KEY_M, mods).consumed);
        assert_eq!(Harness::activations(&h.drain()), vec![&messages()]);
    }

    #[test]
    fn repeat_reaching_pluck_key_mid_hold_is_swallowed() {
        let mut h = Harness::new(settings());
        let mods = Modifiers::CONTROL | Modifiers::OPTION;

        assert!(!h.key(0, KEY_T, Modifiers::empty()).consumed);
        assert!(!h.repeat(400, KEY_T, Modifiers::empty()).consumed);
        assert!(h.repeat(433, KEY_T, mods).consumed);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn held_selector_key_does_not_leak_repeats() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.drain();

        assert!(h.key(500, KEY_M, Modifiers::empty()).consumed);
        h.drain();
        for i in 1..4 {
            assert!(h.repeat(900 + i * 33, KEY_M, Modifiers::empty()).consumed);
        }
        assert!(h.drain().is_empty());
        assert_eq!(h.machine.state(), ActivationState::Idle);

        assert!(!h.key(1500, KEY_M, Modifiers::empty()).consumed);
    }

    #[test]
    fn partial_pluck_key_is_ignored() {
        let mut h = Harness::new(settings());
        assert!(!h.key(0, KEY_M, Modifiers::CONTROL).consumed);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn empty_pluck_key_disables_direct_path() {
        let mut h = Harness::new(Settings {
            pluck_key: PluckKeyConfig::default(),
            ..settings()
        });
        assert!(!h.key(0, KEY_M, Modifiers::empty()).consumed);
        assert!(!h.key(10, KEY_M, Modifiers::all()).consumed);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn unresolved_event_is_idempotent() {
        let mut h = Harness::new(settings());
        let mods = Modifiers::CONTROL | Modifiers::OPTION;
        for _ in 0..2 {
            assert!(!h.key(0, KEY_Q, mods).consumed);
            assert_eq!(h.machine.state(), ActivationState::Idle);
        }
        assert!(h.drain().is_empty());
    }

    #[test]
    fn command_tab_block_follows_toggle() {
        let mut h = Harness::new(settings());
        assert!(!h.key(0, KEY_TAB, Modifiers::COMMAND).consumed);

        h.settings.replace(Settings {
            command_tab_blocked: true,
            ..settings()
        });
        assert!(h.key(10, KEY_TAB, Modifiers::COMMAND).consumed);
        assert!(h.key(20, KEY_TAB, Modifiers::COMMAND | Modifiers::SHIFT).consumed);
        assert!(!h.key(30, KEY_TAB, Modifiers::empty()).consumed);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn command_tab_block_holds_while_selector_is_open() {
        let mut h = Harness::new(Settings {
            command_tab_blocked: true,
            ..settings()
        });
        h.double_shift(0);
        h.drain();

        assert!(h.key(500, KEY_TAB, Modifiers::COMMAND).consumed);
        assert_eq!(
            h.machine.state(),
            ActivationState::AwaitingSelector {
                source: SelectorSource::DoubleShift
            }
        );
    }

    #[test]
    fn timeout_for_current_session_returns_to_idle() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.drain();

        h.timeouts.send(OverlayTimeout { session: 1 }).unwrap();
        assert!(!h.key(6000, KEY_M, Modifiers::empty()).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn stale_timeout_does_not_close_newer_selector() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.key(400, KEY_ESCAPE, Modifiers::empty());
        h.double_shift(1000);
        h.drain();

        h.timeouts.send(OverlayTimeout { session: 1 }).unwrap();
        assert!(h.key(1500, KEY_M, Modifiers::empty()).consumed);
        assert_eq!(Harness::activations(&h.drain()), vec![&messages()]);
    }

    #[test]
    fn reset_hides_open_selector() {
        let mut h = Harness::new(settings());
        h.double_shift(0);
        h.drain();

        h.machine.reset();
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert_eq!(h.drain(), vec![Effect::HideOverlay]);

        h.machine.reset();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn pluck_overlay_follows_modifier_hold() {
        let mut h = Harness::new(Settings {
            pluck_overlay_enabled: true,
            ..settings()
        });
        let ctrl = KeyEvent::modifier_change(h.at(0), 59, Modifiers::CONTROL);
        let ctrl_opt =
            KeyEvent::modifier_change(h.at(20), 58, Modifiers::CONTROL | Modifiers::OPTION);
        assert!(!h.machine.handle(&ctrl).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert!(!h.machine.handle(&ctrl_opt).consumed);
        assert_eq!(
            h.machine.state(),
            ActivationState::AwaitingSelector {
                source: SelectorSource::PluckKey
            }
        );
        assert!(matches!(
            h.drain().as_slice(),
            [Effect::ShowOverlay {
                mode: SelectorSource::PluckKey,
                ..
            }]
        ));

        let release = KeyEvent::modifier_change(h.at(300), 58, Modifiers::CONTROL);
        assert!(!h.machine.handle(&release).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert_eq!(h.drain(), vec![Effect::HideOverlay]);
    }

    #[test]
    fn pluck_overlay_with_shift_in_pluck_key() {
        let mut h = Harness::new(Settings {
            pluck_key: PluckKeyConfig {
                modifiers: Modifiers::COMMAND | Modifiers::SHIFT,
            },
            pluck_overlay_enabled: true,
            ..settings()
        });
        let cmd = KeyEvent::modifier_change(h.at(0), 55, Modifiers::COMMAND);
        let cmd_shift = KeyEvent::modifier_change(
            h.at(30),
            KEY_SHIFT_LEFT,
            Modifiers::COMMAND | Modifiers::SHIFT,
        );
        assert!(!h.machine.handle(&cmd).consumed);
        assert!(!h.machine.handle(&cmd_shift).consumed);
        assert_eq!(
            h.machine.state(),
            ActivationState::AwaitingSelector {
                source: SelectorSource::PluckKey
            }
        );
        assert!(matches!(
            h.drain().as_slice(),
            [Effect::ShowOverlay {
                mode: SelectorSource::PluckKey,
                ..
            }]
        ));

        let shift_up = KeyEvent::modifier_change(h.at(400), KEY_SHIFT_LEFT, Modifiers::COMMAND);
        assert!(!h.machine.handle(&shift_up).consumed);
        assert_eq!(h.machine.state(), ActivationState::Idle);
        assert_eq!(h.drain(), vec![Effect::HideOverlay]);
    }

    #[test]
    fn pluck_overlay_selection_activates() {
        let mut h = Harness::new(Settings {
            pluck_overlay_enabled: true,
            ..settings()
        });
        let mods = Modifiers::CONTROL | Modifiers::OPTION;
        let hold = KeyEvent::modifier_change(h.at(0), 58, mods);
        h.machine.handle(&hold);
        h.drain();

        assert!(h.key(100, KEY_M, mods).consumed);
        assert_eq!(
            h.drain(),
            vec![
                Effect::ResetOverlayTimeout,
                Effect::Activate(messages()),
                Effect::HideOverlay,
            ]
        );
    }
}
