//! Global keyboard capture through a CGEventTap
//!
//! The tap runs on its own thread with a CFRunLoop. Every key-down and
//! flags-changed event goes through the activation state machine, and
//! consumed events are turned into null events before they reach any app.

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use core_foundation::base::TCFType;
use core_foundation::mach_port::CFMachPort;
use core_foundation::runloop::{CFRunLoop, kCFRunLoopCommonModes};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventType, EventField,
};

use crate::activation::ActivationStateMachine;
use crate::error::{PluckError, Result};
use crate::key_event::{KeyEvent, Modifiers};

unsafe extern "C" {
    fn CGEventTapEnable(tap: *mut c_void, enable: bool);
}

pub struct EventTap {
    runloop: Arc<CFRunLoop>,
}

impl EventTap {
    /// Install the tap and start feeding events to `machine`.
    ///
    /// Fails when the tap cannot be created, which usually means the
    /// Accessibility permission is missing.
    pub fn start(machine: ActivationStateMachine) -> Result<Self> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<Arc<CFRunLoop>>>();

        std::thread::Builder::new()
            .name("event_tap".into())
            .spawn(move || {
                let current = Arc::new(CFRunLoop::get_current());

                let machine = RefCell::new(machine);
                let port: Rc<RefCell<Option<CFMachPort>>> = Rc::new(RefCell::new(None));
                let callback_port = Rc::clone(&port);

                let tap = match CGEventTap::new(
                    CGEventTapLocation::Session,
                    CGEventTapPlacement::HeadInsertEventTap,
                    CGEventTapOptions::Default,
                    vec![CGEventType::FlagsChanged, CGEventType::KeyDown],
                    move |_, event_type, event| {
                        handle_event(&machine, &callback_port, event_type, event)
                    },
                ) {
                    Ok(tap) => tap,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PluckError::EventTap(format!(
                            "Failed to create event tap. Make sure Pluck has Accessibility permissions.\n\
                             System Preferences > Privacy & Security > Accessibility > Add Pluck.app\n\
                             Error: {:?}",
                            e
                        ))));
                        return;
                    }
                };

                let loop_source = match tap.mach_port.create_runloop_source(0) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PluckError::EventTap(format!(
                            "Failed to create runloop source: {:?}",
                            e
                        ))));
                        return;
                    }
                };

                *port.borrow_mut() = Some(tap.mach_port.clone());

                unsafe {
                    current.add_source(&loop_source, kCFRunLoopCommonModes);
                    tap.enable();
                }

                let _ = ready_tx.send(Ok(Arc::clone(&current)));
                tracing::info!("Event tap installed");

                unsafe {
                    core_foundation::runloop::CFRunLoopRun();
                }

                tracing::debug!("Event tap run loop exited");
            })
            .map_err(|e| PluckError::EventTap(format!("Failed to spawn event tap thread: {:?}", e)))?;

        let runloop = ready_rx
            .recv()
            .map_err(|e| PluckError::EventTap(format!("Event tap thread crashed: {:?}", e)))??;

        Ok(Self { runloop })
    }

    pub fn stop(&self) {
        self.runloop.stop();
    }
}

fn handle_event(
    machine: &RefCell<ActivationStateMachine>,
    port: &RefCell<Option<CFMachPort>>,
    event_type: CGEventType,
    event: &CGEvent,
) -> Option<CGEvent> {
    if matches!(
        event_type,
        CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput
    ) {
        tracing::warn!("Event tap disabled by the system, re-enabling");
        machine.borrow_mut().reset();
        if let Some(port) = port.borrow().as_ref() {
            unsafe { CGEventTapEnable(port.as_concrete_TypeRef() as *mut c_void, true) };
        }
        return Some(event.clone());
    }

    let key_code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
    let is_repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
    let modifiers = modifiers_from_flags(event.get_flags());

    let Some(key_event) = translate(event_type, key_code, modifiers, is_repeat) else {
        return Some(event.clone());
    };

    let mut machine = machine.borrow_mut();
    let decision = machine.handle(&key_event);

    let new_event = event.clone();
    if decision.consumed {
        tracing::trace!(key_code, state = ?machine.state(), "event consumed");
        new_event.set_type(CGEventType::Null);
    }
    Some(new_event)
}

/// Build the state machine's view of a tapped event.
fn translate(
    event_type: CGEventType,
    key_code: i64,
    modifiers: Modifiers,
    is_repeat: bool,
) -> Option<KeyEvent> {
    let key_code = u16::try_from(key_code).ok()?;
    let now = Instant::now();

    match event_type {
        CGEventType::KeyDown => {
            Some(KeyEvent::key_down(now, key_code, modifiers).repeated(is_repeat))
        }
        CGEventType::FlagsChanged => Some(KeyEvent::modifier_change(now, key_code, modifiers)),
        _ => None,
    }
}

fn modifiers_from_flags(flags: CGEventFlags) -> Modifiers {
    let mut modifiers = Modifiers::empty();

    if flags.contains(CGEventFlags::CGEventFlagControl) {
        modifiers.insert(Modifiers::CONTROL);
    }
    if flags.contains(CGEventFlags::CGEventFlagAlternate) {
        modifiers.insert(Modifiers::OPTION);
    }
    if flags.contains(CGEventFlags::CGEventFlagShift) {
        modifiers.insert(Modifiers::SHIFT);
    }
    if flags.contains(CGEventFlags::CGEventFlagCommand) {
        modifiers.insert(Modifiers::COMMAND);
    }

    modifiers
}
