//! Structural input events and their delivery.
//!
//! Foreground and background injection build identical events; only the
//! [`EventTarget`] differs.

use tracing::{debug, warn};

use super::keymap;
use super::{NativePlatform, NativeResult};
use crate::backend::keys::{KeyCombo, KeyComboError, Modifier};
use crate::backend::types::{InjectionReport, MouseButton, Point};
use crate::{Error, Result};

/// Where an event is posted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    /// System-wide input stream; follows focus and moves the shared cursor
    Global,
    /// Delivered to one process without changing focus
    Process(i32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierFlags {
    pub command: bool,
    pub shift: bool,
    pub option: bool,
    pub control: bool,
}

impl ModifierFlags {
    pub fn from_modifiers(modifiers: &[Modifier]) -> Self {
        let mut flags = Self::default();
        for modifier in modifiers {
            match modifier {
                Modifier::Command => flags.command = true,
                Modifier::Shift => flags.shift = true,
                Modifier::Option => flags.option = true,
                Modifier::Control => flags.control = true,
            }
        }
        flags
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    MouseMove {
        at: Point,
    },
    MouseDown {
        at: Point,
        button: MouseButton,
        click_count: i64,
    },
    MouseUp {
        at: Point,
        button: MouseButton,
        click_count: i64,
    },
    /// Pointer motion with the left button held
    MouseDrag {
        at: Point,
    },
    /// Wheel motion at the current pointer location, positive = up
    Scroll {
        amount: i32,
    },
    KeyDown {
        keycode: u16,
        flags: ModifierFlags,
    },
    KeyUp {
        keycode: u16,
        flags: ModifierFlags,
    },
    /// Unicode text attached to a single keyboard event
    Text {
        text: String,
    },
}

/// Resolve a combination to events, failing before anything is posted.
pub fn key_events(combo: &str) -> Result<Vec<InputEvent>> {
    let parsed: KeyCombo = combo.parse().map_err(|e| Error::invalid_combo(combo, e))?;
    let keycode = keymap::keycode(parsed.key()).ok_or_else(|| {
        Error::invalid_combo(combo, KeyComboError::UnknownKey(parsed.key().to_string()))
    })?;
    let flags = ModifierFlags::from_modifiers(parsed.modifiers());
    Ok(vec![
        InputEvent::KeyDown { keycode, flags },
        InputEvent::KeyUp { keycode, flags },
    ])
}

pub fn click_events(at: Point, button: MouseButton, clicks: i64) -> Vec<InputEvent> {
    let mut events = vec![InputEvent::MouseMove { at }];
    for click_count in 1..=clicks {
        events.push(InputEvent::MouseDown {
            at,
            button,
            click_count,
        });
        events.push(InputEvent::MouseUp {
            at,
            button,
            click_count,
        });
    }
    events
}

pub fn drag_events(from: Point, to: Point) -> Vec<InputEvent> {
    vec![
        InputEvent::MouseMove { at: from },
        InputEvent::MouseDown {
            at: from,
            button: MouseButton::Left,
            click_count: 1,
        },
        InputEvent::MouseDrag { at: to },
        InputEvent::MouseUp {
            at: to,
            button: MouseButton::Left,
            click_count: 1,
        },
    ]
}

/// Post every event in order, stopping at the first native failure.
///
/// Keys and buttons pressed earlier in the sequence are released before the
/// error is returned, so a half-posted combo or click never leaves input held.
pub fn post_all(
    platform: &dyn NativePlatform,
    events: &[InputEvent],
    target: EventTarget,
) -> NativeResult<()> {
    let mut held: Vec<InputEvent> = Vec::new();
    for event in events {
        if let Err(e) = platform.post(event, target) {
            release_held(platform, held, target);
            return Err(e);
        }
        track_held(&mut held, event);
    }
    Ok(())
}

/// Keep `held` as the release events owed for everything currently pressed
fn track_held(held: &mut Vec<InputEvent>, event: &InputEvent) {
    match event {
        InputEvent::KeyDown { keycode, .. } => held.push(InputEvent::KeyUp {
            keycode: *keycode,
            flags: ModifierFlags::default(),
        }),
        InputEvent::KeyUp { keycode, .. } => {
            held.retain(|h| !matches!(h, InputEvent::KeyUp { keycode: k, .. } if k == keycode))
        }
        InputEvent::MouseDown {
            at,
            button,
            click_count,
        } => held.push(InputEvent::MouseUp {
            at: *at,
            button: *button,
            click_count: *click_count,
        }),
        InputEvent::MouseUp { button, .. } => {
            held.retain(|h| !matches!(h, InputEvent::MouseUp { button: b, .. } if b == button))
        }
        _ => {}
    }
}

fn release_held(platform: &dyn NativePlatform, held: Vec<InputEvent>, target: EventTarget) {
    for release in held.into_iter().rev() {
        if let Err(e) = platform.post(&release, target) {
            warn!(error = %e, ?release, "Failed to release held input");
        }
    }
}

/// Type `text` into `pid` as one down/up pair per character.
///
/// Characters without a keycode, or whose events fail to post, are counted
/// as undelivered; the remaining characters are still attempted.
pub fn type_to_process(platform: &dyn NativePlatform, pid: i32, text: &str) -> InjectionReport {
    let total = text.chars().count();
    let mut delivered = 0;

    for c in text.chars() {
        let Some((keycode, needs_shift)) = keymap::char_key(c) else {
            debug!(pid, character = %c.escape_default(), "No keycode for character");
            continue;
        };
        let flags = if needs_shift {
            ModifierFlags::shift()
        } else {
            ModifierFlags::default()
        };
        let events = [
            InputEvent::KeyDown { keycode, flags },
            InputEvent::KeyUp { keycode, flags },
        ];
        match post_all(platform, &events, EventTarget::Process(pid)) {
            Ok(()) => delivered += 1,
            Err(e) => debug!(pid, error = %e, "Failed to post character"),
        }
    }

    let report = InjectionReport::new(delivered, total);
    if !report.is_complete() {
        warn!(pid, delivered, total, "Background text injection was partial");
    }
    report
}
