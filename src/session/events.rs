//! Session event kinds, payloads and callback dispatch.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::backend::{CaptureResult, MouseButton, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Capture,
    Click,
    Key,
    Move,
    SessionClosed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Capture,
        EventKind::Click,
        EventKind::Key,
        EventKind::Move,
        EventKind::SessionClosed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Capture => "capture",
            EventKind::Click => "click",
            EventKind::Key => "key",
            EventKind::Move => "move",
            EventKind::SessionClosed => "session_closed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "capture" | "screenshot" => Ok(EventKind::Capture),
            "click" => Ok(EventKind::Click),
            "key" | "key_press" => Ok(EventKind::Key),
            "move" | "mouse_move" => Ok(EventKind::Move),
            "session_closed" | "close" | "context_close" => Ok(EventKind::SessionClosed),
            other => Err(format!(
                "Unknown event: {}. Supported: capture, click, key, move, session_closed",
                other
            )),
        }
    }
}

/// What a key event carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput<'a> {
    Combo(&'a str),
    Text(&'a str),
}

/// Payload handed to callbacks, borrowed from the primitive's result
#[derive(Debug)]
pub enum SessionEvent<'a> {
    Capture {
        capture: &'a CaptureResult,
        /// Set for window captures
        pid: Option<i32>,
    },
    Click {
        at: Point,
        button: MouseButton,
        clicks: u8,
        pid: Option<i32>,
    },
    Key {
        input: KeyInput<'a>,
        pid: Option<i32>,
    },
    Move {
        to: Point,
    },
    SessionClosed {
        id: &'a str,
        screenshot_dir: &'a Path,
        temp_dir: &'a Path,
    },
}

impl SessionEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Capture { .. } => EventKind::Capture,
            SessionEvent::Click { .. } => EventKind::Click,
            SessionEvent::Key { .. } => EventKind::Key,
            SessionEvent::Move { .. } => EventKind::Move,
            SessionEvent::SessionClosed { .. } => EventKind::SessionClosed,
        }
    }
}

pub type Callback = Box<dyn FnMut(&SessionEvent<'_>) -> anyhow::Result<()> + Send>;

/// Per-kind callback lists, invoked in registration order
#[derive(Default)]
pub(crate) struct Callbacks {
    by_kind: HashMap<EventKind, Vec<Callback>>,
}

impl Callbacks {
    pub fn register(&mut self, kind: EventKind, callback: Callback) {
        self.by_kind.entry(kind).or_default().push(callback);
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every callback for the event's kind. Errors and panics are
    /// logged per callback and never reach the caller.
    pub fn emit(&mut self, session_id: &str, event: &SessionEvent<'_>) {
        let kind = event.kind();
        let Some(callbacks) = self.by_kind.get_mut(&kind) else {
            return;
        };

        for (index, callback) in callbacks.iter_mut().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(session = session_id, event = %kind, index, "Callback failed: {:#}", e);
                }
                Err(payload) => {
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!(session = session_id, event = %kind, index, "Callback panicked: {}", reason);
                }
            }
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind.as_str(), &self.count(kind));
        }
        map.finish()
    }
}
