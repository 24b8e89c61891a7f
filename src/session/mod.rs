//! Isolated automation sessions.
//!
//! A [`Session`] binds one backend to its own screenshot and temp
//! directories, counts actions, and dispatches events to callbacks. Sessions
//! on different threads never share ids or directories, but they do share the
//! physical cursor, keyboard and display: foreground primitives of two
//! sessions can interleave at the OS level. Prefer the background (per-pid)
//! operations when sessions run concurrently.
//!
//! ```rust,ignore
//! use deskpilot::session::{EventKind, Session, SessionEvent};
//!
//! let mut session = Session::builder().backend("auto").build()?;
//! session.on(EventKind::Click, |event| {
//!     if let SessionEvent::Click { at, .. } = event {
//!         tracing::info!("clicked at {}", at);
//!     }
//!     Ok(())
//! });
//! session.left_click(Some(Point::new(100, 100)))?;
//! session.close();
//! ```

pub mod events;
pub mod registry;
pub mod stats;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub use events::{Callback, EventKind, KeyInput, SessionEvent};
pub use stats::SessionStats;

use crate::backend::{
    factory, Backend, BackendOptions, BackgroundBackend, CapabilityDescriptor, CaptureResult,
    InjectionReport, MouseButton, Outcome, Point, RawPixels, ScreenSize, Screenshot,
};
use crate::config::{AutomationConfig, DEFAULT_ACTION_DELAY};
use crate::{Error, Result};
use events::Callbacks;

/// Construction options for [`Session`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Backend name or alias; `None` or `"auto"` selects the best available
    pub backend: Option<String>,
    pub action_delay: Duration,
    /// Explicit directories are created if missing and never removed on close
    pub screenshot_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    /// Remove session-owned directories on close
    pub cleanup_on_close: bool,
    pub metadata: Map<String, Value>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            backend: None,
            action_delay: DEFAULT_ACTION_DELAY,
            screenshot_dir: None,
            temp_dir: None,
            cleanup_on_close: true,
            metadata: Map::new(),
        }
    }
}

impl From<&AutomationConfig> for SessionOptions {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            backend: config.backend.clone(),
            action_delay: config.action_delay,
            screenshot_dir: config.screenshot_dir.clone(),
            temp_dir: config.temp_dir.clone(),
            cleanup_on_close: config.cleanup_on_close,
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionBuilder {
    options: SessionOptions,
}

impl SessionBuilder {
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self {
            options: SessionOptions::from(config),
        }
    }

    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.options.backend = Some(name.into());
        self
    }

    pub fn action_delay(mut self, delay: Duration) -> Self {
        self.options.action_delay = delay;
        self
    }

    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.screenshot_dir = Some(dir.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.temp_dir = Some(dir.into());
        self
    }

    pub fn cleanup_on_close(mut self, cleanup: bool) -> Self {
        self.options.cleanup_on_close = cleanup;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Session> {
        Session::new(self.options)
    }

    /// Build with a caller-supplied backend constructor instead of the factory
    pub fn build_with<F>(self, create: F) -> Result<Session>
    where
        F: FnOnce(BackendOptions) -> Result<Box<dyn Backend>>,
    {
        Session::assemble(self.options, create)
    }
}

/// A session directory, owned (removed on close) or caller-provided
#[derive(Debug)]
struct SessionDir {
    path: PathBuf,
    owned: Option<TempDir>,
    /// Topmost directory this session created for an explicit path
    created: Option<PathBuf>,
}

impl SessionDir {
    /// Owned directories are created here; explicit ones only in [`Self::ensure`]
    fn plan(explicit: Option<PathBuf>, prefix: &str) -> Result<Self> {
        match explicit {
            Some(path) => Ok(Self {
                path,
                owned: None,
                created: None,
            }),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(prefix)
                    .tempdir_in(env::temp_dir())?;
                Ok(Self {
                    path: dir.path().to_path_buf(),
                    owned: Some(dir),
                    created: None,
                })
            }
        }
    }

    fn ensure(&mut self) -> Result<()> {
        if self.owned.is_some() || self.path.is_dir() {
            return Ok(());
        }
        let topmost_missing = self
            .path
            .ancestors()
            .take_while(|a| !a.as_os_str().is_empty() && !a.exists())
            .last()
            .map(Path::to_path_buf);
        fs::create_dir_all(&self.path)?;
        self.created = topmost_missing;
        Ok(())
    }

    /// Undo [`Self::ensure`] after a failed construction
    fn discard(&mut self) {
        if let Some(root) = self.created.take() {
            match fs::remove_dir_all(&root) {
                Ok(()) => debug!("Removed {}", root.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", root.display(), e),
            }
        }
    }

    fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    fn release(&mut self, cleanup: bool, session_id: &str) {
        let Some(dir) = self.owned.take() else {
            return;
        };
        if cleanup {
            match dir.close() {
                Ok(()) => debug!(session = session_id, "Removed {}", self.path.display()),
                Err(e) => warn!(
                    session = session_id,
                    "Failed to remove {}: {}",
                    self.path.display(),
                    e
                ),
            }
        } else {
            let _ = dir.keep();
        }
    }
}

pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    backend: Box<dyn Backend>,
    screenshot_dir: SessionDir,
    temp_dir: SessionDir,
    metadata: Map<String, Value>,
    cleanup_on_close: bool,
    closed: bool,
    action_count: u64,
    screenshot_count: u64,
    callbacks: Callbacks,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Options from [`AutomationConfig::from_env`]
    pub fn from_env() -> Result<Self> {
        SessionBuilder::from_config(&AutomationConfig::from_env()).build()
    }

    pub fn new(options: SessionOptions) -> Result<Self> {
        // Backend choice is validated before any directory exists
        let kind = factory::select(options.backend.as_deref())?;
        let delay = options.action_delay;
        Self::assemble(options, |backend_options| {
            factory::instantiate(kind, delay, backend_options)
        })
    }

    fn assemble<F>(options: SessionOptions, create: F) -> Result<Self>
    where
        F: FnOnce(BackendOptions) -> Result<Box<dyn Backend>>,
    {
        let id = registry::reserve_id();
        Self::assemble_with_id(id.clone(), options, create).map_err(|e| {
            registry::release(&id);
            e
        })
    }

    fn assemble_with_id<F>(id: String, options: SessionOptions, create: F) -> Result<Self>
    where
        F: FnOnce(BackendOptions) -> Result<Box<dyn Backend>>,
    {
        let mut screenshot_dir = SessionDir::plan(
            options.screenshot_dir,
            &format!("deskpilot_screenshots_{}_", id),
        )?;
        let mut temp_dir = SessionDir::plan(options.temp_dir, &format!("deskpilot_temp_{}_", id))?;
        // Nothing explicit exists on disk until the layout is accepted
        registry::claim(&id, &screenshot_dir.path, &temp_dir.path)?;

        let backend = match Self::prepare(&mut screenshot_dir, &mut temp_dir, create) {
            Ok(backend) => backend,
            Err(e) => {
                screenshot_dir.discard();
                temp_dir.discard();
                return Err(e);
            }
        };

        info!(
            session = %id,
            backend = %backend.capabilities().name,
            screenshot_dir = %screenshot_dir.path.display(),
            temp_dir = %temp_dir.path.display(),
            "Session opened"
        );

        Ok(Self {
            id,
            created_at: Utc::now(),
            backend,
            screenshot_dir,
            temp_dir,
            metadata: options.metadata,
            cleanup_on_close: options.cleanup_on_close,
            closed: false,
            action_count: 0,
            screenshot_count: 0,
            callbacks: Callbacks::default(),
        })
    }

    fn prepare<F>(
        screenshot_dir: &mut SessionDir,
        temp_dir: &mut SessionDir,
        create: F,
    ) -> Result<Box<dyn Backend>>
    where
        F: FnOnce(BackendOptions) -> Result<Box<dyn Backend>>,
    {
        screenshot_dir.ensure()?;
        temp_dir.ensure()?;
        create(BackendOptions {
            screenshot_dir: screenshot_dir.path.clone(),
        })
    }

    // ============ Accessors ============

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn capabilities(&self) -> &CapabilityDescriptor {
        self.backend.capabilities()
    }

    pub fn backend_name(&self) -> &str {
        &self.backend.capabilities().name
    }

    pub fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir.path
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir.path
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn action_count(&self) -> u64 {
        self.action_count
    }

    pub fn screenshot_count(&self) -> u64 {
        self.screenshot_count
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            id: self.id.clone(),
            backend: self.backend_name().to_string(),
            created_at: self.created_at,
            closed: self.closed,
            action_count: self.action_count,
            screenshot_count: self.screenshot_count,
            screenshot_dir: self.screenshot_dir.path.clone(),
            temp_dir: self.temp_dir.path.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Register a callback for one event kind
    pub fn on<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&SessionEvent<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.callbacks.register(kind, Box::new(callback));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::ClosedSession(self.id.clone()))
        } else {
            Ok(())
        }
    }

    fn emit(&mut self, event: &SessionEvent<'_>) {
        self.callbacks.emit(&self.id, event);
    }

    // ============ Screen ============

    pub fn screenshot(&mut self, save: bool) -> Result<Outcome<Screenshot>> {
        self.ensure_open()?;
        let outcome = self.backend.screenshot(save)?;
        self.action_count += 1;
        self.screenshot_count += 1;
        self.callbacks.emit(
            &self.id,
            &SessionEvent::Capture {
                capture: &outcome.value.capture,
                pid: None,
            },
        );
        Ok(outcome)
    }

    pub fn get_screen_size(&mut self) -> Result<Outcome<ScreenSize>> {
        self.ensure_open()?;
        self.backend.get_screen_size()
    }

    // ============ Mouse ============

    pub fn cursor_position(&mut self) -> Result<Outcome<Point>> {
        self.ensure_open()?;
        self.backend.cursor_position()
    }

    pub fn mouse_move(&mut self, x: i32, y: i32) -> Result<Outcome> {
        self.ensure_open()?;
        let outcome = self.backend.mouse_move(x, y)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Move {
            to: Point::new(x, y),
        });
        Ok(outcome)
    }

    pub fn click(&mut self, button: MouseButton, at: Option<Point>) -> Result<Outcome<Point>> {
        self.ensure_open()?;
        let outcome = self.backend.click(button, at)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Click {
            at: outcome.value,
            button,
            clicks: 1,
            pid: None,
        });
        Ok(outcome)
    }

    pub fn left_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        self.click(MouseButton::Left, at)
    }

    pub fn right_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        self.click(MouseButton::Right, at)
    }

    pub fn middle_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        self.click(MouseButton::Middle, at)
    }

    pub fn double_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        self.ensure_open()?;
        let outcome = self.backend.double_click(at)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Click {
            at: outcome.value,
            button: MouseButton::Left,
            clicks: 2,
            pid: None,
        });
        Ok(outcome)
    }

    pub fn drag(&mut self, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Result<Outcome> {
        self.ensure_open()?;
        let outcome = self.backend.drag(start_x, start_y, end_x, end_y)?;
        self.action_count += 1;
        Ok(outcome)
    }

    pub fn scroll(&mut self, amount: i32, at: Option<Point>) -> Result<Outcome> {
        self.ensure_open()?;
        let outcome = self.backend.scroll(amount, at)?;
        self.action_count += 1;
        Ok(outcome)
    }

    // ============ Keyboard ============

    pub fn key_press(&mut self, combo: &str) -> Result<Outcome> {
        self.ensure_open()?;
        let outcome = self.backend.key_press(combo)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Key {
            input: KeyInput::Combo(combo),
            pid: None,
        });
        Ok(outcome)
    }

    pub fn type_text(&mut self, text: &str) -> Result<Outcome> {
        self.ensure_open()?;
        let outcome = self.backend.type_text(text)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Key {
            input: KeyInput::Text(text),
            pid: None,
        });
        Ok(outcome)
    }

    // ============ Background (capability-gated) ============

    fn background(
        &mut self,
        needs_input: bool,
        operation: &str,
    ) -> Result<&mut dyn BackgroundBackend> {
        self.ensure_open()?;
        let caps = self.backend.capabilities();
        let declared = if needs_input {
            caps.background_input
        } else {
            caps.background_capture
        };
        let name = caps.name.clone();
        if !declared {
            return Err(Error::unsupported(&name, operation));
        }
        self.backend
            .background()
            .ok_or_else(|| Error::unsupported(&name, operation))
    }

    /// Capture the best window of `pid` without activating it
    pub fn capture_window(&mut self, pid: i32) -> Result<CaptureResult> {
        let capture = self
            .background(false, "capture_window_by_pid")?
            .capture_window_by_pid(pid)?;
        self.action_count += 1;
        self.screenshot_count += 1;
        self.callbacks.emit(
            &self.id,
            &SessionEvent::Capture {
                capture: &capture,
                pid: Some(pid),
            },
        );
        Ok(capture)
    }

    /// Raw pixel buffer of `pid`'s window. Diagnostic only: not counted and
    /// emits no event.
    pub fn capture_window_raw(&mut self, pid: i32) -> Result<RawPixels> {
        self.background(false, "capture_window_raw")?
            .capture_window_raw(pid)
    }

    pub fn send_key_to_pid(&mut self, pid: i32, combo: &str) -> Result<Outcome<InjectionReport>> {
        let outcome = self
            .background(true, "send_key_to_pid")?
            .send_key_to_pid(pid, combo)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Key {
            input: KeyInput::Combo(combo),
            pid: Some(pid),
        });
        Ok(outcome)
    }

    /// Type into `pid`. Partial delivery is reported, not raised; use
    /// [`InjectionReport::into_result`] for a strict check.
    pub fn send_text_to_pid(&mut self, pid: i32, text: &str) -> Result<Outcome<InjectionReport>> {
        let outcome = self
            .background(true, "send_text_to_pid")?
            .send_text_to_pid(pid, text)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Key {
            input: KeyInput::Text(text),
            pid: Some(pid),
        });
        Ok(outcome)
    }

    pub fn send_click_to_pid(
        &mut self,
        pid: i32,
        at: Point,
        button: MouseButton,
    ) -> Result<Outcome> {
        let outcome = self
            .background(true, "send_click_to_pid")?
            .send_click_to_pid(pid, at, button)?;
        self.action_count += 1;
        self.emit(&SessionEvent::Click {
            at,
            button,
            clicks: 1,
            pid: Some(pid),
        });
        Ok(outcome)
    }

    // ============ Lifecycle ============

    /// Close the session. Idempotent; later primitives fail with
    /// [`Error::ClosedSession`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.callbacks.emit(
            &self.id,
            &SessionEvent::SessionClosed {
                id: &self.id,
                screenshot_dir: &self.screenshot_dir.path,
                temp_dir: &self.temp_dir.path,
            },
        );

        self.screenshot_dir.release(self.cleanup_on_close, &self.id);
        self.temp_dir.release(self.cleanup_on_close, &self.id);
        registry::release(&self.id);
        self.closed = true;

        info!(
            session = %self.id,
            actions = self.action_count,
            screenshots = self.screenshot_count,
            "Session closed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("backend", &self.backend_name())
            .field("closed", &self.closed)
            .field("owns_screenshot_dir", &self.screenshot_dir.is_owned())
            .field("owns_temp_dir", &self.temp_dir.is_owned())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
