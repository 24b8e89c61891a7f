//! Native backend: platform event posting with per-process delivery and a
//! tiered window-capture chain.
//!
//! All platform calls go through [`NativePlatform`]. A failed native call
//! (a [`NativeError`]) never escapes: the equivalent baseline primitive runs
//! instead and the outcome is tagged
//! [`ExecutionPath::Fallback`](crate::backend::ExecutionPath::Fallback).
//!
//! A multi-event sequence can fail part way. Anything it pressed is released
//! first, then the baseline replays the whole action, so the part that was
//! already delivered (a mouse move, a completed click) may happen twice.

pub mod capture;
pub mod inject;
pub mod keymap;
mod platform;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, warn};

pub use inject::{EventTarget, InputEvent, ModifierFlags};

use super::baseline::BaselineBackend;
use super::factory;
use super::storage;
use super::types::{
    preview, BackendHandle, CapabilityDescriptor, CaptureResult, CaptureTier, InjectionReport,
    MouseButton, Outcome, Point, RawPixels, ScreenSize, Screenshot,
};
use super::{Backend, BackendOptions, BackgroundBackend};
use crate::{Error, Result};

/// Failure of a single native call.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Native platform unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to create {0} event")]
    EventCreation(&'static str),

    #[error("No image produced for window {0}")]
    NoImage(u32),

    /// A handle was produced but its pixels cannot be rendered
    #[error("Window {0} image could not be rendered")]
    Unserializable(u32),

    #[error("Unsupported pixel layout ({bits_per_pixel} bits per pixel)")]
    PixelLayout { bits_per_pixel: usize },

    #[error("Capture command failed: {0}")]
    Command(String),

    #[error("No window found for pid {0}")]
    NoWindow(i32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// One failed capture attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
    pub tier: CaptureTier,
    pub error: String,
}

impl TierFailure {
    pub fn new(tier: CaptureTier, error: &NativeError) -> Self {
        Self {
            tier,
            error: error.to_string(),
        }
    }
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.error)
    }
}

/// On-screen window as reported by the window server
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    pub id: u32,
    pub owner_pid: i32,
    /// 0 for normal application windows
    pub layer: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub title: String,
}

impl WindowRecord {
    pub fn is_normal(&self) -> bool {
        self.layer == 0
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Platform primitives the native backend is built on.
pub trait NativePlatform: Send {
    /// Main display size in points
    fn display_size(&self) -> NativeResult<(u32, u32)>;

    fn capture_display(&self) -> NativeResult<RgbaImage>;

    fn windows(&self) -> NativeResult<Vec<WindowRecord>>;

    /// Tier 1: compositor snapshot rendered into an RGBA bitmap
    fn snapshot_window(&self, window: &WindowRecord) -> NativeResult<RgbaImage>;

    /// Tier 2: have the OS capture tool write the window to `path` as PNG
    fn capture_window_to_file(
        &self,
        window: &WindowRecord,
        path: &Path,
    ) -> NativeResult<()>;

    /// Tier 3: raw pixel buffer, no encoding
    fn window_pixels(&self, window: &WindowRecord) -> NativeResult<RawPixels>;

    fn cursor_location(&self) -> NativeResult<Point>;

    fn post(&self, event: &InputEvent, target: EventTarget) -> NativeResult<()>;
}

pub struct NativeBackend {
    handle: BackendHandle,
    capabilities: CapabilityDescriptor,
    screenshot_dir: PathBuf,
    platform: Box<dyn NativePlatform>,
    /// Runs a primitive when the native call fails; keeps its own counter
    fallback: Box<dyn Backend>,
}

impl NativeBackend {
    pub fn new(action_delay: Duration, options: BackendOptions) -> Result<Self> {
        let platform = platform::system().ok_or_else(|| {
            Error::configuration(
                "Native backend requires macOS with an event source and a main display",
                &factory::list_available(),
            )
        })?;
        // Zero delay: the native backend already pauses once per action
        let fallback = BaselineBackend::new(Duration::ZERO, options.clone())?;
        Self::with_platform(platform, Box::new(fallback), action_delay, options)
    }

    /// Build on an explicit platform and fallback backend
    pub fn with_platform(
        platform: Box<dyn NativePlatform>,
        fallback: Box<dyn Backend>,
        action_delay: Duration,
        options: BackendOptions,
    ) -> Result<Self> {
        fs::create_dir_all(&options.screenshot_dir)?;
        Ok(Self {
            handle: BackendHandle::new(action_delay),
            capabilities: Self::descriptor(),
            screenshot_dir: options.screenshot_dir,
            platform,
            fallback,
        })
    }

    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "Native".to_string(),
            background_capture: true,
            background_input: true,
            requires_accessibility: true,
            requires_screen_recording: true,
            platform: "macOS".to_string(),
            performance_multiplier: 20.0,
        }
    }

    pub fn probe() -> bool {
        platform::probe()
    }

    fn finish<T>(&mut self, value: T, message: String) -> Outcome<T> {
        self.handle.record();
        self.handle.pause();
        debug!(backend = "native", "{}", message);
        Outcome::native(value, message)
    }

    /// Account for an action the fallback backend performed
    fn recover<T>(&mut self, outcome: Outcome<T>, cause: &NativeError) -> Outcome<T> {
        warn!(error = %cause, "Native call failed, used baseline: {}", outcome.message);
        self.handle.record();
        self.handle.pause();
        outcome.into_fallback(cause)
    }

    fn post(&self, events: &[InputEvent], target: EventTarget) -> NativeResult<()> {
        inject::post_all(self.platform.as_ref(), events, target)
    }

    fn resolve(&mut self, at: Option<Point>) -> Result<Point> {
        if let Some(point) = at {
            return Ok(point);
        }
        match self.platform.cursor_location() {
            Ok(point) => Ok(point),
            Err(e) => {
                debug!(error = %e, "Native cursor query failed");
                Ok(self.fallback.cursor_position()?.value)
            }
        }
    }
}

impl Backend for NativeBackend {
    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.capabilities
    }

    fn handle(&self) -> &BackendHandle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut BackendHandle {
        &mut self.handle
    }

    fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir
    }

    fn screenshot(&mut self, save: bool) -> Result<Outcome<Screenshot>> {
        let image = match self.platform.capture_display() {
            Ok(image) => image,
            Err(e) => {
                let outcome = self.fallback.screenshot(save)?;
                warn!(error = %e, "Native display capture failed, used baseline");
                self.handle.record();
                return Ok(outcome.into_fallback(&e));
            }
        };

        let saved_to = if save {
            Some(storage::save_png(&self.screenshot_dir, &image)?)
        } else {
            None
        };
        let message = format!("Screenshot captured ({}x{})", image.width(), image.height());
        self.handle.record();
        Ok(Outcome::native(
            Screenshot {
                capture: CaptureResult::new(image, CaptureTier::Screen),
                saved_to,
            },
            message,
        ))
    }

    fn get_screen_size(&mut self) -> Result<Outcome<ScreenSize>> {
        match self.platform.display_size() {
            Ok((width, height)) => Ok(Outcome::native(
                ScreenSize { width, height },
                format!("Screen size: {}x{}", width, height),
            )),
            Err(e) => Ok(self.fallback.get_screen_size()?.into_fallback(&e)),
        }
    }

    fn cursor_position(&mut self) -> Result<Outcome<Point>> {
        match self.platform.cursor_location() {
            Ok(point) => Ok(Outcome::native(point, format!("Cursor position: {}", point))),
            Err(e) => Ok(self.fallback.cursor_position()?.into_fallback(&e)),
        }
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> Result<Outcome> {
        let event = InputEvent::MouseMove {
            at: Point::new(x, y),
        };
        match self.post(&[event], EventTarget::Global) {
            Ok(()) => Ok(self.finish((), format!("Moved mouse to ({}, {})", x, y))),
            Err(e) => {
                let outcome = self.fallback.mouse_move(x, y)?;
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn click(&mut self, button: MouseButton, at: Option<Point>) -> Result<Outcome<Point>> {
        let point = self.resolve(at)?;
        let events = inject::click_events(point, button, 1);
        match self.post(&events, EventTarget::Global) {
            Ok(()) => Ok(self.finish(point, format!("{} click at {}", button, point))),
            Err(e) => {
                let outcome = self.fallback.click(button, Some(point))?;
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn double_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        let point = self.resolve(at)?;
        let events = inject::click_events(point, MouseButton::Left, 2);
        match self.post(&events, EventTarget::Global) {
            Ok(()) => Ok(self.finish(point, format!("Double click at {}", point))),
            Err(e) => {
                let outcome = self.fallback.double_click(Some(point))?;
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn drag(&mut self, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Result<Outcome> {
        let events = inject::drag_events(Point::new(start_x, start_y), Point::new(end_x, end_y));
        let message = format!(
            "Dragged from ({}, {}) to ({}, {})",
            start_x, start_y, end_x, end_y
        );
        match self.post(&events, EventTarget::Global) {
            Ok(()) => Ok(self.finish((), message)),
            Err(e) => {
                let outcome = self.fallback.drag(start_x, start_y, end_x, end_y)?;
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn scroll(&mut self, amount: i32, at: Option<Point>) -> Result<Outcome> {
        let mut events = Vec::with_capacity(2);
        if let Some(point) = at {
            events.push(InputEvent::MouseMove { at: point });
        }
        events.push(InputEvent::Scroll { amount });
        match self.post(&events, EventTarget::Global) {
            Ok(()) => Ok(self.finish((), format!("Scrolled {} clicks", amount))),
            Err(e) => {
                let outcome = self.fallback.scroll(amount, at)?;
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn key_press(&mut self, combo: &str) -> Result<Outcome> {
        let events = inject::key_events(combo)?;
        match self.post(&events, EventTarget::Global) {
            Ok(()) => Ok(self.finish((), format!("Pressed key(s): {}", combo))),
            Err(e) => {
                let outcome = self.fallback.key_press(combo)?;
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn type_text(&mut self, text: &str) -> Result<Outcome> {
        let event = InputEvent::Text {
            text: text.to_string(),
        };
        match self.post(&[event], EventTarget::Global) {
            Ok(()) => Ok(self.finish((), format!("Typed text: {}", preview(text)))),
            Err(e) => {
                let outcome = self.fallback.type_text(text)?;
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn background(&mut self) -> Option<&mut dyn BackgroundBackend> {
        Some(self)
    }
}

impl BackgroundBackend for NativeBackend {
    fn capture_window_by_pid(&mut self, pid: i32) -> Result<CaptureResult> {
        let result = capture::capture_window(self.platform.as_ref(), pid)?;
        self.handle.record();
        debug!(pid, tier = %result.tier, "Captured window");
        Ok(result)
    }

    fn capture_window_raw(&mut self, pid: i32) -> Result<RawPixels> {
        capture::capture_window_raw(self.platform.as_ref(), pid)
    }

    fn send_key_to_pid(&mut self, pid: i32, combo: &str) -> Result<Outcome<InjectionReport>> {
        let events = inject::key_events(combo)?;
        match self.post(&events, EventTarget::Process(pid)) {
            Ok(()) => Ok(self.finish(
                InjectionReport::complete(1),
                format!("Sent key(s) {} to pid {}", combo, pid),
            )),
            Err(e) => {
                let outcome = self.fallback.key_press(combo)?;
                let outcome = outcome.map(|_| InjectionReport::complete(1));
                Ok(self.recover(outcome, &e))
            }
        }
    }

    fn send_text_to_pid(&mut self, pid: i32, text: &str) -> Result<Outcome<InjectionReport>> {
        let report = inject::type_to_process(self.platform.as_ref(), pid, text);
        Ok(self.finish(
            report,
            format!(
                "Typed {} characters to pid {}: {}",
                report,
                pid,
                preview(text)
            ),
        ))
    }

    fn send_click_to_pid(&mut self, pid: i32, at: Point, button: MouseButton) -> Result<Outcome> {
        let events = inject::click_events(at, button, 1);
        match self.post(&events, EventTarget::Process(pid)) {
            Ok(()) => Ok(self.finish((), format!("{} click at {} in pid {}", button, at, pid))),
            Err(e) => {
                let outcome = self.fallback.click(button, Some(at))?.map(|_| ());
                Ok(self.recover(outcome, &e))
            }
        }
    }
}

impl fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBackend")
            .field("capabilities", &self.capabilities.name)
            .field("action_count", &self.handle.action_count())
            .field("screenshot_dir", &self.screenshot_dir)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable platform and recording fallback for unit tests

    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    pub struct Script {
        pub windows: Vec<WindowRecord>,
        pub snapshot: Option<fn(u32) -> NativeResult<RgbaImage>>,
        pub file_capture_ok: bool,
        pub pixels_ok: bool,
        pub post_fails: bool,
        /// Keycodes whose posts fail
        pub reject_keycodes: Vec<u16>,
        /// Zero-based post attempt that fails
        pub fail_at: Option<usize>,
        pub display_fails: bool,
        pub attempts: usize,
        pub posted: Vec<(InputEvent, EventTarget)>,
        pub file_captures: usize,
        pub snapshots: Vec<u32>,
    }

    #[derive(Clone, Default)]
    pub struct FakePlatform(pub Arc<Mutex<Script>>);

    impl FakePlatform {
        pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            self.0.lock().unwrap()
        }
    }

    fn solid(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]))
    }

    impl NativePlatform for FakePlatform {
        fn display_size(&self) -> NativeResult<(u32, u32)> {
            Ok((1440, 900))
        }

        fn capture_display(&self) -> NativeResult<RgbaImage> {
            if self.script().display_fails {
                Err(NativeError::Unavailable("display stream denied".into()))
            } else {
                Ok(solid(4, 3))
            }
        }

        fn windows(&self) -> NativeResult<Vec<WindowRecord>> {
            Ok(self.script().windows.clone())
        }

        fn snapshot_window(
            &self,
            window: &WindowRecord,
        ) -> NativeResult<RgbaImage> {
            let mut script = self.script();
            script.snapshots.push(window.id);
            match script.snapshot {
                Some(snapshot) => snapshot(window.id),
                None => Ok(solid(2, 2)),
            }
        }

        fn capture_window_to_file(
            &self,
            _window: &WindowRecord,
            path: &Path,
        ) -> NativeResult<()> {
            let mut script = self.script();
            script.file_captures += 1;
            if script.file_capture_ok {
                solid(5, 5).save(path)?;
                Ok(())
            } else {
                Err(NativeError::Command("screencapture exited with status 1".into()))
            }
        }

        fn window_pixels(
            &self,
            window: &WindowRecord,
        ) -> NativeResult<RawPixels> {
            if self.script().pixels_ok {
                Ok(RawPixels {
                    width: 1,
                    height: 1,
                    bytes_per_row: 4,
                    bits_per_pixel: 32,
                    data: vec![30, 20, 10, 255],
                })
            } else {
                Err(NativeError::NoImage(window.id))
            }
        }

        fn cursor_location(&self) -> NativeResult<Point> {
            Ok(Point::new(7, 8))
        }

        fn post(
            &self,
            event: &InputEvent,
            target: EventTarget,
        ) -> NativeResult<()> {
            let mut script = self.script();
            let attempt = script.attempts;
            script.attempts += 1;
            if script.post_fails || script.fail_at == Some(attempt) {
                return Err(NativeError::EventCreation("keyboard"));
            }
            if let InputEvent::KeyDown { keycode, .. } = event {
                if script.reject_keycodes.contains(keycode) {
                    return Err(NativeError::EventCreation("keyboard"));
                }
            }
            script.posted.push((event.clone(), target));
            Ok(())
        }
    }

    /// Fallback that records which primitives ran
    pub struct RecordingBackend {
        handle: BackendHandle,
        capabilities: CapabilityDescriptor,
        dir: PathBuf,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingBackend {
        pub fn new(dir: &Path) -> Self {
            Self {
                handle: BackendHandle::new(Duration::ZERO),
                capabilities: BaselineBackend::descriptor(),
                dir: dir.to_path_buf(),
                calls: Arc::default(),
            }
        }

        fn log<T>(&mut self, call: &str, value: T) -> Result<Outcome<T>> {
            self.calls.lock().unwrap().push(call.to_string());
            self.handle.record();
            Ok(Outcome::foreground(value, call.to_string()))
        }
    }

    impl Backend for RecordingBackend {
        fn capabilities(&self) -> &CapabilityDescriptor {
            &self.capabilities
        }
        fn handle(&self) -> &BackendHandle {
            &self.handle
        }
        fn handle_mut(&mut self) -> &mut BackendHandle {
            &mut self.handle
        }
        fn screenshot_dir(&self) -> &Path {
            &self.dir
        }
        fn screenshot(&mut self, _save: bool) -> Result<Outcome<Screenshot>> {
            let shot = Screenshot {
                capture: CaptureResult::new(solid(1, 1), CaptureTier::Baseline),
                saved_to: None,
            };
            self.log("screenshot", shot)
        }
        fn get_screen_size(&mut self) -> Result<Outcome<ScreenSize>> {
            self.log("get_screen_size", ScreenSize { width: 1, height: 1 })
        }
        fn cursor_position(&mut self) -> Result<Outcome<Point>> {
            self.log("cursor_position", Point::new(0, 0))
        }
        fn mouse_move(&mut self, x: i32, y: i32) -> Result<Outcome> {
            self.log(&format!("mouse_move {} {}", x, y), ())
        }
        fn click(&mut self, button: MouseButton, at: Option<Point>) -> Result<Outcome<Point>> {
            let point = at.unwrap_or(Point::new(0, 0));
            self.log(&format!("click {} {}", button, point), point)
        }
        fn double_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
            let point = at.unwrap_or(Point::new(0, 0));
            self.log("double_click", point)
        }
        fn drag(&mut self, _: i32, _: i32, _: i32, _: i32) -> Result<Outcome> {
            self.log("drag", ())
        }
        fn scroll(&mut self, amount: i32, _at: Option<Point>) -> Result<Outcome> {
            self.log(&format!("scroll {}", amount), ())
        }
        fn key_press(&mut self, combo: &str) -> Result<Outcome> {
            self.log(&format!("key_press {}", combo), ())
        }
        fn type_text(&mut self, text: &str) -> Result<Outcome> {
            self.log(&format!("type_text {}", text), ())
        }
    }

    pub fn window(id: u32, pid: i32, layer: i32, width: f64, height: f64) -> WindowRecord {
        WindowRecord {
            id,
            owner_pid: pid,
            layer,
            x: 0.0,
            y: 0.0,
            width,
            height,
            title: format!("window {}", id),
        }
    }

    pub fn backend(
        fake: &FakePlatform,
        dir: &Path,
    ) -> (NativeBackend, Arc<Mutex<Vec<String>>>) {
        let fallback = RecordingBackend::new(dir);
        let calls = fallback.calls.clone();
        let backend = NativeBackend::with_platform(
            Box::new(fake.clone()),
            Box::new(fallback),
            Duration::ZERO,
            BackendOptions {
                screenshot_dir: dir.to_path_buf(),
            },
        )
        .unwrap();
        (backend, calls)
    }
}
