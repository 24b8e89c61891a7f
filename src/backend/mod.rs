//! Backend contract
//!
//! Every way of driving the desktop implements [`Backend`]. Callers branch on
//! the flags of [`Backend::capabilities`], never on which backend they hold.
//!
//! ## Backends
//!
//! - [`BaselineBackend`] - enigo + xcap, foreground only, any platform
//! - [`NativeBackend`] - platform event posting and window capture, with
//!   background (per-process) delivery and a tiered capture chain
//!
//! Background operations live behind [`Backend::background`], which returns
//! `None` for backends that have no such capability.
//!
//! ## Example
//!
//! ```rust,ignore
//! use deskpilot::backend::{factory, BackendOptions, Point};
//!
//! let mut backend = factory::create("auto", Duration::from_millis(200), BackendOptions::default())?;
//! backend.left_click(Some(Point::new(100, 200)))?;
//! if backend.capabilities().background_input {
//!     if let Some(bg) = backend.background() {
//!         bg.send_key_to_pid(pid, "command+s")?;
//!     }
//! }
//! ```

pub mod baseline;
pub mod factory;
pub mod input;
pub mod keys;
pub mod native;
pub mod screenshot;
pub mod storage;
pub mod types;

use std::path::{Path, PathBuf};

use crate::Result;

pub use baseline::BaselineBackend;
pub use factory::BackendKind;
pub use keys::{KeyCombo, KeyComboError, Modifier};
pub use native::NativeBackend;
pub use types::{
    BackendHandle, CapabilityDescriptor, CaptureResult, CaptureTier, ExecutionPath,
    InjectionReport, MouseButton, Outcome, Point, RawPixels, ScreenSize, Screenshot,
};

/// Construction options shared by all backends
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Where `screenshot(save = true)` writes its files
    pub screenshot_dir: PathBuf,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            screenshot_dir: storage::default_screenshot_dir(),
        }
    }
}

/// Shared operation interface of every backend
pub trait Backend: Send {
    fn capabilities(&self) -> &CapabilityDescriptor;

    fn handle(&self) -> &BackendHandle;

    fn handle_mut(&mut self) -> &mut BackendHandle;

    fn screenshot_dir(&self) -> &Path;

    /// Number of actions this backend performed
    fn action_count(&self) -> u64 {
        self.handle().action_count()
    }

    fn reset_action_count(&mut self) {
        self.handle_mut().reset()
    }

    // ============ Screen ============

    /// Capture the whole screen, optionally saving it under [`Backend::screenshot_dir`]
    fn screenshot(&mut self, save: bool) -> Result<Outcome<Screenshot>>;

    fn get_screen_size(&mut self) -> Result<Outcome<ScreenSize>>;

    // ============ Mouse ============

    fn cursor_position(&mut self) -> Result<Outcome<Point>>;

    fn mouse_move(&mut self, x: i32, y: i32) -> Result<Outcome>;

    /// Click `button` at `at`, or at the current position when `None`.
    /// The outcome carries the point actually clicked.
    fn click(&mut self, button: MouseButton, at: Option<Point>) -> Result<Outcome<Point>>;

    fn left_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        self.click(MouseButton::Left, at)
    }

    fn right_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        self.click(MouseButton::Right, at)
    }

    fn middle_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        self.click(MouseButton::Middle, at)
    }

    fn double_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>>;

    fn drag(&mut self, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Result<Outcome>;

    /// Scroll by `amount` wheel clicks (positive = up), at `at` if given
    fn scroll(&mut self, amount: i32, at: Option<Point>) -> Result<Outcome>;

    // ============ Keyboard ============

    /// Press a key or combination such as `"return"` or `"command+shift+s"`
    fn key_press(&mut self, combo: &str) -> Result<Outcome>;

    fn type_text(&mut self, text: &str) -> Result<Outcome>;

    // ============ Optional ============

    /// Background operations, present only when the descriptor declares
    /// `background_capture` or `background_input`
    fn background(&mut self) -> Option<&mut dyn BackgroundBackend> {
        None
    }
}

/// Operations that target a process instead of the focused window
pub trait BackgroundBackend {
    /// Capture the best window owned by `pid` without activating it
    fn capture_window_by_pid(&mut self, pid: i32) -> Result<CaptureResult>;

    /// Raw pixel dump of the best window owned by `pid`, for diagnostics
    fn capture_window_raw(&mut self, pid: i32) -> Result<RawPixels>;

    /// Deliver one key combination to `pid`
    fn send_key_to_pid(&mut self, pid: i32, combo: &str) -> Result<Outcome<InjectionReport>>;

    /// Deliver text to `pid` one character at a time
    fn send_text_to_pid(&mut self, pid: i32, text: &str) -> Result<Outcome<InjectionReport>>;

    fn send_click_to_pid(&mut self, pid: i32, at: Point, button: MouseButton) -> Result<Outcome>;
}
