//! Foreground-only backend built on enigo (input) and xcap (capture).
//!
//! Works wherever those crates do, but every event goes to the focused
//! window and the shared cursor. The configured delay is a local pause after
//! each action; it does not order this backend against other sessions.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::input::{enigo_key, InputController};
use super::keys::{KeyCombo, KeyComboError};
use super::screenshot;
use super::storage;
use super::types::{
    preview, BackendHandle, CapabilityDescriptor, CaptureResult, CaptureTier, MouseButton, Outcome,
    Point, ScreenSize, Screenshot,
};
use super::{Backend, BackendOptions};
use crate::{Error, Result};

pub struct BaselineBackend {
    handle: BackendHandle,
    capabilities: CapabilityDescriptor,
    screenshot_dir: PathBuf,
}

impl BaselineBackend {
    pub fn new(action_delay: Duration, options: BackendOptions) -> Result<Self> {
        fs::create_dir_all(&options.screenshot_dir)?;
        Ok(Self {
            handle: BackendHandle::new(action_delay),
            capabilities: Self::descriptor(),
            screenshot_dir: options.screenshot_dir,
        })
    }

    pub fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "Baseline".to_string(),
            background_capture: false,
            background_input: false,
            requires_accessibility: true,
            requires_screen_recording: true,
            platform: "any".to_string(),
            performance_multiplier: 1.0,
        }
    }

    /// Usable right now: an input connection opens and a monitor is visible
    pub fn probe() -> bool {
        let input_ok = InputController::new().is_ok();
        let screen_ok = screenshot::monitor_count() > 0;
        debug!(input_ok, screen_ok, "Probed baseline backend");
        input_ok && screen_ok
    }

    // A fresh controller per call keeps the backend Send on every platform
    fn input(&self) -> Result<InputController> {
        Ok(InputController::new()?)
    }

    fn resolve(input: &InputController, at: Option<Point>) -> Result<Point> {
        match at {
            Some(point) => Ok(point),
            None => {
                let (x, y) = input.location()?;
                Ok(Point::new(x, y))
            }
        }
    }

    fn finish<T>(&mut self, value: T, message: String) -> Outcome<T> {
        self.handle.record();
        self.handle.pause();
        debug!(backend = "baseline", "{}", message);
        Outcome::foreground(value, message)
    }
}

impl Backend for BaselineBackend {
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
        let image = screenshot::capture_primary()?;
        let saved_to = if save {
            Some(storage::save_png(&self.screenshot_dir, &image)?)
        } else {
            None
        };

        let message = format!("Screenshot captured ({}x{})", image.width(), image.height());
        self.handle.record();
        Ok(Outcome::foreground(
            Screenshot {
                capture: CaptureResult::new(image, CaptureTier::Baseline),
                saved_to,
            },
            message,
        ))
    }

    fn get_screen_size(&mut self) -> Result<Outcome<ScreenSize>> {
        let (width, height) = match screenshot::primary_size() {
            Ok(size) => size,
            Err(e) => {
                debug!(error = %e, "Monitor query failed, asking the input driver");
                let (width, height) = self.input()?.main_display()?;
                (width.max(0) as u32, height.max(0) as u32)
            }
        };
        Ok(Outcome::foreground(
            ScreenSize { width, height },
            format!("Screen size: {}x{}", width, height),
        ))
    }

    fn cursor_position(&mut self) -> Result<Outcome<Point>> {
        let input = self.input()?;
        let point = Self::resolve(&input, None)?;
        Ok(Outcome::foreground(point, format!("Cursor position: {}", point)))
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> Result<Outcome> {
        let mut input = self.input()?;
        input.move_mouse(x, y)?;
        Ok(self.finish((), format!("Moved mouse to ({}, {})", x, y)))
    }

    fn click(&mut self, button: MouseButton, at: Option<Point>) -> Result<Outcome<Point>> {
        let mut input = self.input()?;
        let point = Self::resolve(&input, at)?;
        input.click_at(point.x, point.y, button)?;
        let message = format!("{} click at {}", capitalize(button.as_str()), point);
        Ok(self.finish(point, message))
    }

    fn double_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        let mut input = self.input()?;
        let point = Self::resolve(&input, at)?;
        input.double_click_at(point.x, point.y)?;
        Ok(self.finish(point, format!("Double click at {}", point)))
    }

    fn drag(&mut self, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Result<Outcome> {
        let mut input = self.input()?;
        input.drag(start_x, start_y, end_x, end_y)?;
        Ok(self.finish(
            (),
            format!(
                "Dragged from ({}, {}) to ({}, {})",
                start_x, start_y, end_x, end_y
            ),
        ))
    }

    fn scroll(&mut self, amount: i32, at: Option<Point>) -> Result<Outcome> {
        let mut input = self.input()?;
        if let Some(point) = at {
            input.move_mouse(point.x, point.y)?;
        }
        input.scroll(amount)?;
        Ok(self.finish((), format!("Scrolled {} clicks", amount)))
    }

    fn key_press(&mut self, combo: &str) -> Result<Outcome> {
        let parsed: KeyCombo = combo.parse().map_err(|e| Error::invalid_combo(combo, e))?;
        if enigo_key(parsed.key()).is_none() {
            return Err(Error::invalid_combo(
                combo,
                KeyComboError::UnknownKey(parsed.key().to_string()),
            ));
        }

        let mut input = self.input()?;
        input.key_combo(&parsed)?;
        Ok(self.finish((), format!("Pressed key(s): {}", combo)))
    }

    fn type_text(&mut self, text: &str) -> Result<Outcome> {
        let mut input = self.input()?;
        input.type_text(text)?;
        Ok(self.finish((), format!("Typed text: {}", preview(text))))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
