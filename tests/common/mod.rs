//! Scriptable backend for driving sessions without a display.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskpilot::backend::{
    Backend, BackendHandle, BackendOptions, BackgroundBackend, CapabilityDescriptor,
    CaptureResult, CaptureTier, InjectionReport, MouseButton, Outcome, Point, RawPixels,
    ScreenSize, Screenshot,
};
use deskpilot::backend::storage;
use deskpilot::{Error, Result};
use image::{Rgba, RgbaImage};

/// Calls seen by a [`FakeBackend`], shared with the test
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct FakeBackend {
    handle: BackendHandle,
    capabilities: CapabilityDescriptor,
    screenshot_dir: PathBuf,
    cursor: Point,
    calls: CallLog,
    /// Primitives that fail with a driver error
    failing: Vec<&'static str>,
}

impl FakeBackend {
    pub fn new(options: BackendOptions, background: bool) -> Self {
        Self {
            handle: BackendHandle::new(Duration::ZERO),
            capabilities: CapabilityDescriptor {
                name: if background { "FakeNative" } else { "Fake" }.to_string(),
                background_capture: background,
                background_input: background,
                requires_accessibility: false,
                requires_screen_recording: false,
                platform: "test".to_string(),
                performance_multiplier: 1.0,
            },
            screenshot_dir: options.screenshot_dir,
            cursor: Point::new(11, 22),
            calls: Arc::default(),
            failing: Vec::new(),
        }
    }

    pub fn failing(mut self, primitive: &'static str) -> Self {
        self.failing.push(primitive);
        self
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }

    fn run<T>(&mut self, call: &str, value: T) -> Result<Outcome<T>> {
        let name = call.split_whitespace().next().unwrap_or(call);
        if self.failing.iter().any(|f| *f == name) {
            return Err(Error::Driver(anyhow::anyhow!("{} failed", name)));
        }
        self.calls.lock().unwrap().push(call.to_string());
        self.handle.record();
        Ok(Outcome::foreground(value, call.to_string()))
    }
}

fn image() -> RgbaImage {
    RgbaImage::from_pixel(8, 6, Rgba([40, 80, 120, 255]))
}

impl Backend for FakeBackend {
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
        let image = image();
        let saved_to = if save {
            Some(storage::save_png(&self.screenshot_dir, &image)?)
        } else {
            None
        };
        self.run(
            "screenshot",
            Screenshot {
                capture: CaptureResult::new(image, CaptureTier::Baseline),
                saved_to,
            },
        )
    }

    fn get_screen_size(&mut self) -> Result<Outcome<ScreenSize>> {
        Ok(Outcome::foreground(
            ScreenSize {
                width: 1920,
                height: 1080,
            },
            "Screen size: 1920x1080",
        ))
    }

    fn cursor_position(&mut self) -> Result<Outcome<Point>> {
        Ok(Outcome::foreground(self.cursor, "Cursor position"))
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> Result<Outcome> {
        self.run(&format!("mouse_move {} {}", x, y), ())?;
        self.cursor = Point::new(x, y);
        Ok(Outcome::foreground((), "moved"))
    }

    fn click(&mut self, button: MouseButton, at: Option<Point>) -> Result<Outcome<Point>> {
        let point = at.unwrap_or(self.cursor);
        self.run(&format!("click {} {}", button, point), point)
    }

    fn double_click(&mut self, at: Option<Point>) -> Result<Outcome<Point>> {
        let point = at.unwrap_or(self.cursor);
        self.run(&format!("double_click {}", point), point)
    }

    fn drag(&mut self, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Result<Outcome> {
        self.run(
            &format!("drag {} {} {} {}", start_x, start_y, end_x, end_y),
            (),
        )
    }

    fn scroll(&mut self, amount: i32, _at: Option<Point>) -> Result<Outcome> {
        self.run(&format!("scroll {}", amount), ())
    }

    fn key_press(&mut self, combo: &str) -> Result<Outcome> {
        self.run(&format!("key_press {}", combo), ())
    }

    fn type_text(&mut self, text: &str) -> Result<Outcome> {
        self.run(&format!("type_text {}", text), ())
    }

    fn background(&mut self) -> Option<&mut dyn BackgroundBackend> {
        if self.capabilities.background_capture || self.capabilities.background_input {
            Some(self)
        } else {
            None
        }
    }
}

impl BackgroundBackend for FakeBackend {
    fn capture_window_by_pid(&mut self, pid: i32) -> Result<CaptureResult> {
        self.run(&format!("capture_window {}", pid), ())?;
        Ok(CaptureResult::new(image(), CaptureTier::CompositorSnapshot))
    }

    fn capture_window_raw(&mut self, _pid: i32) -> Result<RawPixels> {
        Ok(RawPixels {
            width: 1,
            height: 1,
            bytes_per_row: 4,
            bits_per_pixel: 32,
            data: vec![0, 0, 0, 255],
        })
    }

    fn send_key_to_pid(&mut self, pid: i32, combo: &str) -> Result<Outcome<InjectionReport>> {
        self.run(
            &format!("send_key {} {}", pid, combo),
            InjectionReport::complete(1),
        )
    }

    fn send_text_to_pid(&mut self, pid: i32, text: &str) -> Result<Outcome<InjectionReport>> {
        let total = text.chars().count();
        let delivered = text.chars().filter(char::is_ascii).count();
        self.run(
            &format!("send_text {} {}", pid, text),
            InjectionReport::new(delivered, total),
        )
    }

    fn send_click_to_pid(&mut self, pid: i32, at: Point, button: MouseButton) -> Result<Outcome> {
        self.run(&format!("send_click {} {} {}", pid, at, button), ())
    }
}

/// Backend constructor for `SessionBuilder::build_with`
pub fn foreground(options: BackendOptions) -> Result<Box<dyn Backend>> {
    Ok(Box::new(FakeBackend::new(options, false)))
}

pub fn background(options: BackendOptions) -> Result<Box<dyn Backend>> {
    Ok(Box::new(FakeBackend::new(options, true)))
}
