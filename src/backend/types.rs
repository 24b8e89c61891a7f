use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Static description of what a backend can do and what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    /// Can capture windows without activating them
    pub background_capture: bool,
    /// Can deliver input to a process without changing focus
    pub background_input: bool,
    pub requires_accessibility: bool,
    pub requires_screen_recording: bool,
    pub platform: String,
    /// Approximate speed relative to the baseline backend (1.0)
    pub performance_multiplier: f64,
}

/// Per-backend pacing and bookkeeping.
///
/// Every counted primitive calls [`BackendHandle::record`] once and
/// [`BackendHandle::pause`] once it has finished.
#[derive(Debug, Clone)]
pub struct BackendHandle {
    action_delay: Duration,
    action_count: u64,
}

impl BackendHandle {
    pub fn new(action_delay: Duration) -> Self {
        Self {
            action_delay,
            action_count: 0,
        }
    }

    pub fn action_delay(&self) -> Duration {
        self.action_delay
    }

    pub fn action_count(&self) -> u64 {
        self.action_count
    }

    pub fn reset(&mut self) {
        self.action_count = 0;
    }

    pub fn record(&mut self) {
        self.action_count += 1;
    }

    /// Local pause after an action. Does not coordinate with other sessions.
    pub fn pause(&self) {
        if !self.action_delay.is_zero() {
            thread::sleep(self.action_delay);
        }
    }
}

/// Which path actually executed a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Foreground-only backend doing its normal work
    Foreground,
    /// Native fast path
    Native,
    /// Native path failed and the baseline primitive ran instead
    Fallback,
}

pub const FALLBACK_TAG: &str = "[Fallback]";

/// Result of a primitive: the value plus a human-readable, path-tagged message.
#[derive(Debug, Clone)]
pub struct Outcome<T = ()> {
    pub value: T,
    pub message: String,
    pub path: ExecutionPath,
}

impl<T> Outcome<T> {
    pub fn foreground(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
            path: ExecutionPath::Foreground,
        }
    }

    pub fn native(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
            path: ExecutionPath::Native,
        }
    }

    /// Re-tag an outcome produced by the baseline after a native failure.
    pub fn into_fallback(self, cause: &dyn fmt::Display) -> Self {
        Self {
            value: self.value,
            message: format!("{} {}: {}", FALLBACK_TAG, self.message, cause),
            path: ExecutionPath::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.path == ExecutionPath::Fallback
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            message: self.message,
            path: self.path,
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Mouse button types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(format!("Unknown button: {}", other)),
        }
    }
}

/// How an image was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTier {
    /// Native whole-display capture
    Screen,
    /// Tier 1: compositor snapshot of a single window
    CompositorSnapshot,
    /// Tier 2: OS screen-capture command writing a temporary file
    CommandLine,
    /// Tier 3: raw pixel buffer, no encoding step
    RawPixels,
    /// Baseline backend screenshot
    Baseline,
}

impl fmt::Display for CaptureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureTier::Screen => "screen",
            CaptureTier::CompositorSnapshot => "compositor snapshot",
            CaptureTier::CommandLine => "command line",
            CaptureTier::RawPixels => "raw pixels",
            CaptureTier::Baseline => "baseline",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub image: RgbaImage,
    pub tier: CaptureTier,
}

impl CaptureResult {
    pub fn new(image: RgbaImage, tier: CaptureTier) -> Self {
        Self { image, tier }
    }
}

/// Untouched pixel buffer of a window, for diagnostics.
#[derive(Debug, Clone)]
pub struct RawPixels {
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
    pub bits_per_pixel: usize,
    pub data: Vec<u8>,
}

impl RawPixels {
    /// Interpret the buffer as 32-bit BGRA rows (the common macOS layout).
    pub fn to_rgba(&self) -> Option<RgbaImage> {
        if self.bits_per_pixel != 32 || self.data.is_empty() {
            return None;
        }
        let mut rgba = Vec::with_capacity(self.width * self.height * 4);
        for y in 0..self.height {
            let row_start = y * self.bytes_per_row;
            for x in 0..self.width {
                let px = row_start + x * 4;
                let pixel = self.data.get(px..px + 4)?;
                rgba.extend_from_slice(&[pixel[2], pixel[1], pixel[0], pixel[3]]);
            }
        }
        RgbaImage::from_raw(self.width as u32, self.height as u32, rgba)
    }
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub capture: CaptureResult,
    pub saved_to: Option<PathBuf>,
}

impl Screenshot {
    pub fn image(&self) -> &RgbaImage {
        &self.capture.image
    }

    pub fn to_base64_png(&self) -> anyhow::Result<String> {
        super::screenshot::png_base64(&self.capture.image)
    }
}

/// Delivery report for multi-event background injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionReport {
    pub delivered: usize,
    pub total: usize,
}

impl InjectionReport {
    pub fn new(delivered: usize, total: usize) -> Self {
        Self { delivered, total }
    }

    pub fn complete(total: usize) -> Self {
        Self::new(total, total)
    }

    pub fn is_complete(&self) -> bool {
        self.delivered == self.total
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.delivered as f64 / self.total as f64
        }
    }

    /// Strict view: anything short of full delivery becomes an error.
    pub fn into_result(self) -> crate::Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(crate::Error::PartialInjection {
                delivered: self.delivered,
                total: self.total,
            })
        }
    }
}

impl fmt::Display for InjectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.delivered, self.total)
    }
}

pub(crate) fn preview(text: &str) -> String {
    const LIMIT: usize = 50;
    if text.chars().count() > LIMIT {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}
