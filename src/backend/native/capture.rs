//! Window-scoped capture with tier fallback.
//!
//! 1. compositor snapshot rendered to RGBA
//! 2. OS capture command into a temporary PNG, only after tier 1 produced an
//!    image it could not render
//! 3. raw pixel buffer without any encoding step

use std::cmp::Ordering;

use image::RgbaImage;
use tracing::{debug, warn};

use super::{NativeError, NativePlatform, NativeResult, TierFailure, WindowRecord};
use crate::backend::types::{CaptureResult, CaptureTier, RawPixels};
use crate::{Error, Result};

/// Windows owned by `pid`, best first: normal layer, then larger area.
pub fn rank_windows(windows: Vec<WindowRecord>, pid: i32) -> Vec<WindowRecord> {
    let mut owned: Vec<WindowRecord> = windows
        .into_iter()
        .filter(|w| w.owner_pid == pid)
        .collect();
    owned.sort_by(|a, b| {
        b.is_normal()
            .cmp(&a.is_normal())
            .then_with(|| b.area().partial_cmp(&a.area()).unwrap_or(Ordering::Equal))
    });
    owned
}

pub fn select_window(platform: &dyn NativePlatform, pid: i32) -> NativeResult<WindowRecord> {
    rank_windows(platform.windows()?, pid)
        .into_iter()
        .next()
        .ok_or(NativeError::NoWindow(pid))
}

pub fn capture_window(platform: &dyn NativePlatform, pid: i32) -> Result<CaptureResult> {
    let mut attempts = Vec::new();

    let window = match select_window(platform, pid) {
        Ok(window) => window,
        Err(e) => {
            attempts.push(TierFailure::new(CaptureTier::CompositorSnapshot, &e));
            return Err(Error::CaptureFailure { pid, attempts });
        }
    };
    debug!(pid, window = window.id, title = %window.title, "Selected window");

    match platform.snapshot_window(&window) {
        Ok(image) => return Ok(CaptureResult::new(image, CaptureTier::CompositorSnapshot)),
        Err(e) => {
            warn!(pid, window = window.id, error = %e, "Compositor snapshot failed");
            let unserializable = matches!(e, NativeError::Unserializable(_));
            attempts.push(TierFailure::new(CaptureTier::CompositorSnapshot, &e));

            if unserializable {
                match capture_via_file(platform, &window) {
                    Ok(image) => return Ok(CaptureResult::new(image, CaptureTier::CommandLine)),
                    Err(e) => {
                        warn!(pid, window = window.id, error = %e, "Capture command failed");
                        attempts.push(TierFailure::new(CaptureTier::CommandLine, &e));
                    }
                }
            }
        }
    }

    match raw_rgba(platform, &window) {
        Ok(image) => Ok(CaptureResult::new(image, CaptureTier::RawPixels)),
        Err(e) => {
            warn!(pid, window = window.id, error = %e, "Raw pixel capture failed");
            attempts.push(TierFailure::new(CaptureTier::RawPixels, &e));
            Err(Error::CaptureFailure { pid, attempts })
        }
    }
}

/// Tier 3 on its own, returning the untouched buffer.
pub fn capture_window_raw(platform: &dyn NativePlatform, pid: i32) -> Result<RawPixels> {
    select_window(platform, pid)
        .and_then(|window| platform.window_pixels(&window))
        .map_err(|e| Error::CaptureFailure {
            pid,
            attempts: vec![TierFailure::new(CaptureTier::RawPixels, &e)],
        })
}

fn capture_via_file(platform: &dyn NativePlatform, window: &WindowRecord) -> NativeResult<RgbaImage> {
    // Removed when `file` drops, whichever way this returns
    let file = tempfile::Builder::new()
        .prefix("deskpilot_window_")
        .suffix(".png")
        .tempfile()?;
    platform.capture_window_to_file(window, file.path())?;
    Ok(image::open(file.path())?.to_rgba8())
}

fn raw_rgba(platform: &dyn NativePlatform, window: &WindowRecord) -> NativeResult<RgbaImage> {
    let raw = platform.window_pixels(window)?;
    raw.to_rgba().ok_or(NativeError::PixelLayout {
        bits_per_pixel: raw.bits_per_pixel,
    })
}
