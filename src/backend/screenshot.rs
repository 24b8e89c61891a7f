//! Whole-screen capture through xcap, plus PNG/base64 encoding of captures.

use std::io::Cursor;

use anyhow::Context;
use base64::Engine;
use image::{ImageFormat, RgbaImage};
use xcap::Monitor;

fn monitors() -> anyhow::Result<Vec<Monitor>> {
    Monitor::all().map_err(|e| anyhow::anyhow!("Failed to get monitors: {}", e))
}

/// The flagged primary entry, else the first one. Some compositors flag none.
fn pick_primary<T>(items: Vec<T>, is_primary: impl Fn(&T) -> bool) -> Option<T> {
    let index = items.iter().position(is_primary).unwrap_or(0);
    items.into_iter().nth(index)
}

fn primary_monitor() -> anyhow::Result<Monitor> {
    pick_primary(monitors()?, Monitor::is_primary).context("No monitor found")
}

/// Capture the primary monitor
pub fn capture_primary() -> anyhow::Result<RgbaImage> {
    primary_monitor()?
        .capture_image()
        .map_err(|e| anyhow::anyhow!("Failed to capture screen: {}", e))
}

/// Primary monitor size in pixels
pub fn primary_size() -> anyhow::Result<(u32, u32)> {
    let monitor = primary_monitor()?;
    Ok((monitor.width(), monitor.height()))
}

/// Number of monitors visible right now; 0 when enumeration fails
pub fn monitor_count() -> usize {
    monitors().map(|all| all.len()).unwrap_or(0)
}

/// PNG bytes of `image`, base64 encoded (standard alphabet)
pub fn png_base64(image: &RgbaImage) -> anyhow::Result<String> {
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png.into_inner()))
}
