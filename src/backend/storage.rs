//! Screenshot files on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Local;
use image::{ImageFormat, RgbaImage};

/// Default directory for backends created without a session
pub fn default_screenshot_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("deskpilot").join("screenshots"))
        .unwrap_or_else(|| PathBuf::from("./screenshots"))
}

/// Save `image` as `screenshot_<timestamp>.png` under `dir`.
///
/// The file is created with create-new semantics; a same-microsecond
/// collision gets a numeric suffix instead of overwriting.
pub fn save_png(dir: &Path, image: &RgbaImage) -> crate::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();

    let (path, file) = create_unique(dir, &stamp)?;
    let mut writer = BufWriter::new(file);
    if let Err(e) = image.write_to(&mut writer, ImageFormat::Png) {
        drop(writer);
        let _ = fs::remove_file(&path);
        return Err(e.into());
    }
    Ok(path)
}

fn create_unique(dir: &Path, stamp: &str) -> io::Result<(PathBuf, File)> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("screenshot_{}.png", stamp)
        } else {
            format!("screenshot_{}_{}.png", stamp, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}
