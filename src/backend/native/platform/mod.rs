//! Concrete [`NativePlatform`] for the running OS.

#[cfg(target_os = "macos")]
mod macos;

use tracing::debug;

use super::NativePlatform;

/// The platform for this OS, if it can post events and sees a display.
pub fn system() -> Option<Box<dyn NativePlatform>> {
    #[cfg(target_os = "macos")]
    {
        match macos::MacPlatform::new() {
            Ok(platform) => Some(Box::new(platform)),
            Err(e) => {
                debug!(error = %e, "macOS platform unavailable");
                None
            }
        }
    }

    #[cfg(not(target_os = "macos"))]
    {
        debug!(os = std::env::consts::OS, "No native platform for this OS");
        None
    }
}

pub fn probe() -> bool {
    system().is_some()
}
