use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_ACTION_DELAY: Duration = Duration::from_millis(500);

/// Session defaults read from the environment.
///
/// | Variable | Default |
/// |---|---|
/// | `DESKPILOT_BACKEND` | auto |
/// | `DESKPILOT_ACTION_DELAY_MS` | 500 |
/// | `DESKPILOT_SCREENSHOT_DIR` | isolated temp dir |
/// | `DESKPILOT_TEMP_DIR` | isolated temp dir |
/// | `DESKPILOT_CLEANUP_ON_CLOSE` | true |
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationConfig {
    /// `None` means auto-select
    pub backend: Option<String>,
    pub action_delay: Duration,
    pub screenshot_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub cleanup_on_close: bool,
}

impl AutomationConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend = get("DESKPILOT_BACKEND").filter(|b| !b.eq_ignore_ascii_case("auto"));

        let action_delay = get("DESKPILOT_ACTION_DELAY_MS")
            .and_then(|v| match v.parse::<u64>() {
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => {
                    warn!("Ignoring invalid DESKPILOT_ACTION_DELAY_MS: {}", v);
                    None
                }
            })
            .unwrap_or(DEFAULT_ACTION_DELAY);

        let cleanup_on_close = get("DESKPILOT_CLEANUP_ON_CLOSE")
            .and_then(|v| match parse_bool(&v) {
                Some(b) => Some(b),
                None => {
                    warn!("Ignoring invalid DESKPILOT_CLEANUP_ON_CLOSE: {}", v);
                    None
                }
            })
            .unwrap_or(true);

        Self {
            backend,
            action_delay,
            screenshot_dir: get("DESKPILOT_SCREENSHOT_DIR").map(PathBuf::from),
            temp_dir: get("DESKPILOT_TEMP_DIR").map(PathBuf::from),
            cleanup_on_close,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            backend: None,
            action_delay: DEFAULT_ACTION_DELAY,
            screenshot_dir: None,
            temp_dir: None,
            cleanup_on_close: true,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
