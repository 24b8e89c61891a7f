//! Backend discovery, selection and construction.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::{Backend, BackendOptions, BaselineBackend, NativeBackend};
use crate::{Error, Result};

/// Backend kinds, in auto-selection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Baseline,
}

/// Static comparison data for one backend kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendInfo {
    pub name: &'static str,
    pub platform: &'static str,
    pub background: bool,
    pub performance: &'static str,
    pub requires: &'static [&'static str],
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Native, BackendKind::Baseline];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Baseline => "baseline",
        }
    }

    pub fn info(&self) -> BackendInfo {
        match self {
            BackendKind::Native => BackendInfo {
                name: "macOS Native",
                platform: "macOS",
                background: true,
                performance: "15-30x",
                requires: &["Accessibility permission", "Screen Recording permission"],
            },
            BackendKind::Baseline => BackendInfo {
                name: "Baseline",
                platform: "any",
                background: false,
                performance: "1.0x (baseline)",
                requires: &["input and display access"],
            },
        }
    }

    /// Whether this kind can be constructed on the running system
    pub fn is_available(&self) -> bool {
        match self {
            BackendKind::Native => NativeBackend::probe(),
            BackendKind::Baseline => BaselineBackend::probe(),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "native" | "macos" => Ok(BackendKind::Native),
            "baseline" | "pyautogui" | "enigo" => Ok(BackendKind::Baseline),
            other => Err(Error::configuration(
                format!("Unknown backend '{}'", other),
                &list_available(),
            )),
        }
    }
}

/// Kinds usable right now, in priority order
pub fn list_available() -> Vec<BackendKind> {
    let available: Vec<BackendKind> = BackendKind::ALL
        .into_iter()
        .filter(BackendKind::is_available)
        .collect();
    debug!(?available, "Probed backends");
    available
}

/// Resolve a preference (`None` or `"auto"` picks the best available kind).
///
/// Nothing is constructed here, so a rejected choice has no side effects.
pub fn select(preference: Option<&str>) -> Result<BackendKind> {
    let preference = preference.map(str::trim).filter(|p| !p.is_empty());

    match preference {
        None => auto_select(),
        Some(p) if p.eq_ignore_ascii_case("auto") => auto_select(),
        Some(p) => {
            let kind: BackendKind = p.parse()?;
            let available = list_available();
            if available.contains(&kind) {
                Ok(kind)
            } else {
                Err(Error::configuration(
                    format!("Backend '{}' not available", kind),
                    &available,
                ))
            }
        }
    }
}

fn auto_select() -> Result<BackendKind> {
    let available = list_available();
    available
        .first()
        .copied()
        .ok_or_else(|| Error::configuration("No backend available", &available))
}

/// Select and construct a backend in one step
pub fn create(
    name: &str,
    action_delay: Duration,
    options: BackendOptions,
) -> Result<Box<dyn Backend>> {
    let kind = select(Some(name))?;
    instantiate(kind, action_delay, options)
}

/// Construct an already selected kind
pub fn instantiate(
    kind: BackendKind,
    action_delay: Duration,
    options: BackendOptions,
) -> Result<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = match kind {
        BackendKind::Native => Box::new(NativeBackend::new(action_delay, options)?),
        BackendKind::Baseline => Box::new(BaselineBackend::new(action_delay, options)?),
    };
    info!(
        backend = %backend.capabilities().name,
        delay_ms = action_delay.as_millis() as u64,
        "Backend created"
    );
    Ok(backend)
}

/// Plain-text comparison of every backend kind and its availability
pub fn comparison_table() -> String {
    let available = list_available();
    let mut table = format!(
        "{:<14} {:<8} {:<11} {:<16} {}\n",
        "Backend", "Platform", "Background", "Performance", "Available"
    );
    for kind in BackendKind::ALL {
        let info = kind.info();
        table.push_str(&format!(
            "{:<14} {:<8} {:<11} {:<16} {}\n",
            info.name,
            info.platform,
            if info.background { "yes" } else { "no" },
            info.performance,
            if available.contains(&kind) { "yes" } else { "no" },
        ));
    }
    table
}
