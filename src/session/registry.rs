//! Process-wide registry of live sessions.
//!
//! Guarantees that live session ids are unique and that no two live sessions
//! share (or nest) their directories.

use std::env;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
struct LiveDirs {
    screenshot_dir: PathBuf,
    temp_dir: PathBuf,
}

impl LiveDirs {
    fn paths(&self) -> [&Path; 2] {
        [&self.screenshot_dir, &self.temp_dir]
    }
}

fn live() -> &'static DashMap<String, Option<LiveDirs>> {
    static LIVE: OnceLock<DashMap<String, Option<LiveDirs>>> = OnceLock::new();
    LIVE.get_or_init(DashMap::new)
}

/// Serializes claim checks so two sessions cannot both pass the overlap check
fn claim_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Reserve a fresh short id that no live session uses
pub(crate) fn reserve_id() -> String {
    loop {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        if let Entry::Vacant(slot) = live().entry(id.clone()) {
            slot.insert(None);
            return id;
        }
    }
}

/// Attach directories to a reserved id, rejecting any overlap with another
/// live session.
pub(crate) fn claim(id: &str, screenshot_dir: &Path, temp_dir: &Path) -> Result<()> {
    let _guard = claim_lock().lock().unwrap_or_else(|e| e.into_inner());
    let wanted = LiveDirs {
        screenshot_dir: normalize(screenshot_dir),
        temp_dir: normalize(temp_dir),
    };

    for entry in live().iter() {
        if entry.key() == id {
            continue;
        }
        let Some(dirs) = entry.value() else {
            continue;
        };
        for mine in wanted.paths() {
            for theirs in dirs.paths() {
                if overlaps(mine, theirs) {
                    return Err(Error::layout(format!(
                        "Directory {} overlaps {} used by live session {}",
                        mine.display(),
                        theirs.display(),
                        entry.key()
                    )));
                }
            }
        }
    }

    live().insert(id.to_string(), Some(wanted));
    Ok(())
}

pub(crate) fn release(id: &str) {
    live().remove(id);
}

pub fn is_live(id: &str) -> bool {
    live().contains_key(id)
}

pub fn live_count() -> usize {
    live().len()
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Absolute, lexically cleaned path whose deepest existing ancestor is
/// canonicalized. Paths compare the same before and after they are created.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }

    for ancestor in clean.ancestors() {
        if let (Ok(real), Ok(rest)) = (ancestor.canonicalize(), clean.strip_prefix(ancestor)) {
            return if rest.as_os_str().is_empty() {
                real
            } else {
                real.join(rest)
            };
        }
    }
    clean
}
