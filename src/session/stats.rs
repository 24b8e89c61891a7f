use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Point-in-time snapshot of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub id: String,
    pub backend: String,
    pub created_at: DateTime<Utc>,
    pub closed: bool,
    pub action_count: u64,
    pub screenshot_count: u64,
    pub screenshot_dir: PathBuf,
    pub temp_dir: PathBuf,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
