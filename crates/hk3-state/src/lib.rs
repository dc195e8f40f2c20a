use hk3_capture::{BoundingBox, ClientRect};
use hk3_vision::MatchResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod plan;

pub use plan::{normalize_plan, Action, ActionKind, Plan};

/// Mode reported when no configured mode matches the detected anchors
pub const UNKNOWN_MODE: &str = "unknown";

/// A resolved UI region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UiRegion {
    pub bbox: BoundingBox,
}

/// Snapshot of everything the bot knows about the game for one loop iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub focused: bool,
    #[serde(alias = "windowValid")]
    pub hwnd_valid: bool,
    pub client_rect: Option<ClientRect>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub mode: String,
    #[serde(default)]
    pub anchors: BTreeMap<String, MatchResult>,
    #[serde(default)]
    pub ui: BTreeMap<String, UiRegion>,
    #[serde(default)]
    pub numbers: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub debug: BTreeMap<String, serde_json::Value>,
}

impl GameState {
    pub fn new(focused: bool, hwnd_valid: bool, client_rect: Option<ClientRect>) -> Self {
        Self {
            focused,
            hwnd_valid,
            client_rect,
            timestamp: now_secs(),
            mode: UNKNOWN_MODE.to_string(),
            anchors: BTreeMap::new(),
            ui: BTreeMap::new(),
            numbers: BTreeMap::new(),
            debug: BTreeMap::new(),
        }
    }

    /// Whether an anchor was detected this iteration
    pub fn has_anchor(&self, name: &str) -> bool {
        self.anchors.get(name).is_some_and(|m| m.found)
    }

    /// Set `mode` from the configured mode table.
    pub fn derive_mode(&mut self, modes: &BTreeMap<String, Vec<String>>) {
        self.mode = derive_mode(modes, &self.anchors);
    }

    /// Canonical pretty-printed JSON form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// First mode (in name order) whose required anchors are all present.
/// Modes with no required anchors never match.
pub fn derive_mode(
    modes: &BTreeMap<String, Vec<String>>,
    anchors: &BTreeMap<String, MatchResult>,
) -> String {
    modes
        .iter()
        .find(|(_, required)| {
            !required.is_empty()
                && required
                    .iter()
                    .all(|a| anchors.get(a).is_some_and(|m| m.found))
        })
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| UNKNOWN_MODE.to_string())
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
