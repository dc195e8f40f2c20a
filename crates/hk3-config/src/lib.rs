use hk3_capture::WindowPattern;
use hk3_vision::{AnchorTemplate, AnchoredRoi, Roi, DEFAULT_SCALES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

fn default_true() -> bool {
    true
}

fn default_fps() -> u32 {
    10
}

fn default_click_anchors() -> Vec<String> {
    vec!["CloseX".to_string()]
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("assets/templates")
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug")
}

fn default_logs_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_scales() -> Vec<f64> {
    DEFAULT_SCALES.to_vec()
}

/// Input pacing for a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    pub max_actions_per_sec: u32,
    pub min_delay_ms: u64,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            max_actions_per_sec: 6,
            min_delay_ms: 30,
        }
    }
}

/// Settings for the remote model planner (OpenAI-compatible chat endpoint)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePlannerConfig {
    pub api_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Calls closer together than this return a cooldown plan
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
    /// Attach the captured frame as a PNG image
    pub send_image: bool,
    pub temperature: f32,
}

impl Default for RemotePlannerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            min_interval_ms: 2000,
            timeout_secs: 30,
            send_image: true,
            temperature: 0.2,
        }
    }
}

impl RemotePlannerConfig {
    /// Gemini through Google's OpenAI-compatible endpoint.
    pub fn gemini() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                .to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            min_interval_ms: 1500,
            ..Self::default()
        }
    }

    pub fn with_overrides(mut self, overrides: &RemoteOverrides) -> Self {
        if let Some(ref model) = overrides.model {
            self.model = model.clone();
        }
        if let Some(interval) = overrides.min_interval {
            self.min_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        }
        if overrides.no_vision {
            self.send_image = false;
        }
        self
    }
}

/// Command-line adjustments to a [`RemotePlannerConfig`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteOverrides {
    pub model: Option<String>,
    pub min_interval: Option<Duration>,
    pub no_vision: bool,
}

/// One named set of detection and safety settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_true")]
    pub strict_focus: bool,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub rois: BTreeMap<String, Roi>,
    /// Older layout keeping anchored regions in their own map; merged into
    /// `rois` on load.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub anchored_rois: BTreeMap<String, AnchoredRoi>,
    #[serde(default)]
    pub anchors: BTreeMap<String, AnchorTemplate>,
    /// Anchors whose clicks need confirmation in assist mode
    #[serde(default)]
    pub risky_templates: Vec<String>,
    /// Anchors the rule planner clicks when present
    #[serde(default = "default_click_anchors")]
    pub click_anchors: Vec<String>,
    /// Mode name -> anchors that must all be present for that mode
    #[serde(default)]
    pub modes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub safety: SafetySettings,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            strict_focus: true,
            fps: default_fps(),
            rois: BTreeMap::new(),
            anchored_rois: BTreeMap::new(),
            anchors: BTreeMap::new(),
            risky_templates: Vec::new(),
            click_anchors: default_click_anchors(),
            modes: BTreeMap::new(),
            safety: SafetySettings::default(),
        }
    }
}

impl ProfileConfig {
    /// Name anchors after their keys and fold `anchored_rois` into `rois`.
    fn normalize(&mut self, name: &str) -> Result<(), ConfigError> {
        for (anchor_name, anchor) in self.anchors.iter_mut() {
            anchor.name = anchor_name.clone();
        }
        for (roi_name, roi) in std::mem::take(&mut self.anchored_rois) {
            if self.rois.contains_key(&roi_name) {
                return Err(ConfigError::DuplicateRoi {
                    profile: name.to_string(),
                    roi: roi_name,
                });
            }
            self.rois.insert(roi_name, Roi::Anchored(roi));
        }
        Ok(())
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::InvalidFps {
                profile: name.to_string(),
            });
        }
        if self.safety.max_actions_per_sec == 0 {
            return Err(ConfigError::InvalidActionRate {
                profile: name.to_string(),
            });
        }

        for (anchor_name, anchor) in &self.anchors {
            if !(anchor.threshold > 0.0 && anchor.threshold <= 1.0) {
                return Err(ConfigError::InvalidThreshold {
                    profile: name.to_string(),
                    anchor: anchor_name.clone(),
                    value: anchor.threshold,
                });
            }
            validate_scales(&format!("profile '{}' anchor '{}'", name, anchor_name), &anchor.scales)?;
        }

        for (roi_name, roi) in &self.rois {
            match roi {
                Roi::Relative(rel) => {
                    if let Some((field, value)) = rel.out_of_range() {
                        return Err(ConfigError::RoiOutOfRange {
                            profile: name.to_string(),
                            roi: roi_name.clone(),
                            field,
                            value,
                        });
                    }
                }
                Roi::Anchored(anchored) => {
                    if !self.anchors.contains_key(&anchored.anchor) {
                        return Err(ConfigError::UnknownAnchor {
                            profile: name.to_string(),
                            roi: roi_name.clone(),
                            anchor: anchored.anchor.clone(),
                        });
                    }
                }
            }
        }

        for anchor in self
            .click_anchors
            .iter()
            .chain(&self.risky_templates)
            .chain(self.modes.values().flatten())
        {
            if !self.anchors.contains_key(anchor) {
                tracing::warn!("Profile '{}' refers to undefined anchor '{}'", name, anchor);
            }
        }

        Ok(())
    }
}

fn validate_scales(context: &str, scales: &[f64]) -> Result<(), ConfigError> {
    match scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        Some(&value) => Err(ConfigError::InvalidScale {
            context: context.to_string(),
            value,
        }),
        None => Ok(()),
    }
}

/// Top-level bot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub window_patterns: Vec<WindowPattern>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: Option<PathBuf>,
    #[serde(default = "default_scales")]
    pub default_scales: Vec<f64>,
    #[serde(default)]
    pub remote_planner: RemotePlannerConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            window_patterns: Vec::new(),
            profiles: BTreeMap::new(),
            templates_dir: default_templates_dir(),
            debug_dir: default_debug_dir(),
            logs_dir: default_logs_dir(),
            default_scales: default_scales(),
            remote_planner: RemotePlannerConfig::default(),
        }
    }
}

impl BotConfig {
    /// Read, parse and validate a config file. `.json` files are parsed as
    /// JSON; anything else as YAML, which also accepts JSON documents.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Self::finish(serde_json::from_str(content)?)
    }

    /// Parse and validate a YAML config document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Self::finish(serde_yaml::from_str(content)?)
    }

    fn finish(mut config: BotConfig) -> Result<Self, ConfigError> {
        for (name, profile) in config.profiles.iter_mut() {
            profile.normalize(name)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// One-line description for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "{} profiles, {} window patterns",
            self.profiles.len(),
            self.window_patterns.len()
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, pattern) in self.window_patterns.iter().enumerate() {
            if pattern.is_empty() {
                return Err(ConfigError::EmptyWindowPattern { index });
            }
            if let Some(ref re) = pattern.regex {
                regex::Regex::new(re)
                    .map_err(|source| ConfigError::InvalidWindowRegex { index, source })?;
            }
        }
        validate_scales("default_scales", &self.default_scales)?;
        for (name, profile) in &self.profiles {
            profile.validate(name)?;
        }
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Result<&ProfileConfig, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
