use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading or validating the bot configuration.
/// Every variant is fatal: a broken config means a broken deployment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("profile '{profile}': ROI '{roi}' is defined in both rois and anchored_rois")]
    DuplicateRoi { profile: String, roi: String },

    #[error("profile '{profile}': ROI '{roi}' has {field}={value}, expected a value in 0..1")]
    RoiOutOfRange {
        profile: String,
        roi: String,
        field: &'static str,
        value: f64,
    },

    #[error("profile '{profile}': ROI '{roi}' refers to undefined anchor '{anchor}'")]
    UnknownAnchor {
        profile: String,
        roi: String,
        anchor: String,
    },

    #[error("profile '{profile}': fps must be positive")]
    InvalidFps { profile: String },

    #[error("profile '{profile}': anchor '{anchor}' threshold {value} is outside (0, 1]")]
    InvalidThreshold {
        profile: String,
        anchor: String,
        value: f64,
    },

    #[error("{context}: scale {value} must be a positive finite number")]
    InvalidScale { context: String, value: f64 },

    #[error("profile '{profile}': safety.max_actions_per_sec must be positive")]
    InvalidActionRate { profile: String },

    #[error("window pattern #{index} has no criteria")]
    EmptyWindowPattern { index: usize },

    #[error("window pattern #{index} has an invalid regex: {source}")]
    InvalidWindowRegex {
        index: usize,
        #[source]
        source: regex::Error,
    },

    #[error("profile '{0}' not found in config")]
    UnknownProfile(String),
}
