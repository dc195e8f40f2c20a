use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::matcher::{match_template, MatchResult};
use crate::templates::TemplateStore;
use crate::Frame;

/// Scales tried when neither the anchor nor the caller provides any.
pub const DEFAULT_SCALES: [f64; 5] = [0.75, 0.85, 1.0, 1.15, 1.3];

fn default_threshold() -> f64 {
    0.8
}

/// A named reference image for a fixed UI element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorTemplate {
    /// Filled in from the map key when loaded from a profile
    #[serde(default)]
    pub name: String,
    /// File name relative to the templates directory
    pub file: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Empty means "use the detector's default scales"
    #[serde(default)]
    pub scales: Vec<f64>,
}

/// Locates anchors in captured frames.
pub struct AnchorDetector {
    store: TemplateStore,
    default_scales: Vec<f64>,
}

impl AnchorDetector {
    pub fn new(store: TemplateStore, default_scales: Vec<f64>) -> Self {
        let default_scales = if default_scales.is_empty() {
            DEFAULT_SCALES.to_vec()
        } else {
            default_scales
        };
        Self {
            store,
            default_scales,
        }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn default_scales(&self) -> &[f64] {
        &self.default_scales
    }

    /// Best match for one anchor. A template that cannot be loaded reports not-found.
    pub fn find_anchor(&mut self, frame: &Frame, anchor: &AnchorTemplate) -> MatchResult {
        let path = self.store.resolve(&anchor.file);
        let Some(template) = self.store.load(&path) else {
            return MatchResult::not_found();
        };
        let scales = if anchor.scales.is_empty() {
            &self.default_scales
        } else {
            &anchor.scales
        };
        let result = match_template(frame, &template, scales, anchor.threshold);
        debug!(
            "Anchor {}: found={} confidence={:.3} scale={} bbox={:?}",
            anchor.name, result.found, result.confidence, result.scale, result.bbox
        );
        result
    }

    /// Match every anchor and keep only the ones that were found.
    pub fn detect_all(
        &mut self,
        frame: &Frame,
        anchors: &BTreeMap<String, AnchorTemplate>,
    ) -> BTreeMap<String, MatchResult> {
        anchors
            .iter()
            .filter_map(|(name, anchor)| {
                let result = self.find_anchor(frame, anchor);
                result.found.then(|| (name.clone(), result))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::path::Path;

    fn frame_with_marker() -> Frame {
        let mut frame = Frame::new(120, 90);
        for y in 30..46 {
            for x in 50..66 {
                let v = if (x + y) % 2 == 0 { 255 } else { 120 };
                frame.put_pixel(x, y, Rgb([v, 40, 40]));
            }
        }
        frame
    }

    fn write_marker(dir: &Path) {
        let marker = image::imageops::crop_imm(&frame_with_marker(), 50, 30, 16, 16).to_image();
        marker.save(dir.join("marker.png")).unwrap();
    }

    fn anchor(file: &str, threshold: f64) -> AnchorTemplate {
        AnchorTemplate {
            name: file.to_string(),
            file: file.to_string(),
            threshold,
            scales: vec![1.0],
        }
    }

    #[test]
    fn test_detect_all_reports_found_anchors_only() {
        let dir = tempfile::tempdir().unwrap();
        write_marker(dir.path());

        let mut anchors = BTreeMap::new();
        anchors.insert("Marker".to_string(), anchor("marker.png", 0.9));
        anchors.insert("Missing".to_string(), anchor("missing.png", 0.1));

        let mut detector = AnchorDetector::new(TemplateStore::new(dir.path()), vec![]);
        let found = detector.detect_all(&frame_with_marker(), &anchors);

        assert_eq!(found.len(), 1);
        let marker = &found["Marker"];
        assert!(marker.found);
        assert_eq!((marker.bbox.x, marker.bbox.y), (50, 30));
    }

    #[test]
    fn test_detect_all_omits_anchors_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        write_marker(dir.path());

        let frame = Frame::from_pixel(120, 90, Rgb([10, 200, 10]));
        let mut anchors = BTreeMap::new();
        anchors.insert("Marker".to_string(), anchor("marker.png", 0.95));

        let mut detector = AnchorDetector::new(TemplateStore::new(dir.path()), vec![]);
        let best = detector.find_anchor(&frame, &anchors["Marker"]);
        assert!(best.confidence < 0.95);
        assert!(detector.detect_all(&frame, &anchors).is_empty());
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = AnchorDetector::new(TemplateStore::new(dir.path()), vec![]);
        let result = detector.find_anchor(&frame_with_marker(), &anchor("nope.png", 0.5));
        assert_eq!(result, MatchResult::not_found());
    }

    #[test]
    fn test_empty_scales_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_marker(dir.path());

        let mut detector = AnchorDetector::new(TemplateStore::new(dir.path()), vec![2.0, 1.0]);
        assert_eq!(detector.default_scales(), &[2.0, 1.0]);

        let mut marker = anchor("marker.png", 0.9);
        marker.scales.clear();
        let result = detector.find_anchor(&frame_with_marker(), &marker);
        assert!(result.found);
        assert_eq!(result.scale, 1.0);

        let builtin = AnchorDetector::new(TemplateStore::new(dir.path()), vec![]);
        assert_eq!(builtin.default_scales(), &DEFAULT_SCALES);
    }

    #[test]
    fn test_detection_order_does_not_change_results() {
        let dir = tempfile::tempdir().unwrap();
        write_marker(dir.path());
        let frame = frame_with_marker();

        let mut detector = AnchorDetector::new(TemplateStore::new(dir.path()), vec![]);
        let alone = detector.find_anchor(&frame, &anchor("marker.png", 0.9));

        let mut anchors = BTreeMap::new();
        anchors.insert("A".to_string(), anchor("missing.png", 0.5));
        anchors.insert("B".to_string(), anchor("marker.png", 0.9));
        anchors.insert("C".to_string(), anchor("marker.png", 0.9));
        let all = detector.detect_all(&frame, &anchors);

        assert_eq!(all["B"], alone);
        assert_eq!(all["C"], alone);
    }
}
