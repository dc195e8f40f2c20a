use hk3_capture::{crop_absolute, ClientRect, Frame};
use hk3_config::ProfileConfig;
use hk3_state::{GameState, UiRegion};
use hk3_vision::{draw_bbox, AnchorDetector, TextReader};
use image::Rgb;
use std::path::Path;
use tracing::{debug, warn};

const ANCHOR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ROI_COLOR: Rgb<u8> = Rgb([255, 160, 0]);

/// What the window service reported for the frame being analyzed
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowInfo {
    pub focused: bool,
    pub valid: bool,
    pub client_rect: Option<ClientRect>,
}

/// Turns one frame into a [`GameState`] using a profile's anchors, ROIs and modes.
pub struct FrameAnalyzer {
    detector: AnchorDetector,
    reader: TextReader,
    profile: ProfileConfig,
    ocr: bool,
}

impl FrameAnalyzer {
    pub fn new(detector: AnchorDetector, reader: TextReader, profile: ProfileConfig, ocr: bool) -> Self {
        if ocr && !reader.is_available() {
            warn!("OCR requested but tesseract is unavailable; numbers will be empty");
        }
        Self {
            detector,
            reader,
            profile,
            ocr,
        }
    }

    pub fn profile(&self) -> &ProfileConfig {
        &self.profile
    }

    pub fn analyze(&mut self, frame: &Frame, window: WindowInfo) -> GameState {
        let mut state = GameState::new(window.focused, window.valid, window.client_rect);
        state.anchors = self.detector.detect_all(frame, &self.profile.anchors);
        state.derive_mode(&self.profile.modes);

        let container = frame.dimensions();
        for (name, roi) in &self.profile.rois {
            let Some(bbox) = roi.resolve(container, &state.anchors) else {
                debug!("ROI {} not resolvable this frame", name);
                continue;
            };
            state.ui.insert(name.clone(), UiRegion { bbox });
            if self.ocr {
                let crop = crop_absolute(frame, &bbox);
                state.numbers.insert(name.clone(), self.reader.read_text(&crop));
            }
        }

        state
            .debug
            .insert("frame_size".into(), serde_json::json!([container.0, container.1]));
        state.debug.insert(
            "templates_cached".into(),
            serde_json::json!(self.detector.store().len()),
        );
        state
    }
}

/// Copy of `frame` with detected anchors and resolved ROIs outlined.
pub fn annotate(frame: &Frame, state: &GameState) -> Frame {
    let mut annotated = frame.clone();
    for region in state.ui.values() {
        draw_bbox(&mut annotated, &region.bbox, ROI_COLOR, 1);
    }
    for m in state.anchors.values() {
        draw_bbox(&mut annotated, &m.bbox, ANCHOR_COLOR, 2);
    }
    annotated
}

/// Save `roi_<name>.png` for every resolved ROI. Returns how many were written.
pub fn save_roi_crops(frame: &Frame, state: &GameState, dir: &Path) -> usize {
    let mut written = 0;
    for (name, region) in &state.ui {
        let path = dir.join(format!("roi_{}.png", name));
        match crop_absolute(frame, &region.bbox).save(&path) {
            Ok(()) => written += 1,
            Err(e) => warn!("Failed to save {}: {}", path.display(), e),
        }
    }
    written
}
