use image::GrayImage;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

use crate::Frame;

/// Reads single-line text from cropped UI regions using Tesseract OCR.
/// Falls back gracefully when Tesseract is not installed.
pub struct TextReader {
    tesseract_available: bool,
    temp_dir: PathBuf,
}

impl TextReader {
    pub fn new() -> Self {
        let tesseract_available = check_tesseract();
        if tesseract_available {
            debug!("Tesseract OCR available");
        } else {
            warn!("Tesseract not found; OCR unavailable");
        }
        Self::with_availability(tesseract_available)
    }

    /// A reader that never runs OCR.
    pub fn unavailable() -> Self {
        Self::with_availability(false)
    }

    fn with_availability(tesseract_available: bool) -> Self {
        let temp_dir = std::env::temp_dir().join("hk3_bot_ocr");
        if tesseract_available {
            let _ = std::fs::create_dir_all(&temp_dir);
        }
        Self {
            tesseract_available,
            temp_dir,
        }
    }

    pub fn is_available(&self) -> bool {
        self.tesseract_available
    }

    /// Read one line of text from a cropped region
    pub fn read_text(&self, image: &Frame) -> Option<String> {
        if !self.tesseract_available {
            return None;
        }
        let processed = preprocess_for_ocr(image);
        self.run_tesseract(&processed, None)
    }

    /// Read an unsigned number from a cropped region
    pub fn read_number(&self, image: &Frame) -> Option<u32> {
        if !self.tesseract_available {
            return None;
        }
        let processed = preprocess_for_ocr(image);
        let text = self.run_tesseract(&processed, Some("0123456789"))?;
        text.parse::<u32>().ok()
    }

    fn run_tesseract(&self, image: &GrayImage, whitelist: Option<&str>) -> Option<String> {
        let temp_path = self
            .temp_dir
            .join(format!("ocr_input_{}.png", std::process::id()));
        if let Err(e) = image.save(&temp_path) {
            warn!("Failed to write OCR input: {}", e);
            return None;
        }

        let mut cmd = Command::new("tesseract");
        cmd.arg(&temp_path)
            .arg("stdout")
            .args(["--psm", "7"]) // Single text line
            .args(["--oem", "3"]);
        if let Some(chars) = whitelist {
            cmd.arg("-c").arg(format!("tessedit_char_whitelist={}", chars));
        }
        let output = cmd.output().ok()?;

        if !output.status.success() {
            return None;
        }

        let text = String::from_utf8(output.stdout).ok()?;
        let trimmed = text.trim().to_string();

        if trimmed.is_empty() {
            None
        } else {
            debug!("OCR result: '{}'", trimmed);
            Some(trimmed)
        }
    }
}

impl Default for TextReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Grayscale, then binarize at the Otsu threshold (pixels above it become white).
fn preprocess_for_ocr(image: &Frame) -> GrayImage {
    let mut gray = image::imageops::grayscale(image);
    let t = otsu_threshold(&gray);
    for p in gray.pixels_mut() {
        p[0] = if p[0] > t { 255 } else { 0 };
    }
    gray
}

/// Threshold maximizing between-class variance of the intensity histogram.
fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0;
    let mut best_var = -1.0;
    let mut threshold = 0u8;

    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best_var {
            best_var = between;
            threshold = t as u8;
        }
    }
    threshold
}

/// Check if Tesseract is installed and accessible
fn check_tesseract() -> bool {
    Command::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
