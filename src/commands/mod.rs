use anyhow::Result;
use hk3_config::{BotConfig, ProfileConfig};
use hk3_vision::{AnchorDetector, TemplateStore, TextReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::analysis::FrameAnalyzer;

mod analyze;
mod calibrate;
mod run;

pub use analyze::analyze;
pub use calibrate::calibrate;
pub use run::{build_planner, run};

/// Validate the config and print it with defaults filled in.
pub fn check_config(config: &BotConfig, profile: &str) -> Result<()> {
    let selected = config.profile(profile)?;
    println!("{}", config.to_json()?);
    info!(
        "Config OK: {} profiles; '{}' has {} anchors, {} ROIs at {} FPS",
        config.profiles.len(),
        profile,
        selected.anchors.len(),
        selected.rois.len(),
        selected.fps
    );
    Ok(())
}

fn analyzer_for(config: &BotConfig, profile: &ProfileConfig, ocr: bool) -> FrameAnalyzer {
    let detector = AnchorDetector::new(
        TemplateStore::new(&config.templates_dir),
        config.default_scales.clone(),
    );
    let reader = if ocr {
        TextReader::new()
    } else {
        TextReader::unavailable()
    };
    FrameAnalyzer::new(detector, reader, profile.clone(), ocr)
}

/// Raise `stop` on Ctrl+C. Must be called inside the runtime.
fn stop_on_ctrl_c(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received; stopping after this frame");
            stop.store(true, Ordering::SeqCst);
        }
    });
}
