use anyhow::{Context, Result};
use hk3_capture::{default_capture_backend, default_window_service, FrameSource, WindowService};
use hk3_config::BotConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{analyzer_for, stop_on_ctrl_c};
use crate::analysis::annotate;
use crate::pipeline::WindowTracker;

/// Grab frames at the profile rate, log detected anchors and keep
/// `calibration.png` (annotated) up to date. Returns the number of frames seen.
pub async fn calibrate(config: &BotConfig, profile_name: &str, frames: Option<u64>) -> Result<u64> {
    let profile = config.profile(profile_name)?.clone();
    std::fs::create_dir_all(&config.debug_dir)
        .with_context(|| format!("failed to create {}", config.debug_dir.display()))?;
    let output = config.debug_dir.join("calibration.png");

    let windows: Arc<dyn WindowService> = Arc::from(default_window_service());
    let mut tracker = WindowTracker::new(windows, config.window_patterns.clone());
    let mut source = FrameSource::new(default_capture_backend(), None);
    let mut analyzer = analyzer_for(config, &profile, false);

    let stop = Arc::new(AtomicBool::new(false));
    stop_on_ctrl_c(stop.clone());
    let budget = Duration::from_secs(1) / profile.fps.max(1);

    info!(
        "Calibrating profile '{}' ({} anchors); press Ctrl+C to stop",
        profile_name,
        profile.anchors.len()
    );
    let mut seen = 0;
    while !stop.load(Ordering::SeqCst) && frames.map_or(true, |max| seen < max) {
        let started = Instant::now();
        if tracker.refresh() {
            source.update_handle(tracker.handle());
        }
        let Some(frame) = source.grab(tracker.windows()) else {
            warn!("No frame captured; ensure the game is running and windowed");
            break;
        };
        seen += 1;

        let state = analyzer.analyze(&frame, tracker.info());
        let missing: Vec<&String> = profile
            .anchors
            .keys()
            .filter(|name| !state.anchors.contains_key(*name))
            .collect();
        info!(
            "Frame {} {}x{} mode={}: found {:?}, missing {:?}",
            seen,
            frame.width(),
            frame.height(),
            state.mode,
            state
                .anchors
                .iter()
                .map(|(name, m)| format!("{}@{:.2}x{:.2}", name, m.confidence, m.scale))
                .collect::<Vec<_>>(),
            missing
        );
        if let Err(e) = annotate(&frame, &state).save(&output) {
            warn!("Failed to save {}: {}", output.display(), e);
        }

        tokio::time::sleep_until(started + budget).await;
    }
    info!("Calibration done after {} frames; last frame in {}", seen, output.display());
    Ok(seen)
}
