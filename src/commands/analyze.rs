use anyhow::{Context, Result};
use hk3_config::BotConfig;
use hk3_state::GameState;
use std::path::Path;
use tracing::info;

use super::analyzer_for;
use crate::analysis::{annotate, save_roi_crops, WindowInfo};

/// Detect anchors and resolve ROIs on a saved screenshot. Writes the annotated
/// image and one crop per resolved ROI to `output` and prints the state.
pub fn analyze(
    config: &BotConfig,
    profile_name: &str,
    screenshot: &Path,
    output: &Path,
    ocr: bool,
) -> Result<GameState> {
    let profile = config.profile(profile_name)?;
    let frame = image::open(screenshot)
        .with_context(|| format!("failed to open screenshot {}", screenshot.display()))?
        .to_rgb8();

    let mut analyzer = analyzer_for(config, profile, ocr);
    let state = analyzer.analyze(&frame, WindowInfo::default());

    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let annotated_path = output.join("analysis_annotated.png");
    annotate(&frame, &state)
        .save(&annotated_path)
        .with_context(|| format!("failed to save {}", annotated_path.display()))?;
    let crops = save_roi_crops(&frame, &state, output);

    println!("{}", state.to_json()?);
    info!(
        "Analyzed {} ({}x{}): {} anchors, {} ROIs, output in {}",
        screenshot.display(),
        frame.width(),
        frame.height(),
        state.anchors.len(),
        crops,
        output.display()
    );
    Ok(state)
}
