use anyhow::{bail, Result};
use hk3_capture::{default_capture_backend, default_window_service, FrameSource, WindowService};
use hk3_config::{BotConfig, ProfileConfig, RemoteOverrides, RemotePlannerConfig};
use hk3_input::{default_backend, spawn_kill_switch_listener, ActionExecutor, KillSwitch, SafetyContext};
use hk3_planner::{Planner, RemotePlanner, ReplayPlanner, RulePlanner};
use std::sync::Arc;
use std::time::Duration;

use super::{analyzer_for, stop_on_ctrl_c};
use crate::cli::{PlannerKind, RunArgs};
use crate::pipeline::{Pipeline, PipelineOptions, RunSummary, WindowTracker};

pub fn build_planner(
    kind: PlannerKind,
    profile: &ProfileConfig,
    config: &BotConfig,
    overrides: &RemoteOverrides,
) -> Planner {
    match kind {
        PlannerKind::Rules => Planner::Rules(RulePlanner::from_profile(profile)),
        PlannerKind::Stub => Planner::Replay(ReplayPlanner::new(&config.debug_dir)),
        PlannerKind::Remote => Planner::Remote(RemotePlanner::new(
            config.remote_planner.clone().with_overrides(overrides),
        )),
        PlannerKind::Gemini => Planner::Remote(RemotePlanner::new(
            RemotePlannerConfig::gemini().with_overrides(overrides),
        )),
    }
}

pub async fn run(config: &BotConfig, profile_name: &str, debug: bool, args: &RunArgs) -> Result<RunSummary> {
    let profile = config.profile(profile_name)?.clone();
    let fps = args.fps.unwrap_or(profile.fps);
    if fps == 0 {
        bail!("--fps must be positive");
    }

    let windows: Arc<dyn WindowService> = Arc::from(default_window_service());
    let tracker = WindowTracker::new(windows.clone(), config.window_patterns.clone());
    let source = FrameSource::new(default_capture_backend(), None);

    let kill_switch = KillSwitch::new();
    let _listener = spawn_kill_switch_listener(kill_switch.clone());
    let safety = SafetyContext::new(
        windows,
        None,
        profile.strict_focus,
        profile.safety.max_actions_per_sec,
        Duration::from_millis(profile.safety.min_delay_ms),
        kill_switch,
    );
    let executor = ActionExecutor::new(safety, default_backend());

    let analyzer = analyzer_for(config, &profile, args.ocr);
    let planner = build_planner(args.planner, &profile, config, &args.remote_overrides());
    let options = PipelineOptions {
        fps,
        assist: args.assist,
        debug,
        dry_run: args.dry_run,
        max_frames: args.max_frames,
        debug_dir: config.debug_dir.clone(),
    };

    let mut pipeline = Pipeline::new(tracker, source, analyzer, planner, executor, options);
    stop_on_ctrl_c(pipeline.stop_handle());
    pipeline.run().await
}
