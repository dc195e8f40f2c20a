use anyhow::{Context, Result};
use hk3_capture::{Frame, FrameSource, WindowHandle, WindowPattern, WindowService};
use hk3_input::ActionExecutor;
use hk3_planner::Planner;
use hk3_state::{GameState, Plan};
use std::io::{BufRead, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::{annotate, FrameAnalyzer, WindowInfo};

/// Keeps track of the game window, looking it up again whenever the current
/// handle stops being valid.
pub struct WindowTracker {
    windows: Arc<dyn WindowService>,
    patterns: Vec<WindowPattern>,
    handle: Option<WindowHandle>,
}

impl WindowTracker {
    pub fn new(windows: Arc<dyn WindowService>, patterns: Vec<WindowPattern>) -> Self {
        Self {
            windows,
            patterns,
            handle: None,
        }
    }

    pub fn windows(&self) -> &dyn WindowService {
        self.windows.as_ref()
    }

    pub fn handle(&self) -> Option<WindowHandle> {
        self.handle
    }

    /// Returns true when the handle changed.
    pub fn refresh(&mut self) -> bool {
        if self.handle.is_some_and(|h| self.windows.is_valid(h)) {
            return false;
        }
        let found = self.windows.find_window(&self.patterns);
        let changed = found != self.handle;
        match found {
            Some(h) if changed => info!("Game window found: {} via {}", h, self.windows.name()),
            None if changed => warn!("Game window lost"),
            None => debug!("Game window not found"),
            _ => {}
        }
        self.handle = found;
        changed
    }

    pub fn info(&self) -> WindowInfo {
        match self.handle {
            Some(h) => WindowInfo {
                focused: self.windows.is_focused(h),
                valid: self.windows.is_valid(h),
                client_rect: self.windows.client_rect(h),
            },
            None => WindowInfo::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub fps: u32,
    pub assist: bool,
    pub debug: bool,
    pub dry_run: bool,
    pub max_frames: Option<u64>,
    pub debug_dir: PathBuf,
}

/// Decides whether a plan that needs confirmation may run
pub type ConfirmFn = Box<dyn FnMut(&Plan) -> bool>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub actions: usize,
}

/// The capture → detect → plan → act loop
pub struct Pipeline {
    tracker: WindowTracker,
    source: FrameSource,
    analyzer: FrameAnalyzer,
    planner: Planner,
    executor: ActionExecutor,
    options: PipelineOptions,
    confirm: ConfirmFn,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        tracker: WindowTracker,
        source: FrameSource,
        analyzer: FrameAnalyzer,
        planner: Planner,
        executor: ActionExecutor,
        options: PipelineOptions,
    ) -> Self {
        Self {
            tracker,
            source,
            analyzer,
            planner,
            executor,
            options,
            confirm: Box::new(prompt_confirmation),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the stdin prompt used in assist mode.
    pub fn with_confirm(mut self, confirm: ConfirmFn) -> Self {
        self.confirm = confirm;
        self
    }

    /// Flag checked at the top of every iteration; set it to stop the loop.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Run until stopped, out of frames, or `max_frames` is reached.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let budget = Duration::from_secs(1) / self.options.fps.max(1);
        if self.options.debug {
            std::fs::create_dir_all(&self.options.debug_dir).with_context(|| {
                format!("failed to create debug dir {}", self.options.debug_dir.display())
            })?;
        }
        info!(
            "Starting main loop at {} FPS (planner={}, capture={}, input={}, assist={}, dry_run={})",
            self.options.fps,
            self.planner.name(),
            self.source.backend_name(),
            self.executor.backend_name(),
            self.options.assist,
            self.options.dry_run,
        );

        let mut summary = RunSummary::default();
        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested");
                break;
            }
            if self.options.max_frames.is_some_and(|max| summary.frames >= max) {
                info!("Reached {} frames", summary.frames);
                break;
            }
            let started = Instant::now();

            if self.tracker.refresh() {
                let handle = self.tracker.handle();
                self.source.update_handle(handle);
                self.executor.safety_mut().set_handle(handle);
            }
            self.executor.safety_mut().update_rect();

            let Some(frame) = self.source.grab(self.tracker.windows()) else {
                warn!("No frame captured; stopping");
                break;
            };
            summary.frames += 1;
            summary.actions += self.step(&frame).await;

            tokio::time::sleep_until(started + budget).await;
        }

        info!(
            "Main loop finished: {} frames, {} actions",
            summary.frames, summary.actions
        );
        Ok(summary)
    }

    /// One iteration after capture. Returns the number of actions performed.
    async fn step(&mut self, frame: &Frame) -> usize {
        let mut window = self.tracker.info();
        window.client_rect = self.executor.safety().client_rect();
        let mut state = self.analyzer.analyze(frame, window);
        let status = self.source.status();
        state
            .debug
            .insert("capture_fps".into(), serde_json::json!(status.fps));
        state.debug.insert(
            "kill_switch".into(),
            serde_json::json!(self.executor.safety().kill_switch().is_engaged()),
        );
        debug!(
            "Frame {:?}: mode={} anchors={:?}",
            status.resolution,
            state.mode,
            state.anchors.keys().collect::<Vec<_>>()
        );

        if self.options.debug {
            save_debug_artifacts(&self.options.debug_dir, frame, &state);
        }

        let image = if self.planner.wants_image() {
            match encode_png(frame) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Failed to encode frame for planner: {:#}", e);
                    None
                }
            }
        } else {
            None
        };
        let plan = self.planner.plan(&state, image.as_deref()).await;
        if plan.is_empty() {
            debug!("Plan '{}' has no actions", plan.intent);
            return 0;
        }
        info!(
            "Plan '{}': {} actions (confirmation={})",
            plan.intent,
            plan.actions.len(),
            plan.requires_confirmation
        );

        if self.options.assist && plan.requires_confirmation && !(self.confirm)(&plan) {
            info!("Plan '{}' declined", plan.intent);
            return 0;
        }
        if self.options.dry_run {
            info!("Dry run: not executing {} actions", plan.actions.len());
            return 0;
        }
        self.executor.execute(&plan.actions).await
    }
}

/// Write `latest_full.png`, `latest_annotated.png` and `state.json`.
pub fn save_debug_artifacts(dir: &Path, frame: &Frame, state: &GameState) {
    if let Err(e) = frame.save(dir.join("latest_full.png")) {
        warn!("Failed to save debug frame: {}", e);
    }
    if let Err(e) = annotate(frame, state).save(dir.join("latest_annotated.png")) {
        warn!("Failed to save annotated frame: {}", e);
    }
    match state.to_json() {
        Ok(json) => {
            if let Err(e) = std::fs::write(dir.join("state.json"), json) {
                warn!("Failed to write state.json: {}", e);
            }
        }
        Err(e) => warn!("Failed to serialize state: {}", e),
    }
}

pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    frame
        .write_to(&mut buf, image::ImageFormat::Png)
        .context("PNG encoding failed")?;
    Ok(buf.into_inner())
}

/// Assist-mode prompt on stdin. Anything but `y` declines.
fn prompt_confirmation(plan: &Plan) -> bool {
    let mut stdout = std::io::stdout();
    match serde_json::to_string_pretty(plan) {
        Ok(json) => {
            let _ = writeln!(stdout, "{}", json);
        }
        Err(_) => {
            let _ = writeln!(stdout, "{:?}", plan);
        }
    }
    let _ = write!(stdout, "Assist mode: execute plan '{}'? [y/N] ", plan.intent);
    let _ = stdout.flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim().eq_ignore_ascii_case("y")
}
