use hk3_bot_lib::analysis::FrameAnalyzer;
use hk3_bot_lib::pipeline::{Pipeline, PipelineOptions, RunSummary, WindowTracker};
use hk3_capture::{
    CaptureBackend, ClientRect, Frame, FrameSource, NullWindowService, WindowHandle, WindowPattern,
    WindowService,
};
use hk3_config::BotConfig;
use hk3_input::{ActionExecutor, InputBackend, KeyName, KillSwitch, MouseButton, SafetyContext};
use hk3_planner::{Planner, RulePlanner};
use hk3_state::Plan;
use hk3_vision::{AnchorDetector, TemplateStore, TextReader};
use image::Rgb;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RECT: ClientRect = ClientRect::new(100, 50, 300, 200);

struct GameWindow;

impl WindowService for GameWindow {
    fn name(&self) -> &'static str {
        "fake"
    }
    fn find_window(&self, patterns: &[WindowPattern]) -> Option<WindowHandle> {
        hk3_capture::window::matches_any(patterns, "Roblox - Humankind 3", "WINDOWSCLIENT")
            .then_some(WindowHandle(0x42))
    }
    fn client_rect(&self, _handle: WindowHandle) -> Option<ClientRect> {
        Some(RECT)
    }
    fn is_focused(&self, _handle: WindowHandle) -> bool {
        true
    }
    fn is_valid(&self, handle: WindowHandle) -> bool {
        handle == WindowHandle(0x42)
    }
}

/// Dark client area with a close button at (120, 60)
fn game_frame() -> Frame {
    let mut frame = Frame::from_pixel(200, 150, Rgb([12, 12, 20]));
    for y in 60..72 {
        for x in 120..136 {
            let on_cross = (x - 120) == (y - 60) || (x - 120) + (y - 60) == 15;
            let px = if on_cross { Rgb([255, 255, 255]) } else { Rgb([200, 30, 30]) };
            frame.put_pixel(x, y, px);
        }
    }
    frame
}

struct ScriptedCapture;

impl CaptureBackend for ScriptedCapture {
    fn name(&self) -> &'static str {
        "scripted"
    }
    fn capture(&mut self, _handle: WindowHandle, rect: &ClientRect) -> anyhow::Result<Frame> {
        assert_eq!((rect.width(), rect.height()), (200, 150));
        Ok(game_frame())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Input {
    MoveTo(i32, i32),
    Click(MouseButton),
    Other,
}

#[derive(Clone, Default)]
struct Recording(Arc<Mutex<Vec<Input>>>);

impl Recording {
    fn events(&self) -> Vec<Input> {
        self.0.lock().unwrap().clone()
    }
    fn push(&self, input: Input) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(input);
        Ok(())
    }
}

impl InputBackend for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }
    fn key_down(&mut self, _key: KeyName) -> anyhow::Result<()> {
        self.push(Input::Other)
    }
    fn key_up(&mut self, _key: KeyName) -> anyhow::Result<()> {
        self.push(Input::Other)
    }
    fn move_relative(&mut self, _dx: i32, _dy: i32) -> anyhow::Result<()> {
        self.push(Input::Other)
    }
    fn move_to(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.push(Input::MoveTo(x, y))
    }
    fn click(&mut self, button: MouseButton) -> anyhow::Result<()> {
        self.push(Input::Click(button))
    }
    fn type_text(&mut self, _text: &str) -> anyhow::Result<()> {
        self.push(Input::Other)
    }
}

fn config(templates: &Path, risky: bool) -> BotConfig {
    let risky_templates = if risky { r#"["CloseX"]"# } else { "[]" };
    let json = format!(
        r#"{{
            "window_patterns": [{{"contains": "humankind"}}],
            "templates_dir": {:?},
            "profiles": {{"default": {{
                "anchors": {{"CloseX": {{"file": "close_x.png", "threshold": 0.9, "scales": [1.0, 2.0]}}}},
                "rois": {{"label": {{"anchor": "CloseX", "anchor_corner": "bottom_left", "size_px": [40, 10]}}}},
                "modes": {{"popup": ["CloseX"]}},
                "risky_templates": {}
            }}}}
        }}"#,
        templates.display().to_string(),
        risky_templates
    );
    BotConfig::from_json(&json).unwrap()
}

struct Harness {
    pipeline: Pipeline,
    input: Recording,
    _dir: tempfile::TempDir,
    debug_dir: std::path::PathBuf,
}

#[derive(Default)]
struct Flags {
    dry_run: bool,
    assist: bool,
    debug: bool,
    risky: bool,
}

fn harness(windows: Arc<dyn WindowService>, flags: Flags) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    image::imageops::crop_imm(&game_frame(), 120, 60, 16, 12)
        .to_image()
        .save(dir.path().join("close_x.png"))
        .unwrap();
    let config = config(dir.path(), flags.risky);
    let profile = config.profile("default").unwrap().clone();
    let debug_dir = dir.path().join("debug");

    let tracker = WindowTracker::new(windows.clone(), config.window_patterns.clone());
    let source = FrameSource::new(Some(Box::new(ScriptedCapture)), None);
    let detector = AnchorDetector::new(
        TemplateStore::new(&config.templates_dir),
        config.default_scales.clone(),
    );
    let analyzer = FrameAnalyzer::new(detector, TextReader::unavailable(), profile.clone(), false);
    let planner = Planner::Rules(RulePlanner::from_profile(&profile));

    let input = Recording::default();
    let safety = SafetyContext::new(
        windows,
        None,
        profile.strict_focus,
        profile.safety.max_actions_per_sec,
        Duration::from_millis(profile.safety.min_delay_ms),
        KillSwitch::new(),
    );
    let executor = ActionExecutor::new(safety, Box::new(input.clone()));

    let options = PipelineOptions {
        fps: 1000,
        assist: flags.assist,
        debug: flags.debug,
        dry_run: flags.dry_run,
        max_frames: Some(1),
        debug_dir: debug_dir.clone(),
    };
    let pipeline = Pipeline::new(tracker, source, analyzer, planner, executor, options);
    Harness {
        pipeline,
        input,
        _dir: dir,
        debug_dir,
    }
}

#[tokio::test]
async fn test_click_lands_in_screen_coordinates() {
    let mut h = harness(Arc::new(GameWindow), Flags::default());
    let summary = h.pipeline.run().await.unwrap();

    assert_eq!(summary, RunSummary { frames: 1, actions: 1 });
    // Template center (128, 66) in the client area, offset by the client origin
    assert_eq!(
        h.input.events(),
        vec![Input::MoveTo(228, 116), Input::Click(MouseButton::Left)]
    );
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let mut h = harness(Arc::new(GameWindow), Flags { dry_run: true, ..Flags::default() });
    let summary = h.pipeline.run().await.unwrap();
    assert_eq!(summary, RunSummary { frames: 1, actions: 0 });
    assert!(h.input.events().is_empty());
}

#[tokio::test]
async fn test_debug_run_writes_artifacts() {
    let mut h = harness(Arc::new(GameWindow), Flags { dry_run: true, debug: true, ..Flags::default() });
    h.pipeline.run().await.unwrap();

    assert!(h.debug_dir.join("latest_full.png").exists());
    assert!(h.debug_dir.join("latest_annotated.png").exists());
    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(h.debug_dir.join("state.json")).unwrap())
            .unwrap();
    assert_eq!(state["mode"], "popup");
    assert_eq!(state["focused"], true);
    assert_eq!(state["client_rect"], serde_json::json!([100, 50, 300, 200]));
    assert_eq!(state["anchors"]["CloseX"]["bbox"], serde_json::json!([120, 60, 16, 12]));
    assert_eq!(state["ui"]["label"]["bbox"], serde_json::json!([120, 72, 40, 10]));
}

async fn run_with_answer(flags: Flags, answer: bool) -> (RunSummary, u32, Vec<Input>) {
    let h = harness(Arc::new(GameWindow), flags);
    let asked = Arc::new(Mutex::new(0));
    let counter = asked.clone();
    let mut pipeline = h.pipeline.with_confirm(Box::new(move |plan: &Plan| {
        assert!(plan.requires_confirmation);
        *counter.lock().unwrap() += 1;
        answer
    }));
    let summary = pipeline.run().await.unwrap();
    let asked = *asked.lock().unwrap();
    (summary, asked, h.input.events())
}

#[tokio::test]
async fn test_assist_mode_asks_before_risky_clicks() {
    let assist_risky = || Flags {
        assist: true,
        risky: true,
        ..Flags::default()
    };

    let (summary, asked, events) = run_with_answer(assist_risky(), false).await;
    assert_eq!((summary.actions, asked), (0, 1));
    assert!(events.is_empty());

    let (summary, asked, events) = run_with_answer(assist_risky(), true).await;
    assert_eq!((summary.actions, asked), (1, 1));
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_assist_mode_skips_prompt_for_safe_plans() {
    let flags = Flags {
        assist: true,
        ..Flags::default()
    };
    let (summary, asked, _) = run_with_answer(flags, false).await;
    assert_eq!((summary.actions, asked), (1, 0));
}

#[tokio::test]
async fn test_missing_window_ends_the_run() {
    let mut h = harness(Arc::new(NullWindowService), Flags::default());
    let summary = h.pipeline.run().await.unwrap();
    assert_eq!(summary, RunSummary::default());
    assert!(h.input.events().is_empty());
}

#[tokio::test]
async fn test_stop_flag_prevents_iterations() {
    let mut h = harness(Arc::new(GameWindow), Flags::default());
    h.pipeline
        .stop_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(h.pipeline.run().await.unwrap().frames, 0);
}
