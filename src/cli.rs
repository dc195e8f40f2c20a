use clap::{Args, Parser, Subcommand, ValueEnum};
use hk3_config::RemoteOverrides;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "hk3-bot", version)]
#[command(about = "Screen-reading automation bot for the Humankind 3 Roblox game")]
pub struct Cli {
    /// Bot configuration file (JSON)
    #[arg(short, long, global = true, default_value = "config/hk3.json")]
    pub config: PathBuf,

    /// Profile to use from the configuration
    #[arg(short, long, global = true, default_value = "default")]
    pub profile: String,

    /// Verbose logging; `run` also writes debug artifacts
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the capture, detect, plan and act loop
    Run(RunArgs),

    /// Grab frames and report which anchors are detected
    Calibrate {
        /// Stop after this many frames (default: until Ctrl+C)
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Run anchor detection and ROI resolution on a saved screenshot
    Analyze {
        /// Screenshot of the game's client area
        screenshot: PathBuf,

        /// Directory for ROI crops and the annotated image (default: debug_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read text from every resolved ROI
        #[arg(long)]
        ocr: bool,
    },

    /// Validate the configuration and print it with defaults filled in
    CheckConfig,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Ask before executing plans that need confirmation
    #[arg(long)]
    pub assist: bool,

    /// Override the profile frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    #[arg(long, value_enum, default_value_t = PlannerKind::Rules)]
    pub planner: PlannerKind,

    /// Plan but never send input
    #[arg(long)]
    pub dry_run: bool,

    /// Read text from every resolved ROI
    #[arg(long)]
    pub ocr: bool,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Model name for the remote or gemini planner
    #[arg(long, alias = "gemini-model")]
    pub remote_model: Option<String>,

    /// Minimum seconds between remote planner calls
    #[arg(long, alias = "gemini-interval", value_parser = parse_seconds)]
    pub remote_interval: Option<Duration>,

    /// Do not send the captured frame to the remote planner
    #[arg(long, alias = "gemini-no-vision")]
    pub remote_no_vision: bool,
}

impl RunArgs {
    pub fn remote_overrides(&self) -> RemoteOverrides {
        RemoteOverrides {
            model: self.remote_model.clone(),
            min_interval: self.remote_interval,
            no_vision: self.remote_no_vision,
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("'{}' is not a valid interval", value))
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlannerKind {
    /// Click configured anchors when they appear
    #[default]
    Rules,
    /// Write state.json and replay planner_response.json
    Stub,
    /// Ask a remote chat-completion model (`remote_planner` settings)
    Remote,
    /// Ask Gemini through its OpenAI-compatible endpoint (reads GEMINI_API_KEY)
    Gemini,
}
