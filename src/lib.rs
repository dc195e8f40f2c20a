pub mod analysis;
pub mod cli;
mod commands;
mod logging;
pub mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use hk3_config::BotConfig;

use cli::{Cli, Command};

pub use commands::build_planner;

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let loaded = BotConfig::load(&cli.config);
    logging::init(
        cli.debug,
        loaded.as_ref().ok().and_then(|c| c.logs_dir.as_deref()),
    );
    let config =
        loaded.with_context(|| format!("invalid configuration {}", cli.config.display()))?;
    tracing::info!("Loaded config {} ({})", cli.config.display(), config.summary());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Command::Run(args) => {
            runtime.block_on(commands::run(&config, &cli.profile, cli.debug, &args))?;
        }
        Command::Calibrate { frames } => {
            runtime.block_on(commands::calibrate(&config, &cli.profile, frames))?;
        }
        Command::Analyze {
            screenshot,
            output,
            ocr,
        } => {
            let output = output.unwrap_or_else(|| config.debug_dir.clone());
            commands::analyze(&config, &cli.profile, &screenshot, &output, ocr)?;
        }
        Command::CheckConfig => commands::check_config(&config, &cli.profile)?,
    }
    Ok(())
}
