use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "hk3-bot.log";

fn default_filter(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    [
        "hk3_bot",
        "hk3_bot_lib",
        "hk3_capture",
        "hk3_vision",
        "hk3_config",
        "hk3_state",
        "hk3_planner",
        "hk3_input",
    ]
    .iter()
    .map(|target| format!("{}={}", target, level))
    .collect::<Vec<_>>()
    .join(",")
}

/// Install the global subscriber: stdout always, plus `<logs_dir>/hk3-bot.log`
/// when a log directory is given and writable. `RUST_LOG` overrides the filter.
pub fn init(debug: bool, logs_dir: Option<&Path>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let mut file_error = None;
    let file_layer = logs_dir.and_then(|dir| {
        let opened = std::fs::create_dir_all(dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE))
        });
        match opened {
            Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file))),
            Err(e) => {
                file_error = Some((dir.join(LOG_FILE), e));
                None
            }
        }
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        return;
    }

    if let Some((path, e)) = file_error {
        tracing::warn!("Cannot write log file {}: {}", path.display(), e);
    }
}
