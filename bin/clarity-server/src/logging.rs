//! Tracing subscriber setup: console output (pretty or JSON) plus an
//! optional daily-rolling file.

use std::path::Path;

use anyhow::{Context, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::Config;

/// Keeps the non-blocking file writer alive. Drop it to flush.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// `RUST_LOG` wins; otherwise `level`, or `info` when `level` does not
/// parse.
pub fn env_filter(level: &str) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: CLARITY_LOG='{level}' is not a valid tracing filter ({e}); \
                     falling back to 'info'"
                );
                EnvFilter::new("info")
            }
        },
    }
}

pub fn init(cfg: &Config) -> anyhow::Result<LogGuard> {
    let console = if cfg.log_json {
        fmt::layer().json().with_target(true).with_thread_ids(true).boxed()
    } else {
        fmt::layer().with_target(true).with_thread_ids(true).boxed()
    };

    let (file_layer, guard) = match &cfg.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("CLARITY_LOG_FILE has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;

            let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, name));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_target(true)
                .with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&cfg.log_level))
        .with(console)
        .with(file_layer)
        .try_init()?;

    if let Some(path) = &cfg.log_file {
        tracing::info!(path = %path.display(), "logging to file");
    }
    Ok(LogGuard { _file: guard })
}
