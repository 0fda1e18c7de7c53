//! Shared logging utilities for Radon binaries.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "radon_jobs=info,radon_server=info";

/// Logging configuration shared by Radon binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Raise the console filter to debug for every radon crate.
    pub verbose: bool,
    /// Also append to `<home>/logs/<app_name>.log`.
    pub log_to_file: bool,
}

/// Initialize tracing with a stderr layer and an optional file layer.
///
/// `RUST_LOG` overrides the default filter for both layers.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let directives = if config.verbose {
        "radon_jobs=debug,radon_server=debug".to_string()
    } else {
        std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string())
    };

    let file_layer = if config.log_to_file {
        let logs = ensure_logs_dir().context("Failed to ensure log directory")?;
        let path = logs.join(format!("{}.log", sanitize_name(config.app_name)));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(EnvFilter::new(&directives)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(&directives)),
        )
        .init();

    Ok(())
}

/// The Radon home directory: `~/.radon`, overridable through `RADON_HOME`.
pub fn radon_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("RADON_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".radon")
}

/// The logs directory: `<home>/logs`.
pub fn logs_dir() -> PathBuf {
    radon_home().join("logs")
}

/// Create the logs directory if needed.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_app_names() {
        assert_eq!(sanitize_name("radon-server"), "radon-server");
        assert_eq!(sanitize_name("bad name/1"), "bad_name_1");
    }

    #[test]
    fn home_honours_the_environment_override() {
        let temp = tempfile::TempDir::new().unwrap();
        std::env::set_var("RADON_HOME", temp.path());
        assert_eq!(radon_home(), temp.path());
        assert_eq!(logs_dir(), temp.path().join("logs"));

        let logs = ensure_logs_dir().unwrap();
        assert!(logs.is_dir());
        std::env::remove_var("RADON_HOME");
    }
}
