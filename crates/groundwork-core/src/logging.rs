//! Console and rolling-file logging
//!
//! Installed once per process, after the log root has been confirmed, so the
//! file appender never has to create the directory itself.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogRotation, LogSettings};
use crate::error::{BootstrapError, Result};

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Build the rolling file appender for `log_root`.
pub fn file_appender(settings: &LogSettings, log_root: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(settings.rotation.into())
        .filename_prefix(&settings.file_prefix)
        .max_log_files(settings.max_files)
        .build(log_root)
        .map_err(|e| BootstrapError::StorageUnavailable {
            path: log_root.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Install the global subscriber: stdout plus a non-blocking file layer.
///
/// The returned guard flushes the file layer on drop; hold it until exit.
pub fn init(settings: &LogSettings, log_root: &Path, verbose: bool) -> Result<WorkerGuard> {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(settings, log_root)?);

    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
    };

    // Stdout layer
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(settings.ansi)
        .with_target(verbose);

    // File layer
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BootstrapError::Config(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_appender_writes_into_log_root() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = LogSettings {
            file_prefix: "svc.log".to_string(),
            rotation: LogRotation::Never,
            ..LogSettings::default()
        };

        let mut appender = file_appender(&settings, tmp.path()).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let content = std::fs::read_to_string(tmp.path().join("svc.log")).unwrap();
        assert_eq!(content, "hello\n");
    }

    #[test]
    fn test_rotation_mapping() {
        assert_eq!(Rotation::from(LogRotation::Hourly), Rotation::HOURLY);
        assert_eq!(Rotation::from(LogRotation::Never), Rotation::NEVER);
    }
}
