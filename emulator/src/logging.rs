//! Logging setup: console plus a per-run log file.

use crate::{EmulatorError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "emulator=info,info";

/// Create `emulator-<timestamp>.log` in `dir`.
pub fn create_log_file(dir: &Path) -> Result<(PathBuf, File)> {
    let path = dir.join(format!(
        "emulator-{}.log",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f")
    ));
    let file = File::create(&path).map_err(|source| EmulatorError::LogFile {
        path: path.display().to_string(),
        source,
    })?;
    Ok((path, file))
}

/// Install the global subscriber. Returns the log file path.
pub fn init(dir: &Path) -> Result<PathBuf> {
    let (path, file) = create_log_file(dir)?;
    println!("Logging to {}", path.display());

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
        ))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .map_err(|e| EmulatorError::Logging(e.to_string()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_created_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _file) = create_log_file(dir.path()).unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("emulator-"));
    }

    #[test]
    fn test_log_file_failure_is_fatal() {
        let err = create_log_file(Path::new("/nonexistent/emulator/logs")).unwrap_err();
        assert!(matches!(err, EmulatorError::LogFile { .. }));
    }
}
