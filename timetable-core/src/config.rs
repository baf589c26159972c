//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ALGORITHM_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for one server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen port. 0 lets the OS pick (used by tests).
    pub port: u16,
    /// Directory whose immediate subdirectories are algorithm packages.
    pub algorithms_dir: PathBuf,
    /// Wall-clock budget for one algorithm run.
    pub algorithm_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            algorithms_dir: PathBuf::from("./algorithms"),
            algorithm_timeout: DEFAULT_ALGORITHM_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides: `TIMETABLE_PORT` and
    /// `TIMETABLE_ALGO_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = std::env::var("TIMETABLE_PORT").ok().and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        if let Some(secs) = std::env::var("TIMETABLE_ALGO_TIMEOUT").ok().and_then(|v| v.parse().ok()) {
            config.algorithm_timeout = Duration::from_secs(secs);
        }

        config
    }
}
