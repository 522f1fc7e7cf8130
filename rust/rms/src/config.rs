//! Configuration: where the database and vault live, and how much the
//! worker pool is allowed to run concurrently. Resolution order mirrors
//! the teacher's `dirs`-based directory layout: an explicit path, then a
//! persisted config file, then a per-OS default under the user's data
//! directory.

use std::env;
use std::fs;
use std::path::PathBuf;

use rms_common::serde::{Deserialize, Serialize};

/// Where `rms` keeps its own config/state, analogous to `binaries_dir()` in
/// the teacher's `binaries` crate.
pub fn data_dir(ensure: bool) -> std::io::Result<PathBuf> {
    let base = rms_common::dirs::data_dir().unwrap_or_else(|| env::current_dir().unwrap());
    let dir = match env::consts::OS {
        "macos" | "windows" => base.join("Rms"),
        _ => base.join("rms"),
    };
    if ensure {
        fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde", rename_all = "lowercase")]
pub enum LoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LoggingLevel {
    fn as_str(self) -> &'static str {
        match self {
            LoggingLevel::Trace => "trace",
            LoggingLevel::Debug => "debug",
            LoggingLevel::Info => "info",
            LoggingLevel::Warn => "warn",
            LoggingLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde", rename_all = "lowercase")]
pub enum LoggingFormat {
    Simple,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde", default)]
pub struct LoggingConfig {
    pub level: LoggingLevel,
    pub format: LoggingFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LoggingLevel::Info,
            format: LoggingFormat::Simple,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde", default)]
pub struct Config {
    pub db_path: PathBuf,
    pub vault_dir: PathBuf,
    pub worker_capacity: usize,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let dir = data_dir(false).unwrap_or_else(|_| PathBuf::from("."));
        Self {
            db_path: dir.join("store.sqlite3"),
            vault_dir: dir.join("vault"),
            worker_capacity: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    fn config_file() -> std::io::Result<PathBuf> {
        Ok(data_dir(true)?.join("config.json"))
    }

    /// Load the persisted config, falling back to defaults, then applying
    /// `RMS_DB_PATH`/`RMS_VAULT_DIR`/`RMS_WORKER_CAPACITY` overrides.
    pub fn load() -> rms_graph::Result<Self> {
        let mut config = match Self::config_file() {
            Ok(path) if path.exists() => {
                let text = fs::read_to_string(path)?;
                rms_common::serde_json::from_str(&text).unwrap_or_default()
            }
            _ => Self::default(),
        };

        if let Ok(path) = env::var("RMS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("RMS_VAULT_DIR") {
            config.vault_dir = PathBuf::from(path);
        }
        if let Ok(n) = env::var("RMS_WORKER_CAPACITY") {
            if let Ok(n) = n.parse() {
                config.worker_capacity = n;
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> rms_graph::Result<()> {
        let path = Self::config_file()?;
        let text = rms_common::serde_json::to_string_pretty(self)
            .expect("Config always serializes");
        fs::write(path, text)?;
        Ok(())
    }
}

pub mod logging {
    use super::{LoggingConfig, LoggingFormat};
    use tracing_subscriber::EnvFilter;

    /// Install the global tracing subscriber. Call once, near the start of
    /// `main`; a second call is a programming error (the teacher's
    /// `logging::init` has the same one-shot contract).
    pub fn init(config: &LoggingConfig) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
        match config.format {
            LoggingFormat::Simple => subscriber.compact().init(),
            LoggingFormat::Json => subscriber.json().init(),
        }
    }
}
