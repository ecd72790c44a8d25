//! Typed configuration.
//!
//! Built from defaults, then an optional TOML file, then environment
//! variables; the binary applies CLI flags last. Validated once at
//! startup so that a bad value fails before the terminal is taken over.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of workers (and UI slots).
    pub workers: usize,
    /// Task channel capacity. `None` means one slot per worker.
    pub queue_capacity: Option<usize>,
    /// Duration of one simulated unit of work.
    pub work_ms: u64,
    /// Optional upper bound on one unit of work.
    pub work_timeout_ms: Option<u64>,
    /// Busy indicator frame interval.
    pub tick_ms: u64,
    /// Maximum length of a task typed into the input.
    pub input_char_limit: usize,
    /// Directory for `log.txt`, `log.json` and `logs.db`.
    pub log_dir: PathBuf,
    pub log_level: String,
    pub otel_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: None,
            work_ms: 5_000,
            work_timeout_ms: None,
            tick_ms: 100,
            input_char_limit: 156,
            log_dir: PathBuf::from("tmp"),
            log_level: "debug".to_string(),
            otel_endpoint: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Load a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read config {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))
    }

    /// Overlay any of the `WORKPOOL_*`, `LOG_LEVEL` and `OTEL_ENDPOINT`
    /// variables that are set.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(n) = parse_var("WORKPOOL_WORKERS")? {
            self.workers = n;
        }
        if let Some(n) = parse_var("WORKPOOL_QUEUE_CAPACITY")? {
            self.queue_capacity = Some(n);
        }
        if let Some(ms) = parse_var("WORKPOOL_WORK_MS")? {
            self.work_ms = ms;
        }
        if let Some(ms) = parse_var("WORKPOOL_WORK_TIMEOUT_MS")? {
            self.work_timeout_ms = Some(ms);
        }
        if let Some(ms) = parse_var("WORKPOOL_TICK_MS")? {
            self.tick_ms = ms;
        }
        if let Some(dir) = optional_var("WORKPOOL_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(level) = optional_var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(endpoint) = optional_var("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(endpoint);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == Some(0) {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.tick_ms == 0 {
            return Err(Error::Config("tick_ms must be at least 1".to_string()));
        }
        if self.work_timeout_ms == Some(0) {
            return Err(Error::Config("work_timeout_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers)
    }

    pub fn work_duration(&self) -> Duration {
        Duration::from_millis(self.work_ms)
    }

    pub fn work_timeout(&self) -> Option<Duration> {
        self.work_timeout_ms.map(Duration::from_millis)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    optional_var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("environment variable {name}={raw:?}: {e}")))
        })
        .transpose()
}
