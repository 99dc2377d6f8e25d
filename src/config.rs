//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$DRSREPORT_CONFIG` (environment variable)
//! 2. `~/.config/drsreport/config.toml` (Linux/macOS)
//!    `%APPDATA%\drsreport\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override individual values after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::mailbox::auth::CredentialPaths;
use crate::mailbox::gmail::DEFAULT_API_BASE;
use crate::mailbox::query::DateRange;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Attachment retrieval settings.
    pub mailbox: MailboxConfig,
    /// Report aggregation settings.
    pub aggregate: AggregateConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Attachment retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// OAuth client secret downloaded from the cloud console.
    pub credentials_file: PathBuf,
    /// Persisted token, written after the first authorization.
    pub token_file: PathBuf,
    /// Directory receiving downloaded reports (created if missing).
    pub report_dir: PathBuf,
    /// First day searched, inclusive (`YYYY/MM/DD` or `YYYY-MM-DD`).
    pub start_date: Option<String>,
    /// Day the search stops, exclusive.
    pub end_date: Option<String>,
    /// Mailbox API base URL.
    pub api_base_url: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

/// Report aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Directory of reports to read; defaults to `mailbox.report_dir`.
    pub source_dir: Option<PathBuf>,
    /// Summary CSV to write.
    pub output_csv: PathBuf,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from("credentials.json"),
            token_file: PathBuf::from("token.json"),
            report_dir: PathBuf::from("drs_reports"),
            start_date: None,
            end_date: None,
            api_base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            output_csv: PathBuf::from("drs_master_mp3s.csv"),
        }
    }
}

// ── Derived values ──────────────────────────────────────────────

impl Config {
    /// The search window, validated.
    pub fn date_range(&self) -> Result<DateRange> {
        let start = self.mailbox.start_date.as_deref().ok_or_else(|| {
            ReportError::Config("no start date; set mailbox.start_date or pass --start".into())
        })?;
        let end = self.mailbox.end_date.as_deref().ok_or_else(|| {
            ReportError::Config("no end date; set mailbox.end_date or pass --end".into())
        })?;
        DateRange::parse(start, end)
    }

    /// Credential file locations.
    pub fn credential_paths(&self) -> CredentialPaths {
        CredentialPaths {
            client_secret: self.mailbox.credentials_file.clone(),
            token: self.mailbox.token_file.clone(),
        }
    }

    /// Directory the aggregator reads.
    pub fn source_dir(&self) -> &Path {
        self.aggregate
            .source_dir
            .as_deref()
            .unwrap_or(&self.mailbox.report_dir)
    }

    /// HTTP timeout.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.mailbox.timeout_secs.max(1))
    }
}

// ── Load ─────────────────────────────────────────────────

/// Load configuration from `explicit` if given, else from standard locations.
///
/// An explicit path must exist and parse. Otherwise the default configuration
/// is returned if no file is found or on parse error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        let cfg = toml::from_str::<Config>(&contents)
            .map_err(|e| ReportError::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "Loaded config");
        return Ok(cfg);
    }

    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return Ok(cfg);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Ok(Config::default())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("DRSREPORT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("drsreport").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drsreport")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("drsreport.log")
}
