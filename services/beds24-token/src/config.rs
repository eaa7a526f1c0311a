//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The invite code is loaded from the BEDS24_INVITE_CODE env var or
//! invite_code_file, never stored in the TOML directly to avoid leaking secrets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use beds24_auth::{DEFAULT_BASE_URL, DEFAULT_REFRESH_VALIDITY_DAYS, DEFAULT_TIMEOUT_SECS};
use common::Secret;
use serde::Deserialize;

/// Env var carrying an invite code, overriding `invite_code_file`
pub const INVITE_CODE_ENV: &str = "BEDS24_INVITE_CODE";

/// Default config file name, resolved against the working directory
pub const DEFAULT_CONFIG_FILE: &str = "beds24-token.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Beds24 API endpoint settings
#[derive(Debug, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout budget for each remote call
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Where record files live
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

/// Token lifetime and invite code settings
#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_refresh_validity_days")]
    pub refresh_validity_days: u32,
    #[serde(skip)]
    pub invite_code: Option<Secret<String>>,
    /// Path to a file containing an invite code (alternative to BEDS24_INVITE_CODE)
    #[serde(default)]
    pub invite_code_file: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_refresh_validity_days() -> u32 {
    DEFAULT_REFRESH_VALIDITY_DAYS
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            refresh_validity_days: default_refresh_validity_days(),
            invite_code: None,
            invite_code_file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Load `path` if it exists. A missing file is only an error when the
    /// path was given explicitly; otherwise built-in defaults apply.
    pub fn load_or_default(path: &Path, explicit: bool) -> common::Result<Self> {
        if explicit || path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    /// Validate and resolve the invite code.
    ///
    /// Invite code resolution order:
    /// 1. BEDS24_INVITE_CODE env var
    /// 2. invite_code_file path from config
    fn finish(mut self) -> common::Result<Self> {
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if self.remote.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.credentials.refresh_validity_days == 0 {
            return Err(common::Error::Config(
                "refresh_validity_days must be greater than 0".into(),
            ));
        }

        if let Some(code) = std::env::var(INVITE_CODE_ENV)
            .ok()
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
        {
            self.credentials.invite_code = Some(Secret::new(code));
        } else if let Some(ref code_file) = self.credentials.invite_code_file {
            let code = std::fs::read_to_string(code_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read invite_code_file {}: {e}",
                    code_file.display()
                ))
            })?;
            let code = code.trim().to_owned();
            if !code.is_empty() {
                self.credentials.invite_code = Some(Secret::new(code));
            }
        }

        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    pub fn refresh_validity(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::days(i64::from(self.credentials.refresh_validity_days))
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag reports whether the path was chosen explicitly.
    pub fn resolve_path(cli_path: Option<&Path>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (p.to_path_buf(), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }
}
