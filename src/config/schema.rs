/// Configuration schema for the license gate
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Log levels accepted in `log_level`
pub const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error", "none"];

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Name of the protected application, used in log lines
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Master switch; `false` skips every check with a warning
    #[serde(default = "default_true")]
    pub license_enabled: bool,

    /// License key issued for this device (local mode)
    #[serde(default)]
    pub license_key: String,

    /// Try the authorization server before the local key
    #[serde(default)]
    pub online_license_enabled: bool,

    /// Authorization URL, RSA-encrypted with the provisioned public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_auth_url: Option<String>,

    /// Private key, AES-encrypted with the artifact hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,

    /// Override of the hidden cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// File whose hash unlocks the private key (default: running executable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,

    /// Authorization request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log level: "debug", "info", "warn", "error", "none"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_app_name() -> String {
    "application".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            license_enabled: true,
            license_key: String::new(),
            online_license_enabled: false,
            encrypted_auth_url: None,
            encrypted_private_key: None,
            cache_dir: None,
            artifact_path: None,
            request_timeout_secs: default_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

/// Compile-time value wins over the file value when it is non-empty
fn prefer_compiled(compiled: Option<&'static str>, configured: &Option<String>) -> Option<String> {
    match compiled {
        Some(value) if !value.is_empty() => Some(value.to_string()),
        _ => configured.clone().filter(|value| !value.trim().is_empty()),
    }
}

impl Config {
    /// Get the effective encrypted auth URL, prioritizing compile-time default
    pub fn effective_auth_url(&self) -> Option<String> {
        prefer_compiled(
            option_env!("LICENSE_GATE_ENCRYPTED_AUTH_URL"),
            &self.encrypted_auth_url,
        )
    }

    /// Get the effective encrypted private key, prioritizing compile-time default
    pub fn effective_private_key(&self) -> Option<String> {
        prefer_compiled(
            option_env!("LICENSE_GATE_ENCRYPTED_PRIVATE_KEY"),
            &self.encrypted_private_key,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.log_level
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.license_enabled && self.online_license_enabled {
            if self.effective_auth_url().is_none() {
                return Err(ConfigError::Invalid(
                    "encrypted_auth_url is required when online_license_enabled is set".to_string(),
                ));
            }
            if self.effective_private_key().is_none() {
                return Err(ConfigError::Invalid(
                    "encrypted_private_key is required when online_license_enabled is set"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}
