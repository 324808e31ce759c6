/// Configuration loader
use super::schema::Config;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Path of the adjacent config file: `<executable>.config`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let exe_path = std::env::current_exe().map_err(ConfigError::Executable)?;
    Ok(PathBuf::from(format!("{}.config", exe_path.display())))
}

/// Load configuration from adjacent .config file
/// Config file should be in the same directory as the executable
/// Named: <executable>.config (e.g., "myapp.config")
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&default_config_path()?)
}

/// Load and validate configuration from an explicit path
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config_content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = serde_json::from_str(&config_content)?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "app_name": "billing", "license_key": "k==", "log_level": "warn" }}"#
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.app_name, "billing");
        assert_eq!(config.license_key, "k==");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ invalid json }}").unwrap();
        assert!(matches!(
            load_config_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "request_timeout_secs": 0 }}"#).unwrap();
        assert!(matches!(
            load_config_from(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config_from(Path::new("/no/such/dir/app.config"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_default_path_is_next_to_executable() {
        let path = default_config_path().unwrap();
        assert!(path.to_string_lossy().ends_with(".config"));
    }
}
