//! Application configuration: RON file, then environment, then command line.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lab_logging::lab_info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use threshlab_engine::{ClientSettings, DEFAULT_API_BASE_URL, DEFAULT_CHUNK_SIZE};

pub const CONFIG_FILENAME: &str = "threshlab.ron";
pub const API_BASE_URL_ENV: &str = "THRESHLAB_API_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    /// Re-fetch the session every `refresh_interval_secs` while watching.
    pub keep_fresh: bool,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub chunk_size_bytes: u64,
    pub refresh_interval_secs: u64,
    pub poll_interval_secs: u64,
    /// 0 keeps polling until the job settles.
    pub max_poll_failures: u32,
    pub parallel_files: usize,
    /// Where `.threshlab_state.ron` lives.
    pub state_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            keep_fresh: true,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            refresh_interval_secs: 3,
            poll_interval_secs: 3,
            max_poll_failures: 5,
            parallel_files: 1,
            state_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Loads `explicit` if given (it must exist), else `./threshlab.ron` when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILENAME), false),
        };
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let config = Self::from_ron(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        lab_info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Base URL from `--api-base-url` or its environment fallback; blank values are ignored.
    pub fn apply_override(&mut self, base_url: Option<String>) {
        if let Some(base_url) = base_url {
            let trimmed = base_url.trim();
            if !trimmed.is_empty() {
                self.api_base_url = trimmed.to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size_bytes == 0 {
            return Err(ConfigError::Invalid("chunk_size_bytes must be positive".into()));
        }
        if self.parallel_files == 0 {
            return Err(ConfigError::Invalid("parallel_files must be at least 1".into()));
        }
        if self.refresh_interval_secs == 0 || self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("intervals must be at least one second".into()));
        }
        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api_base_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            chunk_size: self.chunk_size_bytes,
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_poll_failures: self.max_poll_failures,
            parallel_files: self.parallel_files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = AppConfig::from_ron(
            r#"(api_base_url: "http://lab:8000/api", parallel_files: 2, max_poll_failures: 0)"#,
        )
        .unwrap();

        assert_eq!(config.api_base_url, "http://lab:8000/api");
        assert_eq!(config.parallel_files, 2);
        assert_eq!(config.max_poll_failures, 0);
        assert_eq!(config.chunk_size_bytes, 1024 * 1024);
        assert_eq!(config.poll_interval_secs, 3);
    }

    #[test]
    fn override_replaces_file_value_unless_blank() {
        let mut config = AppConfig::from_ron(r#"(api_base_url: "http://file/api")"#).unwrap();
        config.apply_override(None);
        assert_eq!(config.api_base_url, "http://file/api");

        config.apply_override(Some(" http://cli/api ".into()));
        assert_eq!(config.api_base_url, "http://cli/api");

        config.apply_override(Some("  ".into()));
        assert_eq!(config.api_base_url, "http://cli/api");
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.ron");

        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn explicit_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.ron");
        fs::write(&path, "(keep_fresh: false, chunk_size_bytes: 4096)").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(!config.keep_fresh);
        assert_eq!(config.client_settings().chunk_size, 4096);

        fs::write(&path, "(keep_fresh: maybe)").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let config = AppConfig {
            chunk_size_bytes: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AppConfig::default().validate().is_ok());
    }
}
