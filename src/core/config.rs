//! Persistent configuration: server location, default model, and the
//! typing-animation cadence. Stored as TOML in the platform config
//! directory; saves go through a named temp file so a crash mid-write can
//! never truncate the config.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::render::animate::AnimationOptions;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the chat service.
    pub server_url: Option<String>,
    /// Model requested when none is given on the command line.
    pub default_model: Option<String>,
    /// Per-character reveal delay for the typing animation, in milliseconds.
    pub char_delay_ms: Option<u64>,
    /// Pause after a committed code block, in milliseconds.
    pub post_code_delay_ms: Option<u64>,
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", "parley")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("parley.toml"))
    }

    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        Self::load_from_path(&Self::config_path())
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            let config: Config =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to_path(&Self::config_path())
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(config_path)?;
        Ok(())
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn default_model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn animation_options(&self) -> AnimationOptions {
        let defaults = AnimationOptions::default();
        AnimationOptions {
            char_delay: self
                .char_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.char_delay),
            post_code_delay: self
                .post_code_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.post_code_delay),
        }
    }

    /// Apply a `set` from the command line. Keys use kebab-case, matching
    /// the CLI surface rather than the TOML field names.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "server-url" => self.server_url = Some(value.to_string()),
            "default-model" => self.default_model = Some(value.to_string()),
            "char-delay-ms" => self.char_delay_ms = Some(parse_millis(key, value)?),
            "post-code-delay-ms" => self.post_code_delay_ms = Some(parse_millis(key, value)?),
            _ => return Err(format!("Unknown config key: {key}")),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: &str) -> Result<(), String> {
        match key {
            "server-url" => self.server_url = None,
            "default-model" => self.default_model = None,
            "char-delay-ms" => self.char_delay_ms = None,
            "post-code-delay-ms" => self.post_code_delay_ms = None,
            _ => return Err(format!("Unknown config key: {key}")),
        }
        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("Value for {key} must be a whole number of milliseconds"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.server_url = Some("http://example.com:5000".to_string());
        config.char_delay_ms = Some(4);
        config.save_to_path(&path).expect("save");

        let loaded = Config::load_from_path(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let loaded = Config::load_from_path(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.server_url(), DEFAULT_SERVER_URL);
        assert_eq!(loaded.default_model(), DEFAULT_MODEL);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "server_url = [not toml").expect("write");

        let err = Config::load_from_path(&path).expect_err("should fail");
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn animation_options_fall_back_to_contract_defaults() {
        let config = Config::default();
        let options = config.animation_options();
        assert_eq!(options.char_delay, Duration::from_millis(8));
        assert_eq!(options.post_code_delay, Duration::from_millis(150));

        let mut config = Config::default();
        config.set("char-delay-ms", "2").expect("set");
        assert_eq!(
            config.animation_options().char_delay,
            Duration::from_millis(2)
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut config = Config::default();
        assert!(config.set("theme", "dark").is_err());
        assert!(config.unset("theme").is_err());
        assert!(config.set("char-delay-ms", "fast").is_err());
    }
}
