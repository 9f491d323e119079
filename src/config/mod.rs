use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Resolved configuration for one invocation. Loaded from
/// `~/.config/watchlog.yml` (fallback `~/.watchlog.yml`); a default file
/// is written on first run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_file: PathBuf,
    pub media_player: String,
    pub datetime_display_format: String,
    pub latest_default_limit: u32,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_db_file")]
    db_file: String,
    #[serde(default = "default_media_player")]
    media_player: String,
    #[serde(default = "default_display_format")]
    datetime_display_format: String,
    #[serde(default = "default_latest_limit")]
    latest_default_limit: u32,
}

fn default_db_file() -> String {
    "~/.local/share/watchlog.sqlite".to_string()
}

fn default_media_player() -> String {
    "mpv".to_string()
}

fn default_display_format() -> String {
    "%Y-%m-%d %H:%M:%S %Z".to_string()
}

fn default_latest_limit() -> u32 {
    10
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Yaml(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

/// Locate the config file under `home`, writing the default one when
/// neither candidate exists, then load it.
pub fn load_or_create(home: &Path) -> Result<Config, ConfigError> {
    let primary = home.join(".config").join("watchlog.yml");
    let fallback = home.join(".watchlog.yml");

    let path = if primary.is_file() {
        primary
    } else if fallback.is_file() {
        fallback
    } else {
        if let Some(parent) = primary.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&primary, default_config_yaml())?;
        primary
    };
    load_config_file(&path, home)
}

pub fn load_config_file(path: &Path, home: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, home)
}

fn parse_config(content: &str, home: &Path) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(content)?;
    Ok(Config {
        db_file: expand_tilde(&raw.db_file, home),
        media_player: raw.media_player,
        datetime_display_format: raw.datetime_display_format,
        latest_default_limit: raw.latest_default_limit,
    })
}

pub fn default_config_yaml() -> String {
    r#"# Configuration file for the media history application, watchlog.
db_file: ~/.local/share/watchlog.sqlite
media_player: mpv
datetime_display_format: "%Y-%m-%d %H:%M:%S %Z"
latest_default_limit: 10
"#
    .to_string()
}

pub fn expand_tilde(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(path)
}
