use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::params::{
    DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_CEILING_DB, DEFAULT_FLOOR_DB,
    DEFAULT_FRAME_LENGTH, DEFAULT_SAMPLE_RATE, DEFAULT_TOP_BIN, DEFAULT_VOLUME,
};
use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "sonoscore.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub levels: LevelsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanvasConfig {
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,
    #[serde(default = "default_top_bin")]
    pub top_bin: usize,
    /// Preferred microphone capture rate. Files always play at their own rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelsConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_floor_db")]
    pub floor_db: f32,
    #[serde(default = "default_ceiling_db")]
    pub ceiling_db: f32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    /// Poll interval of the presentation loop.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_length: default_frame_length(),
            top_bin: default_top_bin(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            floor_db: default_floor_db(),
            ceiling_db: default_ceiling_db(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_ms: default_refresh_ms(),
        }
    }
}

fn default_width() -> usize { DEFAULT_CANVAS_WIDTH }
fn default_height() -> usize { DEFAULT_CANVAS_HEIGHT }
fn default_frame_length() -> usize { DEFAULT_FRAME_LENGTH }
fn default_top_bin() -> usize { DEFAULT_TOP_BIN }
fn default_sample_rate() -> u32 { DEFAULT_SAMPLE_RATE }
fn default_volume() -> f32 { DEFAULT_VOLUME }
fn default_floor_db() -> f32 { DEFAULT_FLOOR_DB }
fn default_ceiling_db() -> f32 { DEFAULT_CEILING_DB }
fn default_refresh_ms() -> u64 { 20 }

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Configuration(format!("invalid config: {}", e)))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("cannot read config {}: {}", path.display(), e))
    })?;
    parse_config(&content)
        .map_err(|e| Error::Configuration(format!("{} ({})", e, path.display())))
}

/// Explicit path first, then `./sonoscore.toml`, then the per-user config
/// locations.
pub fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonoscore").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonoscore").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
