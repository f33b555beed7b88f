use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::VizError;
use crate::render::bars::BarAnchor;
use crate::render::polar::BandSplit;
use crate::render::scheduler::MAX_FPS;
use crate::render::VisualizerKind;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub visual: VisualConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    pub font: Option<PathBuf>,
    pub font_url: Option<String>,
}

/// Analyser overrides. Unset values fall back to the mode's defaults.
#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub fft_size: Option<usize>,
    pub smoothing: Option<f32>,
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
    #[serde(default = "default_decode_timeout")]
    pub decode_timeout_secs: u64,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

#[derive(Debug, Deserialize)]
pub struct VisualConfig {
    #[serde(default)]
    pub mode: VisualizerKind,
    pub bars: Option<usize>,
    #[serde(default = "default_bar_gap")]
    pub bar_gap: f32,
    #[serde(default = "default_bar_height_scale")]
    pub bar_height_scale: f32,
    #[serde(default)]
    pub bar_anchor: BarAnchor,
    pub bar_color: Option<String>,
    pub background: Option<String>,
    #[serde(default)]
    pub band_split: BandSplit,
    #[serde(default = "default_particle_threshold")]
    pub particle_threshold: f32,
    #[serde(default = "default_trails")]
    pub trails: bool,
}

impl Config {
    /// Reject values that parse but cannot be rendered.
    pub fn validate(&self) -> Result<(), VizError> {
        if self.output.fps == 0 || self.output.fps > MAX_FPS {
            return Err(VizError::InvalidFps(self.output.fps));
        }
        self.visual.band_split.validate()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            font: None,
            font_url: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: None,
            smoothing: None,
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
            decode_timeout_secs: default_decode_timeout(),
            autoplay: default_autoplay(),
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            mode: VisualizerKind::default(),
            bars: None,
            bar_gap: default_bar_gap(),
            bar_height_scale: default_bar_height_scale(),
            bar_anchor: BarAnchor::default(),
            bar_color: None,
            background: None,
            band_split: BandSplit::default(),
            particle_threshold: default_particle_threshold(),
            trails: default_trails(),
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 60 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_min_decibels() -> f32 { -100.0 }
fn default_max_decibels() -> f32 { -30.0 }
fn default_decode_timeout() -> u64 { 30 }
fn default_autoplay() -> bool { true }
fn default_bar_gap() -> f32 { 2.0 }
fn default_bar_height_scale() -> f32 { 1.0 }
fn default_particle_threshold() -> f32 { 0.4 }
fn default_trails() -> bool { true }

/// Explicit path, else `vizplay.toml` in the working directory, else the
/// per-user config locations.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("vizplay.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("vizplay").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("vizplay").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}
