use clap::Parser;
use std::path::PathBuf;

use crate::render::VisualizerKind;

#[derive(Parser, Debug)]
#[command(name = "vizplay", about = "Audio file player with a live frequency visualizer")]
pub struct Cli {
    /// Audio file to load on startup (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Render to this video file instead of opening a window
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Visualizer
    #[arg(short, long, value_enum, default_value_t = VisualizerKind::Bars)]
    pub mode: VisualizerKind,

    /// Surface width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Surface height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second (1-240)
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,

    /// Transform window size (power of two, 32-32768). Defaults per mode.
    #[arg(long)]
    pub fft_size: Option<usize>,

    /// Analyser smoothing time constant (0.0-1.0). Defaults per mode.
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Number of bars in bars mode (default: one per frequency bin)
    #[arg(long)]
    pub bars: Option<usize>,

    /// Title text overlay
    #[arg(long)]
    pub title: Option<String>,

    /// Show elapsed time overlay
    #[arg(long)]
    pub show_time: bool,

    /// Font file for text overlays
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Download the overlay font from this URL
    #[arg(long)]
    pub font_url: Option<String>,

    /// Seed for particle placement, for reproducible renders
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds to wait for a decode before giving up
    #[arg(long, default_value_t = 30)]
    pub decode_timeout: u64,

    /// Do not open a window; frames are drawn and discarded
    #[arg(long)]
    pub headless: bool,

    /// Wait for `start` after a file finishes decoding
    #[arg(long)]
    pub no_autoplay: bool,

    /// Config file (default: vizplay.toml, then ~/.config/vizplay/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,
}
