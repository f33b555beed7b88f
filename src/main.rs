mod audio;
mod cli;
mod clock;
mod commands;
mod config;
mod encode;
mod error;
mod playback;
mod render;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::mpsc;
use std::time::Duration;

use audio::analyser::AnalyserSettings;
use audio::output::{AudioSink, SilentSink};
use cli::Cli;
use clock::{RealtimeClock, VirtualClock};
use config::{Config, VisualConfig};
use encode::ffmpeg::{EncoderSettings, FfmpegEncoder, FfplayViewer};
use encode::{FrameSink, NullFrameSink};
use playback::PlaybackController;
use render::bars::{BarStyle, BarVisualizer};
use render::color::Rgba;
use render::frame::GpuRasterizer;
use render::gpu::GpuContext;
use render::polar::{PolarStyle, PolarVisualizer};
use render::text::{load_font_from_url, TextOverlay};
use render::{Overlay, RenderLoop, Visualizer, VisualizerKind};
use session::{Session, SessionOptions};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::discover(cli.config.as_deref()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
            cfg.validate()
                .with_context(|| format!("Invalid config {}", path.display()))?;
            merge_config(&mut cli, &cfg);
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    let analyser = AnalyserSettings {
        fft_size: cli.fft_size.unwrap_or_else(|| cli.mode.default_fft_size()),
        smoothing: cli.smoothing.unwrap_or_else(|| cli.mode.default_smoothing()),
        min_decibels: cfg.audio.min_decibels,
        max_decibels: cfg.audio.max_decibels,
    };
    analyser.validate()?;

    log::info!("vizplay - audio visualizer");
    log::info!(
        "Mode: {:?}, {}x{} @ {}fps, fft size {}",
        cli.mode,
        cli.width,
        cli.height,
        cli.fps,
        analyser.fft_size
    );

    let offline = cli.output.is_some();
    let controller = PlaybackController::new(audio_sink(offline), analyser, cli.fps)?;

    log::info!("Initializing GPU...");
    let gpu = GpuContext::new()?;
    let render = RenderLoop::new(
        cli.width,
        cli.height,
        build_visualizer(&cli, &cfg.visual)?,
        build_overlay(&cli),
        Box::new(GpuRasterizer::new(gpu)),
    )?;
    let options = SessionOptions {
        decode_timeout: Duration::from_secs(cli.decode_timeout),
        autoplay: !cli.no_autoplay,
    };

    if let Some(ref output) = cli.output {
        let input = cli.input.as_ref().context("Rendering to a file needs an input audio file")?;
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        log::info!("Input: {}", input.display());
        log::info!("Output: {}", output.display());

        let settings = EncoderSettings {
            codec: cli.codec.clone(),
            pix_fmt: cli.pix_fmt.clone(),
            crf: cli.crf,
            bitrate: cli.bitrate.clone(),
        };
        let (width, height, fps) = (cli.width, cli.height, cli.fps);
        // The encoder opens only once the input has decoded.
        let placeholder = Box::new(NullFrameSink::default());
        let session = Session::new(controller, render, VirtualClock::new(), placeholder, options);
        session.run_offline(input, || {
            log::info!("Starting FFmpeg encoder...");
            let encoder = FfmpegEncoder::new(output, input, width, height, fps, &settings)?;
            Ok(Box::new(encoder) as Box<dyn FrameSink>)
        })?;
        log::info!("Done! Output: {}", output.display());
        return Ok(());
    }

    let frames: Box<dyn FrameSink> = if cli.headless {
        Box::new(NullFrameSink::default())
    } else {
        let title = cli.title.as_deref().unwrap_or("vizplay");
        Box::new(FfplayViewer::new(cli.width, cli.height, cli.fps, title)?)
    };

    let mut session = Session::new(controller, render, RealtimeClock::new(), frames, options);
    if let Some(ref input) = cli.input {
        if let Err(err) = session.load_file(input) {
            session::report_decode_error(&input.display().to_string(), &err);
        }
    }

    let (sender, receiver) = mpsc::channel();
    commands::spawn_stdin_reader(sender).context("Failed to start the stdin reader")?;
    session.run_live(receiver)
}

/// Config values apply only where the CLI is still at its default.
fn merge_config(cli: &mut Cli, cfg: &Config) {
    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 60 { cli.fps = cfg.output.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.mode == VisualizerKind::Bars { cli.mode = cfg.visual.mode; }
    if cli.fft_size.is_none() { cli.fft_size = cfg.audio.fft_size; }
    if cli.smoothing.is_none() { cli.smoothing = cfg.audio.smoothing; }
    if cli.bars.is_none() { cli.bars = cfg.visual.bars; }
    if cli.decode_timeout == 30 { cli.decode_timeout = cfg.audio.decode_timeout_secs; }
    if !cli.no_autoplay { cli.no_autoplay = !cfg.audio.autoplay; }
    if cli.font.is_none() {
        cli.font = cfg.output.font.clone();
    }
    if cli.font_url.is_none() {
        cli.font_url = cfg.output.font_url.clone();
    }
}

fn parse_color(value: Option<&str>, fallback: Rgba) -> Result<Rgba> {
    match value {
        Some(hex) => Rgba::from_hex(hex).with_context(|| format!("Invalid color '{}', expected #rrggbb", hex)),
        None => Ok(fallback),
    }
}

fn build_visualizer(cli: &Cli, visual: &VisualConfig) -> Result<Box<dyn Visualizer>> {
    let visualizer: Box<dyn Visualizer> = match cli.mode {
        VisualizerKind::Bars => {
            let defaults = BarStyle::default();
            Box::new(BarVisualizer::new(BarStyle {
                count: cli.bars,
                gap: visual.bar_gap,
                height_scale: visual.bar_height_scale,
                anchor: visual.bar_anchor,
                color: parse_color(visual.bar_color.as_deref(), defaults.color)?,
                background: parse_color(visual.background.as_deref(), defaults.background)?,
            }))
        }
        VisualizerKind::Polar => {
            let defaults = PolarStyle::default();
            Box::new(PolarVisualizer::new(PolarStyle {
                band_split: visual.band_split,
                particle_threshold: visual.particle_threshold,
                trails: visual.trails,
                background: parse_color(visual.background.as_deref(), defaults.background)?,
                seed: cli.seed,
            }))
        }
    };
    Ok(visualizer)
}

fn build_overlay(cli: &Cli) -> Option<Overlay> {
    if cli.title.is_none() && !cli.show_time {
        return None;
    }

    let font_bytes = if let Some(ref font_url) = cli.font_url {
        match load_font_from_url(font_url) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::warn!("Failed to load font from URL: {}", err);
                None
            }
        }
    } else {
        None
    };

    let shorter = cli.width.min(cli.height) as f32;
    let font_size = (shorter * 0.046).max(24.0);
    match TextOverlay::new(font_size, cli.font.as_deref(), font_bytes.as_deref()) {
        Ok(text) => Some(Overlay {
            text,
            title: cli.title.clone(),
            show_time: cli.show_time,
        }),
        Err(err) => {
            log::warn!("Text overlay disabled: {:#}", err);
            None
        }
    }
}

fn audio_sink(offline: bool) -> Box<dyn AudioSink> {
    if offline {
        return Box::new(SilentSink);
    }

    #[cfg(feature = "audio-out")]
    {
        match audio::output::DeviceSink::new() {
            Ok(sink) => return Box::new(sink),
            Err(err) => log::warn!("No audio output, playing silently: {:#}", err),
        }
    }

    #[cfg(not(feature = "audio-out"))]
    log::warn!("Built without the audio-out feature; playing silently");

    Box::new(SilentSink)
}
