pub mod bars;
pub mod color;
pub mod frame;
pub mod gpu;
pub mod path;
pub mod pipeline;
pub mod polar;
pub mod scene;
pub mod scheduler;
pub mod surface;
pub mod text;

use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;
use serde::Deserialize;

use crate::audio::analyser::Snapshot;
use crate::error::VizError;
use color::Rgba;
use frame::Rasterizer;
use scene::Scene;
use surface::Surface;
use text::TextOverlay;

/// Everything a visualizer sees for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    pub snapshot: Snapshot<'a>,
    /// Session time; drives rotation and other free-running animation.
    pub now: Duration,
    /// Playback position in seconds.
    pub elapsed_secs: f64,
}

pub trait Visualizer {
    fn name(&self) -> &'static str;

    /// Describe one complete frame: the clear colour plus every shape.
    fn draw(&mut self, scene: &mut Scene, frame: &FrameInput<'_>);

    /// Called after the surface changed size.
    fn resized(&mut self, _width: u32, _height: u32) {}

    /// Called when a new playback starts.
    fn reset(&mut self) {}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizerKind {
    /// Vertical frequency bars
    #[default]
    Bars,
    /// Animated circular waves with particles
    Polar,
}

impl VisualizerKind {
    pub fn default_fft_size(self) -> usize {
        match self {
            VisualizerKind::Bars => 256,
            VisualizerKind::Polar => 2048,
        }
    }

    pub fn default_smoothing(self) -> f32 {
        match self {
            VisualizerKind::Bars => 0.8,
            VisualizerKind::Polar => 0.85,
        }
    }
}

/// Title and elapsed-time text drawn over every frame.
pub struct Overlay {
    pub text: TextOverlay,
    pub title: Option<String>,
    pub show_time: bool,
}

impl Overlay {
    fn composite(&self, surface: &mut Surface, elapsed_secs: f64) {
        let color = Rgba::new(255, 255, 255, 220.0 / 255.0);
        let shorter = surface.width().min(surface.height()) as f32;
        let margin = (shorter * 0.07) as u32;

        if let Some(ref title) = self.title {
            let tw = self.text.measure_width(title);
            let tx = surface.width().saturating_sub(margin + tw);
            self.text.composite(surface, title, tx, margin, color);
        }

        if self.show_time {
            let time_str = text::format_elapsed(elapsed_secs);
            let tw = self.text.measure_width(&time_str);
            let tx = surface.width().saturating_sub(margin + tw);
            let ty = surface
                .height()
                .saturating_sub(margin + self.text.line_height());
            self.text.composite(surface, &time_str, tx, ty, color);
        }
    }
}

/// Owns the frame's scene, the rasterizer, the readback surface and the
/// active visualizer; draws one frame per tick.
pub struct RenderLoop {
    scene: Scene,
    rasterizer: Box<dyn Rasterizer>,
    surface: Surface,
    visualizer: Box<dyn Visualizer>,
    overlay: Option<Overlay>,
    frames_drawn: u64,
}

impl RenderLoop {
    pub fn new(
        width: u32,
        height: u32,
        visualizer: Box<dyn Visualizer>,
        overlay: Option<Overlay>,
        rasterizer: Box<dyn Rasterizer>,
    ) -> Result<Self, VizError> {
        let mut visualizer = visualizer;
        visualizer.resized(width, height);
        log::debug!(
            "Drawing {} frames with the {} rasterizer",
            visualizer.name(),
            rasterizer.name()
        );
        Ok(Self {
            scene: Scene::new(width, height),
            rasterizer,
            surface: Surface::new(width, height)?,
            visualizer,
            overlay,
            frames_drawn: 0,
        })
    }

    pub fn draw(&mut self, frame: &FrameInput<'_>) -> Result<&Surface> {
        self.scene.begin(self.surface.width(), self.surface.height());
        self.visualizer.draw(&mut self.scene, frame);
        self.rasterizer.rasterize(&self.scene, &mut self.surface)?;
        if let Some(ref overlay) = self.overlay {
            overlay.composite(&mut self.surface, frame.elapsed_secs);
        }
        self.frames_drawn += 1;
        Ok(&self.surface)
    }

    /// The next drawn frame uses the new dimensions.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), VizError> {
        self.surface.resize(width, height)?;
        self.visualizer.resized(width, height);
        log::info!("Surface resized to {}x{}", width, height);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.visualizer.reset();
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn visualizer_name(&self) -> &'static str {
        self.visualizer.name()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }
}
