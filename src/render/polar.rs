//! Circular wave visualizer.
//!
//! Three energy bands drive a slowly rotating hue, a pulsing background disc
//! and several sets of concentric closed curves whose radius is perturbed per
//! angle by the waveform and spectrum. Loud passages add a particle burst.

use std::collections::VecDeque;
use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use super::color::{Gradient, Rgba};
use super::path::Path;
use super::scene::{Paint, Scene};
use super::{FrameInput, Visualizer};
use crate::error::VizError;

/// Depth of the time-domain ring buffer.
pub const HISTORY_LENGTH: usize = 20;
/// Waveform slots kept per history entry.
pub const HISTORY_SLOTS: usize = 128;

const BASS_BOOST: f32 = 1.2;
const ROTATION_PER_MS: f32 = 0.0005;
/// Hue advance per palette request; a frame makes three requests.
const HUE_STEP: f32 = 0.5;

/// Contiguous fractions of the spectrum assigned to each band, low first.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct BandSplit {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl BandSplit {
    pub fn validate(&self) -> Result<(), VizError> {
        let parts = [self.bass, self.mid, self.treble];
        let in_range = parts.iter().all(|p| p.is_finite() && *p >= 0.0);
        // Small tolerance for splits like 0.1 + 0.3 + 0.6 written in decimal.
        if !in_range || parts.iter().sum::<f32>() > 1.0 + 1e-4 {
            return Err(VizError::InvalidBandSplit {
                bass: self.bass,
                mid: self.mid,
                treble: self.treble,
            });
        }
        Ok(())
    }
}

impl Default for BandSplit {
    fn default() -> Self {
        Self {
            bass: 0.1,
            mid: 0.3,
            treble: 0.6,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Energy {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Average each band and normalize against 80% of full scale, saturating at 1.
pub fn band_energies(frequency: &[u8], split: &BandSplit) -> Energy {
    let n = frequency.len();
    // Float-to-int casts saturate, so oversized fractions clamp to `n`.
    let bins = |fraction: f32| ((n as f32 * fraction).floor() as usize).min(n);
    let bass_len = bins(split.bass);
    let mid_len = bins(split.mid);
    let treble_len = bins(split.treble);

    let band = |start: usize, len: usize| -> f32 {
        let start = start.min(n);
        let end = start.saturating_add(len).min(n);
        if end <= start {
            return 0.0;
        }
        let total: f32 = frequency[start..end].iter().map(|&v| v as f32).sum();
        (total / (255.0 * (end - start) as f32 * 0.8)).min(1.0)
    };

    Energy {
        bass: band(0, bass_len),
        mid: band(bass_len, mid_len),
        treble: band(bass_len.saturating_add(mid_len), treble_len),
    }
}

/// Particles to emit this frame; zero unless bass or mid crosses the threshold.
pub fn particle_count(energy: &Energy, threshold: f32) -> usize {
    if energy.bass > threshold || energy.mid > threshold {
        (20.0 + (energy.bass + energy.mid) * 30.0).floor() as usize
    } else {
        0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    pub primary: Rgba,
    pub secondary: Rgba,
    pub accent: Rgba,
}

/// Colours for one frame at hue `cycle` (degrees).
pub fn dynamic_palette(cycle: f32, energy: &Energy) -> Palette {
    let saturation = 70.0 + energy.bass * 30.0;
    let lightness = 50.0 + energy.mid * 50.0;
    let alpha = 0.6 + energy.treble * 0.4;
    Palette {
        primary: Rgba::from_hsla(cycle, saturation, lightness, alpha),
        secondary: Rgba::from_hsla(cycle + 180.0, saturation, lightness, alpha),
        accent: Rgba::from_hsla(cycle + 90.0, saturation, lightness, alpha * 0.7),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolarStyle {
    pub band_split: BandSplit,
    pub particle_threshold: f32,
    /// Draw fading echoes of recent waveforms.
    pub trails: bool,
    pub background: Rgba,
    /// Fixed seed for reproducible particle placement.
    pub seed: Option<u64>,
}

impl Default for PolarStyle {
    fn default() -> Self {
        Self {
            band_split: BandSplit::default(),
            particle_threshold: 0.4,
            trails: true,
            background: Rgba::opaque(0x00, 0x15, 0x25),
            seed: None,
        }
    }
}

/// Parameters of one family of concentric curves.
#[derive(Clone, Copy, Debug)]
pub struct WaveSet {
    pub color: Rgba,
    pub radius: f32,
    pub amplitude: f32,
    /// Angular samples per curve.
    pub detail: usize,
    pub phase: f32,
    pub line_width: f32,
    pub count: usize,
    pub opacity: f32,
    pub wavy_factor: f32,
}

/// Build curve `w` of `set` around `center`.
pub fn wave_path(
    set: &WaveSet,
    w: usize,
    center: (f32, f32),
    time_domain: &[u8],
    frequency: &[u8],
) -> Path {
    let frac = w as f32 / set.count.max(1) as f32;
    let offset = frac * TAU;
    let amplitude = set.amplitude * (1.0 - frac * 0.6);
    let radius = set.radius * (1.0 + frac * 0.1);
    let detail = set.detail.max(3);
    let phase = set.phase;

    let sample = |data: &[u8], t: f32, rest: u8| -> u8 {
        if data.is_empty() {
            return rest;
        }
        let idx = ((t * data.len() as f32) as usize).min(data.len() - 1);
        data[idx]
    };

    let mut path = Path::with_capacity(detail * 8 + 1);
    let mut prev = (0.0f32, 0.0f32);
    for i in 0..=detail {
        let t = i as f32 / detail as f32;
        let angle = t * TAU;

        let time_value = (sample(time_domain, t, 128) as f32 - 128.0) / 128.0;
        let freq_value = sample(frequency, t, 0) as f32 / 255.0;

        let wobble = amplitude * time_value
            + (angle * set.wavy_factor + phase * 3.0).sin() * amplitude * 0.3;
        let freq_amp = freq_value * amplitude * 0.5
            + (angle * set.wavy_factor * 0.7 - phase * 2.0).cos() * amplitude * 0.2;

        let variation = (angle * 3.0 + phase + offset).sin() * wobble
            + (angle * 5.0 - phase * 1.3).sin() * freq_amp;

        let r = radius + variation;
        let theta = angle + phase + offset;
        let point = (center.0 + theta.cos() * r, center.1 + theta.sin() * r);

        if i == 0 {
            path.move_to(point.0, point.1);
        } else if i > 1 && i < detail {
            // Curve through the previous sample towards the midpoint.
            path.quad_to(
                prev.0,
                prev.1,
                (prev.0 + point.0) * 0.5,
                (prev.1 + point.1) * 0.5,
            );
        } else {
            path.line_to(point.0, point.1);
        }
        prev = point;
    }
    path.close();
    path
}

pub struct PolarVisualizer {
    style: PolarStyle,
    hue_cycle: f32,
    history: VecDeque<[u8; HISTORY_SLOTS]>,
    rng: StdRng,
}

impl PolarVisualizer {
    pub fn new(style: PolarStyle) -> Self {
        let rng = match style.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut viz = Self {
            style,
            hue_cycle: 0.0,
            history: VecDeque::with_capacity(HISTORY_LENGTH + 1),
            rng,
        };
        viz.reset_history();
        viz
    }

    #[cfg(test)]
    pub fn history(&self) -> &VecDeque<[u8; HISTORY_SLOTS]> {
        &self.history
    }

    fn advance_hue(&mut self) {
        self.hue_cycle = (self.hue_cycle + HUE_STEP) % 360.0;
    }

    /// Each palette request moves the hue on by one step.
    fn next_palette(&mut self, energy: &Energy) -> Palette {
        self.advance_hue();
        dynamic_palette(self.hue_cycle, energy)
    }

    fn reset_history(&mut self) {
        self.history.clear();
        self.history
            .extend(std::iter::repeat([128u8; HISTORY_SLOTS]).take(HISTORY_LENGTH));
    }

    fn record_history(&mut self, time_domain: &[u8]) {
        let mut entry = [128u8; HISTORY_SLOTS];
        let n = time_domain.len().min(HISTORY_SLOTS);
        entry[..n].copy_from_slice(&time_domain[..n]);
        self.history.push_front(entry);
        self.history.truncate(HISTORY_LENGTH);
    }

    fn draw_background(&self, scene: &mut Scene, center: (f32, f32), base: f32, energy: &Energy) {
        let disc = Paint::Radial {
            center,
            inner: base * 0.1,
            outer: base * 0.9,
            gradient: Gradient::new(vec![
                (0.0, Rgba::new(10, 20, 40, 0.8)),
                (0.5, Rgba::new(20, 40, 80, 0.5 + energy.bass * 0.3)),
                (1.0, Rgba::new(5, 15, 35, 0.8)),
            ]),
        };
        scene.fill_circle(center.0, center.1, base * (0.9 + energy.bass * 0.1), &disc);

        let inner_radius = base * (0.3 + energy.bass * 0.2);
        let glow = Paint::Radial {
            center,
            inner: 0.0,
            outer: inner_radius,
            gradient: Gradient::new(vec![
                (
                    0.0,
                    Rgba::new(
                        channel(100.0 + energy.treble * 155.0),
                        channel(150.0 + energy.mid * 105.0),
                        255,
                        0.3,
                    ),
                ),
                (1.0, Rgba::new(50, 100, 200, 0.0)),
            ]),
        };
        scene.fill_circle(center.0, center.1, inner_radius, &glow);
    }

    fn draw_trails(&self, scene: &mut Scene, center: (f32, f32), base: f32, color: Rgba) {
        const POINTS: usize = 64;
        // Oldest first so newer echoes sit on top; skip the live frame.
        for (j, entry) in self.history.iter().enumerate().skip(1).step_by(2).rev() {
            let fade = 1.0 - j as f32 / HISTORY_LENGTH as f32;
            let radius = base * (1.05 + j as f32 * 0.01);
            let mut path = Path::with_capacity(POINTS);
            for i in 0..POINTS {
                let angle = i as f32 / POINTS as f32 * TAU;
                let slot = i * HISTORY_SLOTS / POINTS;
                let r = radius + (entry[slot] as f32 - 128.0) / 128.0 * base * 0.08;
                let (x, y) = (center.0 + angle.cos() * r, center.1 + angle.sin() * r);
                if i == 0 {
                    path.move_to(x, y);
                } else {
                    path.line_to(x, y);
                }
            }
            path.close();
            scene.stroke_path(&path, color.with_alpha(color.a * 0.25 * fade), 1.0);
        }
    }

    fn draw_wave_set(
        &self,
        scene: &mut Scene,
        set: &WaveSet,
        center: (f32, f32),
        frame: &FrameInput<'_>,
        energy: &Energy,
    ) {
        let snapshot = frame.snapshot;
        for w in 0..set.count {
            let frac = w as f32 / set.count as f32;
            let alpha = set.color.a * set.opacity * (1.0 - frac * 0.5);
            let path = wave_path(set, w, center, snapshot.time_domain, snapshot.frequency);

            // Soft halo standing in for a canvas shadow blur.
            let halo = set.line_width + 6.0 + energy.bass * 4.0;
            scene.stroke_path(&path, set.color.with_alpha(alpha * 0.12), halo);
            scene.stroke_path(&path, set.color.with_alpha(alpha), set.line_width);

            if w % 3 == 0 {
                scene.fill_fan(&path, center, set.color.with_alpha(0.03 + energy.bass * 0.02));
            }
        }
    }

    fn draw_particles(
        &mut self,
        scene: &mut Scene,
        center: (f32, f32),
        base: f32,
        energy: &Energy,
        palette: &Palette,
    ) {
        let count = particle_count(energy, self.style.particle_threshold);
        for i in 0..count {
            let angle = self.rng.random::<f32>() * TAU;
            let distance = base * (0.8 + self.rng.random::<f32>() * 0.6);
            let size = 1.0 + self.rng.random::<f32>() * 3.0 * (energy.bass + energy.mid);
            let color = if i % 2 == 0 {
                palette.primary
            } else {
                palette.secondary
            };
            let (x, y) = (
                center.0 + angle.cos() * distance,
                center.1 + angle.sin() * distance,
            );
            scene.fill_circle(x, y, size * 2.5, &Paint::Solid(color.with_alpha(color.a * 0.15)));
            scene.fill_circle(x, y, size, &Paint::Solid(color));
        }
    }
}

impl Visualizer for PolarVisualizer {
    fn name(&self) -> &'static str {
        "polar"
    }

    fn draw(&mut self, scene: &mut Scene, frame: &FrameInput<'_>) {
        let raw = band_energies(frame.snapshot.frequency, &self.style.band_split);
        let energy = Energy {
            bass: raw.bass * BASS_BOOST,
            ..raw
        };

        self.record_history(frame.snapshot.time_domain);

        scene.clear(self.style.background);

        let (w, h) = (scene.width() as f32, scene.height() as f32);
        let center = (w / 2.0, h / 2.0);
        let base = w.min(h) * 0.3;

        // Background, waves and particles each take their own hue step.
        self.advance_hue();
        self.draw_background(scene, center, base, &energy);

        let palette = self.next_palette(&energy);
        if self.style.trails {
            self.draw_trails(scene, center, base, palette.accent);
        }

        let phase = frame.now.as_millis() as f32 * ROTATION_PER_MS;
        let sets = [
            WaveSet {
                color: palette.primary,
                radius: base * 1.05,
                amplitude: 25.0 + energy.bass * 60.0,
                detail: 180,
                phase,
                line_width: 1.5,
                count: 15,
                opacity: 0.7,
                wavy_factor: 5.0 + energy.mid * 10.0,
            },
            WaveSet {
                color: palette.secondary,
                radius: base * 0.98,
                amplitude: 20.0 + energy.mid * 55.0,
                detail: 180,
                phase: -phase * 0.7,
                line_width: 1.5,
                count: 15,
                opacity: 0.75,
                wavy_factor: 3.0 + energy.treble * 12.0,
            },
            WaveSet {
                color: palette.accent,
                radius: base * 1.02,
                amplitude: 15.0 + energy.treble * 40.0,
                detail: 90,
                phase: phase * 1.2,
                line_width: 0.5,
                count: 5,
                opacity: 0.4,
                wavy_factor: 8.0 + energy.bass * 8.0,
            },
        ];
        for set in &sets {
            self.draw_wave_set(scene, set, center, frame, &energy);
        }

        let sparks = self.next_palette(&energy);
        self.draw_particles(scene, center, base, &energy, &sparks);
    }

    fn resized(&mut self, _width: u32, _height: u32) {
        self.reset_history();
    }

    fn reset(&mut self) {
        self.reset_history();
    }
}

fn channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
