use serde::Deserialize;

use super::color::Rgba;
use super::scene::Scene;
use super::{FrameInput, Visualizer};

/// Edge the bars grow from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarAnchor {
    /// Bars rise from the bottom edge and may span the full height.
    #[default]
    Bottom,
    /// Bars rise from the horizontal midline and span at most the upper half.
    Center,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BarStyle {
    /// Number of bars; `None` draws one bar per frequency bin.
    pub count: Option<usize>,
    /// Horizontal gap between bars in pixels.
    pub gap: f32,
    /// Fraction of the surface height a full-scale bar reaches.
    pub height_scale: f32,
    pub anchor: BarAnchor,
    pub color: Rgba,
    pub background: Rgba,
}

impl Default for BarStyle {
    fn default() -> Self {
        Self {
            count: None,
            gap: 2.0,
            height_scale: 1.0,
            anchor: BarAnchor::Bottom,
            color: Rgba::opaque(70, 24, 255),
            background: Rgba::opaque(0, 0, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Normalized magnitude, used as the fill opacity.
    pub alpha: f32,
}

/// Split the spectrum into equal-width bars standing on the style's anchor.
pub fn layout_bars(frequency: &[u8], width: f32, height: f32, style: &BarStyle) -> Vec<Bar> {
    if frequency.is_empty() {
        return Vec::new();
    }
    let count = style
        .count
        .unwrap_or(frequency.len())
        .clamp(1, frequency.len());
    let slot = width / count as f32;
    let baseline = match style.anchor {
        BarAnchor::Bottom => height,
        BarAnchor::Center => height / 2.0,
    };
    let max_height = baseline * style.height_scale.clamp(0.0, 1.0);

    (0..count)
        .map(|i| {
            let lo = i * frequency.len() / count;
            let hi = ((i + 1) * frequency.len() / count).max(lo + 1);
            let bins = &frequency[lo..hi];
            let mean = bins.iter().map(|&v| v as f32).sum::<f32>() / bins.len() as f32;
            let level = mean / 255.0;
            let bar_height = level * max_height;
            Bar {
                x: i as f32 * slot,
                y: baseline - bar_height,
                width: (slot - style.gap).max(1.0),
                height: bar_height,
                alpha: level,
            }
        })
        .collect()
}

pub struct BarVisualizer {
    style: BarStyle,
}

impl BarVisualizer {
    pub fn new(style: BarStyle) -> Self {
        Self { style }
    }
}

impl Visualizer for BarVisualizer {
    fn name(&self) -> &'static str {
        "bars"
    }

    fn draw(&mut self, scene: &mut Scene, frame: &FrameInput<'_>) {
        scene.clear(self.style.background);
        let bars = layout_bars(
            frame.snapshot.frequency,
            scene.width() as f32,
            scene.height() as f32,
            &self.style,
        );
        for bar in bars {
            scene.fill_rect(
                bar.x,
                bar.y,
                bar.width,
                bar.height,
                self.style.color.with_alpha(bar.alpha),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::analyser::Snapshot;

    fn frame<'a>(frequency: &'a [u8], time_domain: &'a [u8]) -> FrameInput<'a> {
        FrameInput {
            snapshot: Snapshot {
                frequency,
                time_domain,
            },
            now: Duration::ZERO,
            elapsed_secs: 0.0,
        }
    }

    #[test]
    fn silent_spectrum_has_flat_bars() {
        let bars = layout_bars(&[0u8; 128], 640.0, 480.0, &BarStyle::default());
        assert_eq!(bars.len(), 128);
        assert!(bars.iter().all(|b| b.height == 0.0 && b.alpha == 0.0));
        assert!(bars.iter().all(|b| b.y == 480.0));
    }

    #[test]
    fn full_scale_spectrum_has_full_bars() {
        let bars = layout_bars(&[255u8; 128], 640.0, 480.0, &BarStyle::default());
        assert!(bars.iter().all(|b| b.height == 480.0 && b.alpha == 1.0 && b.y == 0.0));
    }

    #[test]
    fn bars_are_equal_width_and_adjacent() {
        let style = BarStyle {
            count: Some(8),
            ..BarStyle::default()
        };
        let bars = layout_bars(&[10u8; 64], 800.0, 100.0, &style);
        assert_eq!(bars.len(), 8);
        for (i, bar) in bars.iter().enumerate() {
            assert_eq!(bar.x, i as f32 * 100.0);
            assert_eq!(bar.width, 98.0);
        }
    }

    #[test]
    fn grouped_bars_average_their_bins() {
        let style = BarStyle {
            count: Some(2),
            ..BarStyle::default()
        };
        let bars = layout_bars(&[0, 255, 102, 102], 20.0, 100.0, &style);
        assert_eq!(bars[0].alpha, 127.5 / 255.0);
        assert_eq!(bars[1].height, 40.0);
    }

    #[test]
    fn more_bars_than_bins_is_clamped() {
        let style = BarStyle {
            count: Some(100),
            ..BarStyle::default()
        };
        assert_eq!(layout_bars(&[1, 2, 3], 30.0, 10.0, &style).len(), 3);
        assert!(layout_bars(&[], 30.0, 10.0, &style).is_empty());
    }

    #[test]
    fn center_anchor_grows_up_from_the_midline() {
        let style = BarStyle {
            anchor: BarAnchor::Center,
            ..BarStyle::default()
        };
        let bars = layout_bars(&[255, 0, 51], 30.0, 200.0, &style);
        assert_eq!((bars[0].y, bars[0].height), (0.0, 100.0));
        assert_eq!((bars[1].y, bars[1].height), (100.0, 0.0));
        assert!((bars[2].y + bars[2].height - 100.0).abs() < 1e-4);
        assert!((bars[2].height - 20.0).abs() < 1e-4);
    }

    #[test]
    fn draw_emits_one_rect_per_visible_bar() {
        let mut scene = Scene::new(40, 20);
        let mut viz = BarVisualizer::new(BarStyle {
            count: Some(4),
            ..BarStyle::default()
        });
        let freq = [255, 0, 255, 255];
        let time = [128u8; 8];
        viz.draw(&mut scene, &frame(&freq, &time));
        assert_eq!(scene.clear_color(), Rgba::opaque(0, 0, 0));
        // The silent bar has no height and emits nothing.
        assert_eq!(scene.vertices().len(), 3 * 6);
        let first = &scene.vertices()[..6];
        assert!(first.iter().all(|v| v.color == Rgba::opaque(70, 24, 255).to_array()));
        let xs: Vec<f32> = first.iter().map(|v| v.position[0]).collect();
        assert!(xs.iter().all(|&x| x == 0.0 || x == 8.0));
        let ys: Vec<f32> = first.iter().map(|v| v.position[1]).collect();
        assert!(ys.iter().all(|&y| y == 0.0 || y == 20.0));
    }

    #[test]
    fn draw_on_silence_is_background_only() {
        let mut scene = Scene::new(40, 20);
        let mut viz = BarVisualizer::new(BarStyle::default());
        let freq = [0u8; 16];
        let time = [128u8; 32];
        viz.draw(&mut scene, &frame(&freq, &time));
        assert!(scene.vertices().is_empty());
        assert_eq!(scene.clear_color(), Rgba::opaque(0, 0, 0));
    }
}
