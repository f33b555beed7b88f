use std::path::Path;

use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};

use super::color::Rgba;
use super::surface::Surface;

pub struct TextOverlay {
    font: Font,
    font_size: f32,
}

impl TextOverlay {
    /// Font bytes win over a font path when both are given.
    pub fn new(font_size: f32, font_path: Option<&Path>, font_bytes: Option<&[u8]>) -> Result<Self> {
        let data = match (font_bytes, font_path) {
            (Some(bytes), _) => bytes.to_vec(),
            (None, Some(path)) => std::fs::read(path)
                .with_context(|| format!("Failed to read font: {}", path.display()))?,
            (None, None) => anyhow::bail!("Text overlay needs --font or --font-url"),
        };
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font, font_size })
    }

    /// Composite text onto the surface with its top-left corner at (x, y).
    pub fn composite(&self, surface: &mut Surface, text: &str, x: u32, y: u32, color: Rgba) {
        let width = surface.width() as i32;
        let height = surface.height() as i32;
        let pixels = surface.pixels_mut();

        let mut cursor_x = x as i32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_y = y as i32 + self.font_size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }

                    let px = cursor_x + metrics.xmin + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width || py >= height {
                        continue;
                    }

                    let idx = ((py * width + px) * 4) as usize;
                    let a = coverage as f32 / 255.0 * color.a;
                    let inv_a = 1.0 - a;
                    pixels[idx] = (color.r as f32 * a + pixels[idx] as f32 * inv_a) as u8;
                    pixels[idx + 1] = (color.g as f32 * a + pixels[idx + 1] as f32 * inv_a) as u8;
                    pixels[idx + 2] = (color.b as f32 * a + pixels[idx + 2] as f32 * inv_a) as u8;
                    pixels[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width.round() as i32;
        }
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure_width(&self, text: &str) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, self.font_size).advance_width)
            .sum();
        width.ceil() as u32
    }

    pub fn line_height(&self) -> u32 {
        self.font_size.ceil() as u32
    }
}

/// Download a font file.
pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading font from {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to fetch font: {}", url))?
        .error_for_status()
        .with_context(|| format!("Font request failed: {}", url))?;
    let bytes = response.bytes().context("Failed to read font response")?;
    Ok(bytes.to_vec())
}

/// `mm:ss.cc`, or `hh:mm:ss.cc` past an hour.
pub fn format_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let total_secs = seconds as u64;
    let centis = ((seconds - total_secs as f64) * 100.0) as u64;
    if total_secs >= 3600 {
        format!(
            "{:02}:{:02}:{:02}.{:02}",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60,
            centis
        )
    } else {
        format!("{:02}:{:02}.{:02}", total_secs / 60, total_secs % 60, centis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(0.0), "00:00.00");
        assert_eq!(format_elapsed(75.5), "01:15.50");
        assert_eq!(format_elapsed(3725.25), "01:02:05.25");
        assert_eq!(format_elapsed(-3.0), "00:00.00");
    }

    #[test]
    fn overlay_requires_a_font_source() {
        assert!(TextOverlay::new(24.0, None, None).is_err());
        assert!(TextOverlay::new(24.0, None, Some(b"not a font")).is_err());
    }
}
