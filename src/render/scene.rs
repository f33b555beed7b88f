//! Per-frame triangle list in pixel coordinates.
//!
//! Visualizers describe a frame as filled shapes; the scene turns each shape
//! into coloured triangles that the GPU pipeline draws with alpha blending in
//! submission order.

use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};

use super::color::{Gradient, Rgba};
use super::path::Path;

/// Rings used to approximate a radial gradient across a disc.
const GRADIENT_RINGS: usize = 16;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Pixels, origin at the top-left corner, y down.
    pub position: [f32; 2],
    /// Straight-alpha RGBA in 0.0-1.0.
    pub color: [f32; 4],
}

/// How a filled shape is coloured.
#[derive(Clone, Debug)]
pub enum Paint {
    Solid(Rgba),
    /// Concentric radial gradient: `t = 0` at `inner`, `t = 1` at `outer`.
    Radial {
        center: (f32, f32),
        inner: f32,
        outer: f32,
        gradient: Gradient,
    },
}

impl Paint {
    pub fn color_at(&self, x: f32, y: f32) -> Rgba {
        match self {
            Paint::Solid(c) => *c,
            Paint::Radial {
                center,
                inner,
                outer,
                gradient,
            } => {
                let d = ((x - center.0).powi(2) + (y - center.1).powi(2)).sqrt();
                let span = (outer - inner).max(f32::EPSILON);
                gradient.sample((d - inner) / span)
            }
        }
    }
}

pub struct Scene {
    width: u32,
    height: u32,
    clear: Rgba,
    vertices: Vec<Vertex>,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            clear: Rgba::TRANSPARENT,
            vertices: Vec::new(),
        }
    }

    /// Drop last frame's geometry and size the scene for the next one.
    pub fn begin(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.clear = Rgba::TRANSPARENT;
        self.vertices.clear();
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear_color(&self) -> Rgba {
        self.clear
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Every pixel starts as `color` before any shape is drawn.
    pub fn clear(&mut self, color: Rgba) {
        self.clear = color;
    }

    fn push(&mut self, p: (f32, f32), color: [f32; 4]) {
        self.vertices.push(Vertex {
            position: [p.0, p.1],
            color,
        });
    }

    fn triangle(&mut self, a: (f32, f32), b: (f32, f32), c: (f32, f32), color: [f32; 4]) {
        self.push(a, color);
        self.push(b, color);
        self.push(c, color);
    }

    /// Quad `a b c d` in winding order, with a colour per corner.
    fn quad(&mut self, corners: [(f32, f32); 4], colors: [[f32; 4]; 4]) {
        for i in [0, 1, 2, 0, 2, 3] {
            self.push(corners[i], colors[i]);
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba) {
        if w <= 0.0 || h <= 0.0 || color.a <= 0.0 {
            return;
        }
        let c = color.to_array();
        self.quad([(x, y), (x + w, y), (x + w, y + h), (x, y + h)], [c; 4]);
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, paint: &Paint) {
        if radius <= 0.0 {
            return;
        }
        let segments = circle_segments(radius);
        let rim = |r: f32, i: usize| {
            let angle = i as f32 / segments as f32 * TAU;
            (cx + angle.cos() * r, cy + angle.sin() * r)
        };

        match paint {
            Paint::Solid(color) => {
                if color.a <= 0.0 {
                    return;
                }
                let c = color.to_array();
                for i in 0..segments {
                    self.triangle((cx, cy), rim(radius, i), rim(radius, i + 1), c);
                }
            }
            Paint::Radial { .. } => {
                let center = paint.color_at(cx, cy).to_array();
                let first = radius / GRADIENT_RINGS as f32;
                for i in 0..segments {
                    let (a, b) = (rim(first, i), rim(first, i + 1));
                    self.push((cx, cy), center);
                    self.push(a, paint.color_at(a.0, a.1).to_array());
                    self.push(b, paint.color_at(b.0, b.1).to_array());
                }
                for ring in 1..GRADIENT_RINGS {
                    let r0 = radius * ring as f32 / GRADIENT_RINGS as f32;
                    let r1 = radius * (ring + 1) as f32 / GRADIENT_RINGS as f32;
                    for i in 0..segments {
                        let corners = [rim(r0, i), rim(r1, i), rim(r1, i + 1), rim(r0, i + 1)];
                        let colors = corners.map(|p| paint.color_at(p.0, p.1).to_array());
                        self.quad(corners, colors);
                    }
                }
            }
        }
    }

    /// One quad per segment, `line_width` wide, centred on the segment.
    pub fn stroke_path(&mut self, path: &Path, color: Rgba, line_width: f32) {
        if color.a <= 0.0 {
            return;
        }
        let half = (line_width * 0.5).max(0.5);
        let c = color.to_array();
        for (a, b) in path.segments() {
            let (dx, dy) = (b.0 - a.0, b.1 - a.1);
            let len = (dx * dx + dy * dy).sqrt();
            if len <= f32::EPSILON {
                continue;
            }
            let (nx, ny) = (-dy / len * half, dx / len * half);
            self.quad(
                [
                    (a.0 + nx, a.1 + ny),
                    (b.0 + nx, b.1 + ny),
                    (b.0 - nx, b.1 - ny),
                    (a.0 - nx, a.1 - ny),
                ],
                [c; 4],
            );
        }
    }

    /// Fill the region enclosed by `path` as a fan around `pivot`.
    ///
    /// Exact for outlines that are star-shaped around the pivot, which every
    /// polar curve is. The outline is implicitly closed.
    pub fn fill_fan(&mut self, path: &Path, pivot: (f32, f32), color: Rgba) {
        let points = path.points();
        if points.len() < 3 || color.a <= 0.0 {
            return;
        }
        let c = color.to_array();
        let n = points.len();
        for i in 0..n {
            let next = points[(i + 1) % n];
            if points[i] != next {
                self.triangle(pivot, points[i], next, c);
            }
        }
    }
}

fn circle_segments(radius: f32) -> usize {
    ((radius * 0.5).ceil() as usize).clamp(12, 128)
}
