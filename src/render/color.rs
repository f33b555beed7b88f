/// Straight-alpha colour. Channels are 0-255, alpha is 0.0-1.0 as in CSS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0.0);

    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Normalized `[r, g, b, a]` as the GPU consumes it.
    pub fn to_array(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a.clamp(0.0, 1.0),
        ]
    }

    /// Parse `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::opaque(channel(0)?, channel(2)?, channel(4)?))
    }

    /// CSS `hsla(h, s%, l%, a)`.
    pub fn from_hsla(hue: f32, saturation: f32, lightness: f32, alpha: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 360.0;
        let s = (saturation / 100.0).clamp(0.0, 1.0);
        let l = (lightness / 100.0).clamp(0.0, 1.0);

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let channel = |t: f32| {
            let t = t.rem_euclid(1.0);
            let v = if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            };
            (v * 255.0).round().clamp(0.0, 255.0) as u8
        };

        Self::new(
            channel(h + 1.0 / 3.0),
            channel(h),
            channel(h - 1.0 / 3.0),
            alpha.clamp(0.0, 1.0),
        )
    }

    /// Linear interpolation in straight RGBA.
    pub fn lerp(self, other: Rgba, t: f32) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgba::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            self.a + (other.a - self.a) * t,
        )
    }
}

/// Colour stops along a gradient, positions ascending in 0..=1.
#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    stops: Vec<(f32, Rgba)>,
}

impl Gradient {
    pub fn new(mut stops: Vec<(f32, Rgba)>) -> Self {
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { stops }
    }

    pub fn sample(&self, t: f32) -> Rgba {
        let Some(first) = self.stops.first() else {
            return Rgba::TRANSPARENT;
        };
        if t <= first.0 {
            return first.1;
        }
        for pair in self.stops.windows(2) {
            let (p0, c0) = pair[0];
            let (p1, c1) = pair[1];
            if t <= p1 {
                let span = p1 - p0;
                let local = if span > 0.0 { (t - p0) / span } else { 1.0 };
                return c0.lerp(c1, local);
            }
        }
        self.stops[self.stops.len() - 1].1
    }
}
