pub type Point = (f32, f32);

const QUAD_SEGMENTS: usize = 8;

/// Single flattened contour.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    points: Vec<Point>,
    closed: bool,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(points: usize) -> Self {
        Self {
            points: Vec::with_capacity(points),
            closed: false,
        }
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.points.clear();
        self.closed = false;
        self.points.push((x, y));
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.points.push((x, y));
    }

    /// Quadratic Bézier from the current point, flattened to line segments.
    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        let Some(&(x0, y0)) = self.points.last() else {
            self.points.push((x, y));
            return;
        };
        for i in 1..=QUAD_SEGMENTS {
            let t = i as f32 / QUAD_SEGMENTS as f32;
            let mt = 1.0 - t;
            self.points.push((
                mt * mt * x0 + 2.0 * mt * t * cx + t * t * x,
                mt * mt * y0 + 2.0 * mt * t * cy + t * t * y,
            ));
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Segments, including the closing one when closed.
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let closing = if self.closed && self.points.len() > 2 {
            Some((self.points[self.points.len() - 1], self.points[0]))
        } else {
            None
        };
        self.points.windows(2).map(|w| (w[0], w[1])).chain(closing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_ends_on_target() {
        let mut path = Path::new();
        path.move_to(0.0, 0.0);
        path.quad_to(5.0, 10.0, 10.0, 0.0);
        assert_eq!(path.points().len(), 1 + QUAD_SEGMENTS);
        assert_eq!(*path.points().last().unwrap(), (10.0, 0.0));
        // Midpoint of the curve sits halfway to the control point.
        assert_eq!(path.points()[QUAD_SEGMENTS / 2], (5.0, 5.0));
    }

    #[test]
    fn closed_path_adds_closing_segment() {
        let mut path = Path::new();
        path.move_to(0.0, 0.0);
        path.line_to(1.0, 0.0);
        path.line_to(1.0, 1.0);
        assert_eq!(path.segments().count(), 2);
        path.close();
        assert_eq!(path.segments().count(), 3);
        assert_eq!(path.segments().last(), Some(((1.0, 1.0), (0.0, 0.0))));
    }
}
