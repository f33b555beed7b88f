use crate::error::VizError;

/// RGBA8 frame read back from the GPU. Row-major, 4 bytes per pixel,
/// straight alpha. Text overlays are composited here before output.
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self, VizError> {
        check_size(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        })
    }

    /// Reallocate at a new size. Contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), VizError> {
        check_size(width, height)?;
        self.width = width;
        self.height = height;
        self.pixels = vec![0; (width * height * 4) as usize];
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        Some([
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ])
    }
}

fn check_size(width: u32, height: u32) -> Result<(), VizError> {
    // 16384 keeps width * height * 4 inside u32.
    if width == 0 || height == 0 || width > 16384 || height > 16384 {
        return Err(VizError::InvalidSurfaceSize { width, height });
    }
    Ok(())
}
