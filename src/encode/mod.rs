pub mod ffmpeg;

use anyhow::Result;

use crate::render::surface::Surface;

/// Destination for finished frames.
pub trait FrameSink {
    fn write_frame(&mut self, surface: &Surface) -> Result<()>;

    /// The surface changed size; later frames arrive at the new dimensions.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}

/// Discards frames. Used for `--headless` runs.
#[derive(Debug, Default)]
pub struct NullFrameSink {
    frames: u64,
}

impl FrameSink for NullFrameSink {
    fn write_frame(&mut self, _surface: &Surface) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        log::info!("Discarded {} frames", self.frames);
        Ok(())
    }
}
