use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VizError {
    /// Malformed or unsupported audio input.
    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("audio decoding did not finish within {0:.1?}")]
    DecodeTimeout(Duration),

    #[error("audio decoder worker exited without a result")]
    DecodeWorkerLost,

    #[error("invalid FFT size {0}: must be a power of two between 32 and 32768")]
    InvalidFftSize(usize),

    #[error("invalid smoothing {0}: must be between 0.0 and 1.0")]
    InvalidSmoothing(f32),

    #[error("invalid decibel range: min {min} dB must be below max {max} dB")]
    InvalidDecibelRange { min: f32, max: f32 },

    #[error("invalid band split {bass}/{mid}/{treble}: fractions must be non-negative and sum to at most 1")]
    InvalidBandSplit { bass: f32, mid: f32, treble: f32 },

    #[error("invalid frame rate {0}: must be between 1 and {max}", max = crate::render::scheduler::MAX_FPS)]
    InvalidFps(u32),

    #[error("invalid surface size {width}x{height}")]
    InvalidSurfaceSize { width: u32, height: u32 },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<symphonia::core::errors::Error> for VizError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        VizError::Decode(err.to_string())
    }
}
