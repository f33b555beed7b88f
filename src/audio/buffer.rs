use rayon::prelude::*;

/// Decoded audio, one sample vector per channel.
///
/// Immutable once built. The mono mixdown is computed up front because the
/// analyser reads it on every frame.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    mono: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build from planar channel data. Channels shorter than the longest are
    /// padded with silence so every channel has the same frame count.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }

        let mono = if channels.len() == 1 {
            channels[0].clone()
        } else if channels.is_empty() {
            Vec::new()
        } else {
            let scale = 1.0 / channels.len() as f32;
            (0..frames)
                .into_par_iter()
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                .collect()
        };

        Self {
            channels,
            mono,
            sample_rate,
        }
    }

    /// Split interleaved samples into planar channels.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks(channel_count) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self::new(channels, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.mono.len()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Average of all channels.
    pub fn mono(&self) -> &[f32] {
        &self.mono
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_stereo_is_split_and_mixed() {
        let buf = SampleBuffer::from_interleaved(&[1.0, 0.0, 0.5, -0.5, 0.2, 0.2], 2, 8000);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.channel(0).unwrap(), &[1.0, 0.5, 0.2]);
        assert_eq!(buf.channel(1).unwrap(), &[0.0, -0.5, 0.2]);
        assert_eq!(buf.mono(), &[0.5, 0.0, 0.2]);
    }

    #[test]
    fn short_channels_are_padded() {
        let buf = SampleBuffer::new(vec![vec![1.0; 4], vec![1.0; 2]], 4);
        assert_eq!(buf.frames(), 4);
        assert_eq!(buf.channel(1).unwrap(), &[1.0, 1.0, 0.0, 0.0]);
        assert!((buf.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_buffer_has_zero_duration() {
        let buf = SampleBuffer::new(Vec::new(), 44100);
        assert_eq!(buf.frames(), 0);
        assert_eq!(buf.duration_secs(), 0.0);
    }
}
