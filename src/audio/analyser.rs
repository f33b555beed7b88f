use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::VizError;

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

/// Analysis parameters, matching the knobs of a browser `AnalyserNode`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    /// Time constant for averaging magnitudes across captures (0 = none).
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserSettings {
    pub fn validate(&self) -> Result<(), VizError> {
        if !self.fft_size.is_power_of_two()
            || self.fft_size < MIN_FFT_SIZE
            || self.fft_size > MAX_FFT_SIZE
        {
            return Err(VizError::InvalidFftSize(self.fft_size));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(VizError::InvalidSmoothing(self.smoothing));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(VizError::InvalidDecibelRange {
                min: self.min_decibels,
                max: self.max_decibels,
            });
        }
        Ok(())
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Borrowed view of the analyser's latest capture.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    /// Magnitude per bin, 0-255 on the configured decibel scale.
    pub frequency: &'a [u8],
    /// Waveform bytes, 128 = silence.
    pub time_domain: &'a [u8],
}

/// Spectral analyser over a mono sample stream.
///
/// Each capture looks at the `fft_size` samples that end at the playback
/// position and overwrites the two snapshot arrays in place.
pub struct Analyser {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
}

impl Analyser {
    pub fn new(settings: AnalyserSettings) -> Result<Self, VizError> {
        settings.validate()?;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(settings.fft_size);
        let bins = settings.frequency_bin_count();

        Ok(Self {
            settings,
            fft,
            window: blackman_window(settings.fft_size),
            scratch: vec![Complex::new(0.0, 0.0); settings.fft_size],
            smoothed: vec![0.0; bins],
            frequency: vec![0; bins],
            time_domain: vec![128; settings.fft_size],
        })
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.settings.frequency_bin_count()
    }

    /// Forget smoothing history, as a freshly created node would.
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.frequency.fill(0);
        self.time_domain.fill(128);
    }

    pub fn capture(&mut self, samples: &[f32], position: usize) -> Snapshot<'_> {
        let n = self.settings.fft_size;
        let end = position.min(samples.len());
        let start = end.saturating_sub(n);
        let window_samples = &samples[start..end];
        let pad = n - window_samples.len();

        // Time domain: zero-pad on the left when fewer than n samples played.
        for (i, slot) in self.time_domain.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { window_samples[i - pad] };
            *slot = (128.0 * (1.0 + s)).floor().clamp(0.0, 255.0) as u8;
        }

        for (i, c) in self.scratch.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { window_samples[i - pad] };
            *c = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.settings.smoothing;
        let min_db = self.settings.min_decibels;
        let range_scale = 255.0 / (self.settings.max_decibels - min_db);
        let norm = 1.0 / n as f32;

        for (k, byte) in self.frequency.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() * norm;
            let smoothed = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = if smoothed.is_finite() { smoothed } else { 0.0 };

            *byte = if self.smoothed[k] <= 0.0 {
                0
            } else {
                let db = 20.0 * self.smoothed[k].log10();
                ((db - min_db) * range_scale).floor().clamp(0.0, 255.0) as u8
            };
        }

        Snapshot {
            frequency: &self.frequency,
            time_domain: &self.time_domain,
        }
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                + a2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin() * amp)
            .collect()
    }

    fn settings(fft_size: usize, smoothing: f32) -> AnalyserSettings {
        AnalyserSettings {
            fft_size,
            smoothing,
            ..AnalyserSettings::default()
        }
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            Analyser::new(settings(1000, 0.8)),
            Err(VizError::InvalidFftSize(1000))
        ));
        assert!(matches!(
            Analyser::new(settings(16, 0.8)),
            Err(VizError::InvalidFftSize(16))
        ));
        assert!(matches!(
            Analyser::new(settings(256, 1.5)),
            Err(VizError::InvalidSmoothing(_))
        ));
        let inverted = AnalyserSettings {
            min_decibels: -10.0,
            max_decibels: -20.0,
            ..AnalyserSettings::default()
        };
        assert!(matches!(
            Analyser::new(inverted),
            Err(VizError::InvalidDecibelRange { .. })
        ));
    }

    #[test]
    fn silence_reads_as_floor_and_midpoint() {
        let mut analyser = Analyser::new(settings(256, 0.0)).unwrap();
        let samples = vec![0.0f32; 1024];
        let snap = analyser.capture(&samples, 512);
        assert_eq!(snap.frequency.len(), 128);
        assert_eq!(snap.time_domain.len(), 256);
        assert!(snap.frequency.iter().all(|&b| b == 0));
        assert!(snap.time_domain.iter().all(|&b| b == 128));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let sample_rate = 8192.0;
        let fft_size = 1024;
        // Bin spacing is 8 Hz; 800 Hz lands exactly on bin 100.
        let samples = sine(800.0, sample_rate, 4096, 0.9);
        let mut analyser = Analyser::new(settings(fft_size, 0.0)).unwrap();
        let snap = analyser.capture(&samples, 4096);

        let (peak_bin, &peak) = snap
            .frequency
            .iter()
            .enumerate()
            .max_by_key(|&(_, &v)| v)
            .unwrap();
        assert!((99..=101).contains(&peak_bin), "peak at {peak_bin}");
        assert_eq!(peak, 255);
        assert!(snap.frequency[400] < 100);
    }

    #[test]
    fn time_domain_is_centered_at_128() {
        let mut analyser = Analyser::new(settings(64, 0.0)).unwrap();
        let samples = vec![0.5f32; 64];
        let snap = analyser.capture(&samples, 64);
        assert!(snap.time_domain.iter().all(|&b| b == 192));

        let samples = vec![-1.0f32; 64];
        let snap = analyser.capture(&samples, 64);
        assert!(snap.time_domain.iter().all(|&b| b == 0));
    }

    #[test]
    fn early_positions_are_zero_padded() {
        let mut analyser = Analyser::new(settings(64, 0.0)).unwrap();
        let samples = vec![1.0f32; 64];
        let snap = analyser.capture(&samples, 16);
        assert!(snap.time_domain[..48].iter().all(|&b| b == 128));
        assert!(snap.time_domain[48..].iter().all(|&b| b == 255));
    }

    #[test]
    fn smoothing_carries_energy_across_captures() {
        let loud = sine(800.0, 8192.0, 1024, 0.9);
        let quiet = vec![0.0f32; 1024];

        let mut smooth = Analyser::new(settings(1024, 0.8)).unwrap();
        smooth.capture(&loud, 1024);
        let after = smooth.capture(&quiet, 1024).frequency[100];
        assert!(after > 0);

        let mut raw = Analyser::new(settings(1024, 0.0)).unwrap();
        raw.capture(&loud, 1024);
        assert_eq!(raw.capture(&quiet, 1024).frequency[100], 0);
    }

    #[test]
    fn reset_clears_history() {
        let loud = sine(800.0, 8192.0, 1024, 0.9);
        let quiet = vec![0.0f32; 1024];
        let mut analyser = Analyser::new(settings(1024, 0.9)).unwrap();
        analyser.capture(&loud, 1024);
        analyser.reset();
        assert!(analyser.capture(&quiet, 1024).frequency.iter().all(|&b| b == 0));
    }
}
