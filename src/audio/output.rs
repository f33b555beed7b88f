use std::sync::Arc;

use anyhow::Result;

use super::buffer::SampleBuffer;

/// Where decoded audio is heard. Playback timing is owned by the session
/// clock; a sink only starts and halts sound.
pub trait AudioSink {
    fn play(&mut self, buffer: &Arc<SampleBuffer>) -> Result<()>;
    fn halt(&mut self);
    fn name(&self) -> &'static str;
}

/// No device. Used for offline rendering and headless runs.
#[derive(Debug, Default)]
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn play(&mut self, _buffer: &Arc<SampleBuffer>) -> Result<()> {
        Ok(())
    }

    fn halt(&mut self) {}

    fn name(&self) -> &'static str {
        "silent"
    }
}

#[cfg(feature = "audio-out")]
pub use device::DeviceSink;

#[cfg(feature = "audio-out")]
mod device {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    use super::{AudioSink, SampleBuffer};

    /// Plays through the default output device.
    pub struct DeviceSink {
        device: cpal::Device,
        stream: Option<cpal::Stream>,
        halted: Arc<AtomicBool>,
    }

    impl DeviceSink {
        pub fn new() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .context("No default audio output device")?;
            log::info!(
                "Audio output: {}",
                device.name().unwrap_or_else(|_| "unknown".into())
            );
            Ok(Self {
                device,
                stream: None,
                halted: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    impl AudioSink for DeviceSink {
        fn play(&mut self, buffer: &Arc<SampleBuffer>) -> Result<()> {
            self.halt();

            let default_config = self
                .device
                .default_output_config()
                .context("Failed to query output config")?;
            let out_channels = default_config.channels() as usize;
            if default_config.sample_rate().0 != buffer.sample_rate() {
                log::warn!(
                    "Device runs at {}Hz, file is {}Hz; requesting the file rate",
                    default_config.sample_rate().0,
                    buffer.sample_rate()
                );
            }

            let config = cpal::StreamConfig {
                channels: out_channels as u16,
                sample_rate: cpal::SampleRate(buffer.sample_rate()),
                buffer_size: cpal::BufferSize::Default,
            };

            let halted = Arc::new(AtomicBool::new(false));
            self.halted = Arc::clone(&halted);
            let source = Arc::clone(buffer);
            let cursor = AtomicUsize::new(0);

            let stream = self
                .device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if halted.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }
                        let in_channels = source.channel_count().max(1);
                        let mut pos = cursor.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(out_channels) {
                            for (ch, out) in frame.iter_mut().enumerate() {
                                *out = source
                                    .channel(ch.min(in_channels - 1))
                                    .and_then(|c| c.get(pos))
                                    .copied()
                                    .unwrap_or(0.0);
                            }
                            pos += 1;
                        }
                        cursor.store(pos, Ordering::Relaxed);
                    },
                    |err| log::error!("Audio stream error: {}", err),
                    None,
                )
                .context("Failed to open audio output stream")?;

            stream.play().context("Failed to start audio output")?;
            self.stream = Some(stream);
            Ok(())
        }

        fn halt(&mut self) {
            self.halted.store(true, Ordering::Relaxed);
            if let Some(stream) = self.stream.take() {
                if let Err(err) = stream.pause() {
                    log::warn!("Failed to pause audio output: {}", err);
                }
            }
        }

        fn name(&self) -> &'static str {
            "device"
        }
    }
}
