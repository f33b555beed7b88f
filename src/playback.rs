use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::audio::analyser::{Analyser, AnalyserSettings, Snapshot};
use crate::audio::buffer::SampleBuffer;
use crate::audio::output::AudioSink;
use crate::error::VizError;
use crate::render::scheduler::{FrameScheduler, FrameTick, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// Enabled flags for the start/stop triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyPlaying,
    NoBufferLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotPlaying,
}

/// One pass over the loaded buffer, positioned by the session clock.
#[derive(Debug, Clone)]
pub struct SampleSource {
    started_at: Duration,
    frames: usize,
    sample_rate: u32,
}

impl SampleSource {
    fn new(buffer: &SampleBuffer, started_at: Duration) -> Self {
        Self {
            started_at,
            frames: buffer.frames(),
            sample_rate: buffer.sample_rate(),
        }
    }

    /// Frames played so far, capped at the buffer length.
    pub fn position(&self, now: Duration) -> usize {
        let elapsed = now.saturating_sub(self.started_at).as_secs_f64();
        ((elapsed * self.sample_rate as f64) as usize).min(self.frames)
    }

    pub fn elapsed_secs(&self, now: Duration) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.position(now) as f64 / self.sample_rate as f64
    }

    pub fn is_ended(&self, now: Duration) -> bool {
        self.position(now) >= self.frames
    }
}

/// Owns the loaded buffer, the active source and the frame subscription.
///
/// Every transition goes through `start`/`stop`, so there is never more than
/// one source or one subscription alive.
pub struct PlaybackController {
    buffer: Option<Arc<SampleBuffer>>,
    source: Option<SampleSource>,
    state: PlaybackState,
    sink: Box<dyn AudioSink>,
    analyser: Analyser,
    scheduler: FrameScheduler,
}

impl PlaybackController {
    pub fn new(
        sink: Box<dyn AudioSink>,
        analyser: AnalyserSettings,
        fps: u32,
    ) -> Result<Self, VizError> {
        Ok(Self {
            buffer: None,
            source: None,
            state: PlaybackState::Idle,
            sink,
            analyser: Analyser::new(analyser)?,
            scheduler: FrameScheduler::new(fps),
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn controls(&self) -> Controls {
        match self.state {
            PlaybackState::Playing => Controls {
                start_enabled: false,
                stop_enabled: true,
            },
            PlaybackState::Idle => Controls {
                start_enabled: self.buffer.is_some(),
                stop_enabled: false,
            },
        }
    }

    pub fn buffer(&self) -> Option<&Arc<SampleBuffer>> {
        self.buffer.as_ref()
    }

    pub fn source(&self) -> Option<&SampleSource> {
        self.source.as_ref()
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.scheduler.active()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.scheduler.active_count()
    }

    pub fn next_frame_due(&self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    pub fn frame_interval(&self) -> Duration {
        self.scheduler.interval()
    }

    /// Tear down whatever is playing before a new file is decoded.
    pub fn begin_load(&mut self) {
        self.stop();
    }

    /// Replace the current buffer with a freshly decoded one.
    pub fn install(&mut self, buffer: SampleBuffer) {
        self.stop();
        log::info!(
            "Loaded buffer: {:.1}s, {} channels, {}Hz",
            buffer.duration_secs(),
            buffer.channel_count(),
            buffer.sample_rate()
        );
        self.buffer = Some(Arc::new(buffer));
        self.log_controls();
    }

    pub fn start(&mut self, now: Duration) -> Result<StartOutcome> {
        if self.state == PlaybackState::Playing {
            return Ok(StartOutcome::AlreadyPlaying);
        }
        let Some(buffer) = self.buffer.clone() else {
            return Ok(StartOutcome::NoBufferLoaded);
        };

        self.sink.play(&buffer)?;
        self.analyser.reset();
        self.source = Some(SampleSource::new(&buffer, now));
        self.state = PlaybackState::Playing;
        let sub = self.scheduler.request(now);

        log::info!(
            "Playback started ({} sink, {} frequency bins, frame subscription {})",
            self.sink.name(),
            self.analyser.frequency_bin_count(),
            sub.id
        );
        self.log_controls();
        Ok(StartOutcome::Started)
    }

    pub fn stop(&mut self) -> StopOutcome {
        if self.state != PlaybackState::Playing {
            return StopOutcome::NotPlaying;
        }

        self.sink.halt();
        self.scheduler.cancel();
        self.source = None;
        self.state = PlaybackState::Idle;

        log::info!("Playback stopped");
        self.log_controls();
        StopOutcome::Stopped
    }

    /// Stop when the source has run out. Returns true if it did.
    pub fn poll_end_of_stream(&mut self, now: Duration) -> bool {
        let ended = self.state == PlaybackState::Playing
            && self.source.as_ref().is_some_and(|s| s.is_ended(now));
        if ended {
            log::info!("End of stream");
            self.stop();
        }
        ended
    }

    pub fn poll_frame(&mut self, now: Duration) -> Option<FrameTick> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.scheduler.poll(now)
    }

    /// Fill the analyser snapshots for the current playback position.
    pub fn capture(&mut self, now: Duration) -> Option<(Snapshot<'_>, f64)> {
        let buffer = self.buffer.as_ref()?;
        let source = self.source.as_ref()?;
        let position = source.position(now);
        let elapsed = source.elapsed_secs(now);
        Some((self.analyser.capture(buffer.mono(), position), elapsed))
    }

    fn log_controls(&self) {
        let controls = self.controls();
        log::debug!(
            "Controls: start {}, stop {}",
            if controls.start_enabled { "enabled" } else { "disabled" },
            if controls.stop_enabled { "enabled" } else { "disabled" }
        );
    }
}
