use std::path::Path;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::audio::buffer::SampleBuffer;
use crate::audio::decode::{self, PendingDecode};
use crate::clock::Clock;
use crate::commands::{Command, HELP};
use crate::encode::FrameSink;
use crate::error::VizError;
use crate::playback::{PlaybackController, PlaybackState, StartOutcome, StopOutcome};
use crate::render::{FrameInput, RenderLoop};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub decode_timeout: Duration,
    /// Start playback as soon as a decode finishes.
    pub autoplay: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            decode_timeout: Duration::from_secs(30),
            autoplay: true,
        }
    }
}

/// Single-threaded driver: owns playback, drawing, time and the frame sink.
pub struct Session<C: Clock> {
    controller: PlaybackController,
    render: RenderLoop,
    clock: C,
    sink: Box<dyn FrameSink>,
    pending: Option<PendingDecode>,
    loaded: Option<String>,
    options: SessionOptions,
}

impl<C: Clock> Session<C> {
    pub fn new(
        controller: PlaybackController,
        render: RenderLoop,
        clock: C,
        sink: Box<dyn FrameSink>,
        options: SessionOptions,
    ) -> Self {
        Self {
            controller,
            render,
            clock,
            sink,
            pending: None,
            loaded: None,
            options,
        }
    }

    #[cfg(test)]
    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn is_decoding(&self) -> bool {
        self.pending.is_some()
    }

    /// Stop whatever is playing, then decode `path` in the background.
    pub fn load_file(&mut self, path: &Path) -> Result<(), VizError> {
        self.controller.begin_load();
        let bytes = decode::read_file(path)?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.load_bytes(bytes, decode::extension_hint(path), label);
        Ok(())
    }

    pub fn load_bytes(&mut self, bytes: Vec<u8>, extension: Option<String>, label: String) {
        self.controller.begin_load();
        if let Some(previous) = self.pending.take() {
            log::debug!("Discarding pending decode of {}", previous.label());
        }
        log::info!("Decoding {} ({} bytes)", label, bytes.len());
        self.pending = Some(PendingDecode::spawn(
            bytes,
            extension,
            label,
            self.options.decode_timeout,
        ));
    }

    /// Install a finished decode, autoplaying if enabled. Returns `None`
    /// while nothing has completed.
    pub fn poll_decode(&mut self) -> Option<Result<(), VizError>> {
        let result = self.pending.as_ref()?.poll()?;
        let pending = self.pending.take()?;
        let installed = self.finish_decode(pending.label().to_string(), result);
        if installed.is_ok() && self.options.autoplay {
            if let Err(err) = self.start() {
                log::error!("Failed to start playback: {:#}", err);
            }
        }
        Some(installed)
    }

    /// Poll the pending decode and report a failure without ending the session.
    fn check_decode(&mut self) {
        let Some(label) = self.pending.as_ref().map(|p| p.label().to_string()) else {
            return;
        };
        if let Some(Err(err)) = self.poll_decode() {
            report_decode_error(&label, &err);
        }
    }

    /// Block until the pending decode finishes and install it. Never autoplays.
    fn await_decode(&mut self) -> Result<()> {
        let pending = self.pending.take().context("No audio file loaded")?;
        let label = pending.label().to_string();
        let result = pending.wait();
        self.finish_decode(label.clone(), result)
            .with_context(|| format!("Failed to decode {}", label))
    }

    fn finish_decode(
        &mut self,
        label: String,
        result: Result<SampleBuffer, VizError>,
    ) -> Result<(), VizError> {
        let buffer = result?;
        self.controller.install(buffer);
        self.loaded = Some(label);
        Ok(())
    }

    /// Errors only when the audio sink refuses to play.
    pub fn start(&mut self) -> Result<StartOutcome> {
        let now = self.clock.now();
        let outcome = self.controller.start(now)?;
        match outcome {
            StartOutcome::Started => self.render.reset(),
            StartOutcome::NoBufferLoaded => log::warn!("Nothing loaded; use `load <path>` first"),
            StartOutcome::AlreadyPlaying => log::debug!("Start ignored: already playing"),
        }
        Ok(outcome)
    }

    pub fn stop(&mut self) -> StopOutcome {
        self.controller.stop()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.render.resize(width, height)?;
        self.sink
            .resize(width, height)
            .context("Frame sink rejected the new size")
    }

    /// Apply one command. Returns false when the session should end.
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start => {
                if let Err(err) = self.start() {
                    log::error!("Failed to start playback: {:#}", err);
                }
            }
            Command::Stop => {
                if self.stop() == StopOutcome::NotPlaying {
                    log::debug!("Stop ignored: not playing");
                }
            }
            Command::Load(path) => {
                if let Err(err) = self.load_file(&path) {
                    report_decode_error(&path.display().to_string(), &err);
                }
            }
            Command::Resize { width, height } => {
                if let Err(err) = self.resize(width, height) {
                    log::error!("Resize failed: {:#}", err);
                }
            }
            Command::Status => println!("{}", self.status_line()),
            Command::Quit => return false,
        }
        true
    }

    pub fn status_line(&self) -> String {
        let now = self.clock.now();
        let state = match self.controller.state() {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
        };
        let elapsed = self
            .controller
            .source()
            .map(|s| s.elapsed_secs(now))
            .unwrap_or(0.0);
        let controls = self.controller.controls();
        let surface = self.render.surface();
        let frames = match self.controller.subscription() {
            Some(sub) => format!(" | frame subscription {}", sub.id),
            None => String::new(),
        };
        format!(
            "{} | {} | {:.1}s | start {} stop {} | {} {}x{}{}{}",
            state,
            self.loaded.as_deref().unwrap_or("nothing loaded"),
            elapsed,
            if controls.start_enabled { "on" } else { "off" },
            if controls.stop_enabled { "on" } else { "off" },
            self.render.visualizer_name(),
            surface.width(),
            surface.height(),
            frames,
            if self.is_decoding() { " | decoding" } else { "" },
        )
    }

    /// Draw and emit a frame if one is due. Returns true if a frame was written.
    pub fn tick(&mut self) -> Result<bool> {
        let now = self.clock.now();
        if self.controller.poll_end_of_stream(now) {
            return Ok(false);
        }
        let Some(frame) = self.controller.poll_frame(now) else {
            return Ok(false);
        };
        log::trace!(
            "Frame {} of subscription {} due at {:?}",
            frame.index,
            frame.subscription,
            frame.at
        );
        let Some((snapshot, elapsed_secs)) = self.controller.capture(now) else {
            return Ok(false);
        };
        let input = FrameInput {
            snapshot,
            now,
            elapsed_secs,
        };
        let surface = self.render.draw(&input)?;
        self.sink.write_frame(surface)?;
        Ok(true)
    }

    fn wait_for_next_frame(&mut self) {
        let now = self.clock.now();
        let idle = now + self.controller.frame_interval();
        let deadline = self
            .controller
            .next_frame_due()
            .map_or(idle, |due| due.min(idle));
        self.clock.wait_until(deadline);
    }

    /// Interactive loop: commands arrive on `commands`, decodes are polled
    /// between frames.
    pub fn run_live(mut self, commands: Receiver<Command>) -> Result<()> {
        log::info!("Live session ready. {}", HELP);
        'session: loop {
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if !self.handle(command) {
                            break 'session;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'session,
                }
            }

            self.check_decode();

            if let Err(err) = self.tick() {
                log::warn!("Frame output stopped: {:#}", err);
                break;
            }
            self.wait_for_next_frame();
        }

        self.controller.stop();
        log::info!("Session ended after {} frames", self.render.frames_drawn());
        self.sink.finish()
    }

    /// Decode `input`, then open the real frame sink and render the file
    /// start to finish as fast as the sink accepts. A file that fails to
    /// decode never opens the sink.
    pub fn run_offline<F>(mut self, input: &Path, open_sink: F) -> Result<()>
    where
        F: FnOnce() -> Result<Box<dyn FrameSink>>,
    {
        self.load_file(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        self.await_decode()?;
        self.sink = open_sink()?;

        let progress = ProgressBar::new(0);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        let frames = self.render_to_end(&progress)?;
        progress.finish_with_message("done");
        log::info!("Rendered {} frames", frames);
        self.sink.finish()
    }

    /// Finish any pending decode, play the buffer once and emit every frame.
    pub fn render_to_end(&mut self, progress: &ProgressBar) -> Result<u64> {
        if self.pending.is_some() {
            self.await_decode()?;
        }

        if self.controller.state() != PlaybackState::Playing
            && self.start()? != StartOutcome::Started
        {
            anyhow::bail!("Playback did not start");
        }

        let interval = self.controller.frame_interval().as_secs_f64();
        let duration = self
            .controller
            .buffer()
            .map_or(0.0, |b| b.duration_secs());
        progress.set_length((duration / interval).ceil() as u64);

        let mut frames = 0u64;
        while self.controller.state() == PlaybackState::Playing {
            if self.tick()? {
                frames += 1;
                progress.inc(1);
            }
            self.wait_for_next_frame();
        }
        Ok(frames)
    }
}

/// Decode failures never end a live session; the user can load another file.
pub fn report_decode_error(label: &str, err: &VizError) {
    log::error!("Failed to load {}: {}", label, err);
    eprintln!("Could not load {}: {}", label, err);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use std::cell::Cell;
    use std::sync::Arc;

    use super::*;
    use crate::audio::analyser::AnalyserSettings;
    use crate::audio::decode::tests::wav_bytes;
    use crate::audio::output::tests::RecordingSink;
    use crate::audio::output::AudioSink;
    use crate::clock::VirtualClock;
    use crate::encode::NullFrameSink;
    use crate::render::bars::{BarStyle, BarVisualizer};
    use crate::render::frame::tests::FlatRasterizer;
    use crate::render::surface::Surface;

    struct FailingSink;

    impl AudioSink for FailingSink {
        fn play(&mut self, _buffer: &Arc<SampleBuffer>) -> Result<()> {
            anyhow::bail!("device unplugged")
        }

        fn halt(&mut self) {}

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct RecordingFrames {
        sizes: Rc<RefCell<Vec<(u32, u32)>>>,
    }

    impl FrameSink for RecordingFrames {
        fn write_frame(&mut self, surface: &Surface) -> Result<()> {
            assert_eq!(
                surface.pixels().len(),
                (surface.width() * surface.height() * 4) as usize
            );
            self.sizes
                .borrow_mut()
                .push((surface.width(), surface.height()));
            Ok(())
        }

        fn resize(&mut self, _width: u32, _height: u32) -> Result<()> {
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    type Fixture = (
        Session<VirtualClock>,
        Rc<RefCell<Vec<(u32, u32)>>>,
        Rc<RefCell<Vec<String>>>,
    );

    fn session(autoplay: bool) -> Fixture {
        let audio_events = Rc::new(RefCell::new(Vec::new()));
        let audio = RecordingSink {
            events: Rc::clone(&audio_events),
        };
        let (session, sizes) = session_with(Box::new(audio), autoplay);
        (session, sizes, audio_events)
    }

    fn session_with(
        audio: Box<dyn AudioSink>,
        autoplay: bool,
    ) -> (Session<VirtualClock>, Rc<RefCell<Vec<(u32, u32)>>>) {
        let controller = PlaybackController::new(
            audio,
            AnalyserSettings {
                fft_size: 256,
                ..AnalyserSettings::default()
            },
            10,
        )
        .unwrap();
        let render = RenderLoop::new(
            48,
            24,
            Box::new(BarVisualizer::new(BarStyle::default())),
            None,
            Box::new(FlatRasterizer),
        )
        .unwrap();
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let sink = RecordingFrames {
            sizes: Rc::clone(&sizes),
        };
        let options = SessionOptions {
            decode_timeout: Duration::from_secs(10),
            autoplay,
        };
        (
            Session::new(controller, render, VirtualClock::new(), Box::new(sink), options),
            sizes,
        )
    }

    /// Poll until the background decode has been handled.
    fn settle(session: &mut Session<VirtualClock>) {
        for _ in 0..1000 {
            if !session.is_decoding() {
                return;
            }
            session.check_decode();
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("decode did not settle");
    }

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("vizplay-{}-{}", std::process::id(), name));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// One second of 8kHz mono tone.
    fn tone_wav() -> Vec<u8> {
        let samples: Vec<f32> = (0..8000)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 8000.0).sin() * 0.5)
            .collect();
        wav_bytes(&samples, 1, 8000)
    }

    #[test]
    fn offline_render_runs_to_end_of_stream() {
        let (mut session, sizes, audio) = session(true);
        session.load_bytes(tone_wav(), Some("wav".into()), "tone.wav".into());

        let frames = session.render_to_end(&ProgressBar::hidden()).unwrap();

        // 1s at 10fps: frames at 0.0 through 0.9, end of stream at 1.0.
        assert_eq!(frames, 10);
        assert_eq!(sizes.borrow().len(), 10);
        assert_eq!(session.controller().state(), PlaybackState::Idle);
        assert_eq!(session.controller().active_subscriptions(), 0);
        assert_eq!(audio.borrow().as_slice(), ["play 8000", "halt"]);
    }

    #[test]
    fn offline_render_starts_without_autoplay() {
        let (mut session, _, _) = session(false);
        session.load_bytes(tone_wav(), Some("wav".into()), "tone.wav".into());
        assert_eq!(session.render_to_end(&ProgressBar::hidden()).unwrap(), 10);
    }

    #[test]
    fn offline_render_reports_decode_failure() {
        let (mut session, sizes, _) = session(true);
        session.load_bytes(b"not audio".to_vec(), Some("wav".into()), "junk.wav".into());
        let err = session.render_to_end(&ProgressBar::hidden()).unwrap_err();
        assert!(format!("{:#}", err).contains("junk.wav"));
        assert!(sizes.borrow().is_empty());
    }

    #[test]
    fn resize_applies_to_the_next_frame() {
        let (mut session, sizes, _) = session(false);
        session.load_bytes(tone_wav(), Some("wav".into()), "tone.wav".into());
        let pending = session.pending.take().unwrap();
        let result = pending.wait();
        session.finish_decode("tone.wav".into(), result).unwrap();

        assert!(session.handle(Command::Start));
        assert!(session.tick().unwrap());
        assert!(session.handle(Command::Resize {
            width: 64,
            height: 40
        }));
        session.wait_for_next_frame();
        assert!(session.tick().unwrap());

        assert_eq!(sizes.borrow().as_slice(), [(48, 24), (64, 40)]);
    }

    #[test]
    fn load_while_playing_stops_before_decoding() {
        let (mut session, _, audio) = session(false);
        session.load_bytes(tone_wav(), Some("wav".into()), "tone.wav".into());
        let pending = session.pending.take().unwrap();
        let result = pending.wait();
        session.finish_decode("tone.wav".into(), result).unwrap();
        session.handle(Command::Start);
        assert_eq!(session.controller().state(), PlaybackState::Playing);

        session.load_bytes(tone_wav(), Some("wav".into()), "again.wav".into());
        assert_eq!(session.controller().state(), PlaybackState::Idle);
        assert_eq!(session.controller().active_subscriptions(), 0);
        assert!(session.is_decoding());
        assert_eq!(audio.borrow().as_slice(), ["play 8000", "halt"]);
    }

    #[test]
    fn idle_session_draws_nothing() {
        let (mut session, sizes, _) = session(true);
        assert!(session.handle(Command::Start));
        assert!(!session.tick().unwrap());
        assert!(sizes.borrow().is_empty());
        assert!(session.status_line().starts_with("idle | nothing loaded"));
        assert!(!session.handle(Command::Quit));
    }

    #[test]
    fn live_decode_failure_leaves_session_usable() {
        let (mut session, sizes, audio) = session(true);
        session.load_bytes(b"not audio".to_vec(), Some("wav".into()), "junk.wav".into());
        settle(&mut session);
        assert_eq!(session.controller().state(), PlaybackState::Idle);
        assert!(session.status_line().starts_with("idle | nothing loaded"));
        assert!(!session.tick().unwrap());

        session.load_bytes(tone_wav(), Some("wav".into()), "tone.wav".into());
        settle(&mut session);
        assert_eq!(session.controller().state(), PlaybackState::Playing);
        assert!(session.status_line().contains("tone.wav"));
        assert!(session.status_line().contains("frame subscription"));
        assert!(session.tick().unwrap());
        assert_eq!(sizes.borrow().len(), 1);
        assert_eq!(audio.borrow().as_slice(), ["play 8000"]);
    }

    #[test]
    fn audio_sink_failure_is_an_error_not_a_missing_buffer() {
        let (mut session, sizes) = session_with(Box::new(FailingSink), false);
        session.load_bytes(tone_wav(), Some("wav".into()), "tone.wav".into());
        settle(&mut session);

        let err = session.start().unwrap_err();
        assert!(format!("{:#}", err).contains("device unplugged"));
        assert_eq!(session.controller().state(), PlaybackState::Idle);

        // The command path logs and keeps going.
        assert!(session.handle(Command::Start));
        assert!(session.render_to_end(&ProgressBar::hidden()).is_err());
        assert!(sizes.borrow().is_empty());
    }

    #[test]
    fn offline_decode_failure_never_opens_the_sink() {
        let (session, _, _) = session(true);
        let input = temp_file("junk.wav", b"not audio");
        let opened = Rc::new(Cell::new(false));
        let flag = Rc::clone(&opened);

        let result = session.run_offline(&input, move || {
            flag.set(true);
            Ok(Box::new(NullFrameSink::default()) as Box<dyn FrameSink>)
        });
        let _ = std::fs::remove_file(&input);

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("junk.wav"));
        assert!(!opened.get());
    }

    #[test]
    fn offline_run_renders_into_the_opened_sink() {
        let (session, placeholder_sizes, _) = session(true);
        let input = temp_file("tone.wav", &tone_wav());
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let sink = RecordingFrames {
            sizes: Rc::clone(&sizes),
        };

        let result = session.run_offline(&input, move || Ok(Box::new(sink) as Box<dyn FrameSink>));
        let _ = std::fs::remove_file(&input);

        result.unwrap();
        assert_eq!(sizes.borrow().len(), 10);
        assert!(placeholder_sizes.borrow().is_empty());
    }
}
