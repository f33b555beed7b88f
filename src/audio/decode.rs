use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::SampleBuffer;
use crate::error::VizError;

pub fn read_file(path: &Path) -> Result<Vec<u8>, VizError> {
    std::fs::read(path).map_err(|source| VizError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn extension_hint(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Decode an in-memory audio file into planar channels.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer, VizError> {
    let byte_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| VizError::Decode(format!("unrecognized audio format ({e})")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| VizError::Decode("no audio tracks found".into()))?;

    let track_id = track.id;
    let mut channels = track.codec_params.channels.map_or(1, |c| c.count());
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VizError::Decode(format!("unsupported codec ({e})")))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                skipped_packets += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        sample_rate = spec.rate;

        let mut sample_buf = InterleavedBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    if skipped_packets > 0 {
        log::warn!("Skipped {} undecodable packets", skipped_packets);
    }

    if interleaved.is_empty() || sample_rate == 0 {
        return Err(VizError::Decode("stream contains no audio".into()));
    }

    let buffer = SampleBuffer::from_interleaved(&interleaved, channels, sample_rate);

    log::info!(
        "Decoded {} bytes: {} frames x {} channels, {}Hz, {:.1}s",
        byte_len,
        buffer.frames(),
        buffer.channel_count(),
        sample_rate,
        buffer.duration_secs()
    );

    Ok(buffer)
}

/// A decode running on a worker thread.
///
/// The owner either polls it from its frame loop or blocks on `wait`; both
/// give up once the timeout has elapsed since `spawn`.
pub struct PendingDecode {
    receiver: Receiver<Result<SampleBuffer, VizError>>,
    started: Instant,
    timeout: Duration,
    label: String,
}

impl PendingDecode {
    pub fn spawn(bytes: Vec<u8>, extension: Option<String>, label: String, timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("decode".into())
            .spawn(move || {
                let result = decode_bytes(bytes, extension.as_deref());
                // The receiver is gone when a newer load superseded this one.
                let _ = sender.send(result);
            });
        if let Err(err) = spawned {
            log::error!("Failed to start decode worker: {}", err);
        }

        Self {
            receiver,
            started: Instant::now(),
            timeout,
            label,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking check. `None` while the worker is still busy.
    pub fn poll(&self) -> Option<Result<SampleBuffer, VizError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => {
                if self.started.elapsed() >= self.timeout {
                    Some(Err(VizError::DecodeTimeout(self.timeout)))
                } else {
                    None
                }
            }
            Err(TryRecvError::Disconnected) => Some(Err(VizError::DecodeWorkerLost)),
        }
    }

    pub fn wait(self) -> Result<SampleBuffer, VizError> {
        let remaining = self.timeout.saturating_sub(self.started.elapsed());
        match self.receiver.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(VizError::DecodeTimeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(VizError::DecodeWorkerLost),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit PCM WAV built in memory.
    pub(crate) fn wav_bytes(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn pending_with(
        timeout: Duration,
    ) -> (mpsc::Sender<Result<SampleBuffer, VizError>>, PendingDecode) {
        let (sender, receiver) = mpsc::channel();
        let pending = PendingDecode {
            receiver,
            started: Instant::now(),
            timeout,
            label: "held.wav".into(),
        };
        (sender, pending)
    }

    #[test]
    fn poll_is_empty_while_the_worker_is_busy() {
        let (sender, pending) = pending_with(Duration::from_secs(60));
        assert!(pending.poll().is_none());

        sender
            .send(Ok(SampleBuffer::new(vec![vec![0.0; 8]], 8000)))
            .unwrap();
        let buffer = pending.poll().unwrap().unwrap();
        assert_eq!(buffer.frames(), 8);
    }

    #[test]
    fn poll_and_wait_give_up_after_the_timeout() {
        let (_sender, pending) = pending_with(Duration::ZERO);
        assert!(matches!(
            pending.poll(),
            Some(Err(VizError::DecodeTimeout(d))) if d == Duration::ZERO
        ));

        let (_sender, pending) = pending_with(Duration::from_millis(20));
        assert!(matches!(pending.wait(), Err(VizError::DecodeTimeout(_))));
    }

    #[test]
    fn vanished_worker_is_reported() {
        let (sender, pending) = pending_with(Duration::from_secs(60));
        drop(sender);
        assert!(matches!(pending.poll(), Some(Err(VizError::DecodeWorkerLost))));

        let (sender, pending) = pending_with(Duration::from_secs(60));
        drop(sender);
        assert!(matches!(pending.wait(), Err(VizError::DecodeWorkerLost)));
    }

    #[test]
    fn decodes_stereo_wav() {
        let samples: Vec<f32> = (0..2000)
            .flat_map(|i| {
                let v = (i as f32 * 0.05).sin() * 0.5;
                [v, -v]
            })
            .collect();
        let buffer = decode_bytes(wav_bytes(&samples, 2, 8000), Some("wav")).unwrap();

        assert_eq!(buffer.sample_rate(), 8000);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2000);
        // Opposite-phase channels cancel in the mixdown.
        assert!(buffer.mono().iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_bytes(b"definitely not audio".to_vec(), Some("mp3")).unwrap_err();
        assert!(matches!(err, VizError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn empty_input_is_a_decode_error() {
        let err = decode_bytes(Vec::new(), None).unwrap_err();
        assert!(matches!(err, VizError::Decode(_)));
    }

    #[test]
    fn pending_decode_delivers_result() {
        let bytes = wav_bytes(&vec![0.25; 800], 1, 8000);
        let pending = PendingDecode::spawn(bytes, Some("wav".into()), "tone.wav".into(), Duration::from_secs(10));
        assert_eq!(pending.label(), "tone.wav");
        let buffer = pending.wait().unwrap();
        assert_eq!(buffer.frames(), 800);
    }

    #[test]
    fn pending_decode_reports_failure() {
        let pending = PendingDecode::spawn(vec![0u8; 64], None, "junk".into(), Duration::from_secs(10));
        assert!(matches!(pending.wait(), Err(VizError::Decode(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_file(Path::new("/nonexistent/vizplay/input.wav")).unwrap_err();
        assert!(matches!(err, VizError::Io { .. }));
    }
}
