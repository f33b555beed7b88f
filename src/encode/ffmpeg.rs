use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use super::FrameSink;
use crate::render::surface::Surface;

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

/// Encodes raw RGBA frames to a video file, muxing in the source audio.
pub struct FfmpegEncoder {
    child: Child,
    width: u32,
    height: u32,
}

impl FfmpegEncoder {
    pub fn new(
        output_path: &Path,
        input_audio: &Path,
        width: u32,
        height: u32,
        fps: u32,
        settings: &EncoderSettings,
    ) -> Result<Self> {
        let args = encoder_args(output_path, input_audio, width, height, fps, settings);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            width,
            height,
            fps,
            settings.codec
        );

        Ok(Self {
            child,
            width,
            height,
        })
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, surface: &Surface) -> Result<()> {
        if (surface.width(), surface.height()) != (self.width, self.height) {
            anyhow::bail!(
                "Frame is {}x{} but the encoder was opened at {}x{}",
                surface.width(),
                surface.height(),
                self.width,
                self.height
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin
            .write_all(surface.pixels())
            .context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        anyhow::bail!(
            "Cannot resize a video file mid-stream ({}x{} -> {}x{})",
            self.width,
            self.height,
            width,
            height
        )
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

/// Live preview window: frames are piped to `ffplay`.
pub struct FfplayViewer {
    child: Option<Child>,
    width: u32,
    height: u32,
    fps: u32,
    title: String,
}

impl FfplayViewer {
    pub fn new(width: u32, height: u32, fps: u32, title: &str) -> Result<Self> {
        let mut viewer = Self {
            child: None,
            width,
            height,
            fps,
            title: title.to_string(),
        };
        viewer.spawn()?;
        Ok(viewer)
    }

    fn spawn(&mut self) -> Result<()> {
        let args = viewer_args(self.width, self.height, self.fps, &self.title);
        let child = Command::new("ffplay")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn ffplay. Is ffmpeg installed? Use --headless to run without a window")?;
        log::info!("Viewer window opened at {}x{}", self.width, self.height);
        self.child = Some(child);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            drop(child.stdin.take());
            if let Err(err) = child.kill() {
                log::debug!("ffplay already exited: {}", err);
            }
            let _ = child.wait();
        }
    }
}

impl FrameSink for FfplayViewer {
    fn write_frame(&mut self, surface: &Surface) -> Result<()> {
        let stdin = self
            .child
            .as_mut()
            .and_then(|c| c.stdin.as_mut())
            .context("Viewer is not running")?;
        stdin
            .write_all(surface.pixels())
            .context("Viewer window closed")?;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.close();
        self.width = width;
        self.height = height;
        self.spawn()
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.close();
        Ok(())
    }
}

impl Drop for FfplayViewer {
    fn drop(&mut self) {
        self.close();
    }
}

fn raw_input_args(width: u32, height: u32, fps: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        "rgba".into(),
        "-video_size".into(),
        format!("{}x{}", width, height),
        "-framerate".into(),
        fps.to_string(),
    ]
}

fn encoder_args(
    output_path: &Path,
    input_audio: &Path,
    width: u32,
    height: u32,
    fps: u32,
    settings: &EncoderSettings,
) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    args.extend(raw_input_args(width, height, fps));
    args.extend([
        "-i".into(),
        "pipe:0".into(),
        "-i".into(),
        path_arg(input_audio),
        "-c:v".into(),
        settings.codec.clone(),
        "-pix_fmt".into(),
        settings.pix_fmt.clone(),
    ]);

    if let Some(ref br) = settings.bitrate {
        args.extend(["-b:v".to_string(), br.clone()]);
    } else {
        args.extend(["-crf".to_string(), settings.crf.to_string()]);
        args.extend(["-preset".to_string(), "medium".to_string()]);
    }

    args.extend([
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-shortest".into(),
        path_arg(output_path),
    ]);
    args
}

fn viewer_args(width: u32, height: u32, fps: u32, title: &str) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".into(),
        "error".into(),
        "-window_title".into(),
        title.to_string(),
        "-fflags".into(),
        "nobuffer".into(),
    ];
    args.extend(raw_input_args(width, height, fps));
    args.extend(["-i".into(), "pipe:0".into()]);
    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
