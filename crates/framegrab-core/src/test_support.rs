use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use image::{Rgb, RgbImage};

use crate::video::decoder::DecoderTools;
use crate::video::frame::Frame;
use crate::video::FrameSource;

/// In-memory frame stream. Optionally fails when asked for frame `fail_at`,
/// or raises a cancel flag once a given number of frames has been handed out.
pub struct SyntheticSource {
    pub fps: f64,
    pub total: u32,
    pub fail_at: Option<u32>,
    pub cancel_after: Option<(u32, Arc<AtomicBool>)>,
    pub next: u32,
}

impl SyntheticSource {
    pub fn new(fps: f64, total: u32) -> Self {
        Self {
            fps,
            total,
            fail_at: None,
            cancel_after: None,
            next: 0,
        }
    }

    pub fn failing_at(mut self, frame_number: u32) -> Self {
        self.fail_at = Some(frame_number);
        self
    }

    pub fn cancelling_after(mut self, frames: u32, flag: Arc<AtomicBool>) -> Self {
        self.cancel_after = Some((frames, flag));
        self
    }
}

impl FrameSource for SyntheticSource {
    fn native_fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_at == Some(self.next) {
            bail!("synthetic read failure at frame {}", self.next);
        }
        if self.next >= self.total {
            return Ok(None);
        }
        let shade = (self.next % 256) as u8;
        let image = RgbImage::from_pixel(8, 8, Rgb([shade, 255 - shade, 128]));
        let frame = Frame::new(image, self.next, self.fps);
        self.next += 1;
        if let Some((frames, flag)) = &self.cancel_after {
            if self.next == *frames {
                flag.store(true, Ordering::Relaxed);
            }
        }
        Ok(Some(frame))
    }
}

/// Render a 64x48 test pattern clip with ffmpeg. Tests calling this are
/// `#[ignore = "requires ffmpeg"]` and run with `cargo test -- --ignored`.
pub fn render_test_video(dir: &Path, name: &str, fps: u32, seconds: u32) -> PathBuf {
    let path = dir.join(name);
    let status = Command::new("ffmpeg")
        .args(["-nostdin", "-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=size=64x48:rate={fps}:duration={seconds}"))
        .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
        .arg(&path)
        .status()
        .expect("failed to run ffmpeg, is it installed?");
    assert!(status.success(), "ffmpeg failed to render test video");
    path
}

/// Copy `source` into an mp4 flagged with a 90 degree display rotation.
/// Uses `-display_rotation` where available and the legacy `rotate` tag otherwise.
pub fn render_rotated_copy(source: &Path, dir: &Path) -> PathBuf {
    let path = dir.join("rotated.mp4");
    let display_rotation = Command::new("ffmpeg")
        .args(["-nostdin", "-v", "error", "-y"])
        .args(["-display_rotation", "90", "-i"])
        .arg(source)
        .args(["-c", "copy"])
        .arg(&path)
        .status()
        .expect("failed to run ffmpeg, is it installed?");
    if display_rotation.success() {
        return path;
    }

    let status = Command::new("ffmpeg")
        .args(["-nostdin", "-v", "error", "-y", "-i"])
        .arg(source)
        .args(["-c", "copy", "-metadata:s:v:0", "rotate=90"])
        .arg(&path)
        .status()
        .expect("failed to run ffmpeg");
    assert!(status.success(), "ffmpeg failed to write rotated copy");
    path
}

/// Write stand-in ffprobe and ffmpeg shell scripts into `dir`.
#[cfg(unix)]
pub fn fake_tools(dir: &Path, ffprobe_body: &str, ffmpeg_body: &str) -> DecoderTools {
    use std::os::unix::fs::PermissionsExt;

    let write_script = |name: &str, body: &str| {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mode = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(&path, mode).unwrap();
        path
    };
    DecoderTools {
        ffprobe: write_script("fake-ffprobe", ffprobe_body),
        ffmpeg: write_script("fake-ffmpeg", ffmpeg_body),
    }
}

/// ffprobe stand-in reporting a 64x48 stream at 24 fps.
pub const FAKE_FFPROBE_64X48: &str = "printf 'width=64\\nheight=48\\nr_frame_rate=24/1\\n'";

/// Bytes of one raw RGB24 frame at 64x48.
pub const FRAME_BYTES_64X48: usize = 64 * 48 * 3;
