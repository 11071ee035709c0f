use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::frame::Frame;
use super::FrameSource;

/// Bytes of ffmpeg's stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 2048;

const STREAM_ENTRIES: &str =
    "stream=width,height,r_frame_rate:stream_tags=rotate:stream_side_data=rotation";

/// Locations of the ffprobe and ffmpeg executables.
#[derive(Debug, Clone)]
pub struct DecoderTools {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for DecoderTools {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

/// Video metadata reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StreamInfo {
    width: u32,
    height: u32,
    fps: f64,
}

fn read_stream_info(tools: &DecoderTools, path: &Path) -> Result<StreamInfo> {
    info!(?path, ffprobe = ?tools.ffprobe, "reading video metadata");

    let output = Command::new(&tools.ffprobe)
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", STREAM_ENTRIES,
            "-of", "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("failed to run ffprobe, is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        bail!("ffprobe failed: {}", stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let result = parse_stream_info(&stdout)?;

    if result.fps <= 0.0 {
        warn!(fps = result.fps, ?path, "video reports no usable frame rate");
    }

    info!(width = result.width, height = result.height, fps = result.fps, "stream info read");
    Ok(result)
}

/// Parse ffprobe's `key=value` lines for the first video stream.
///
/// ffmpeg autorotates its output, so a quarter-turn rotation (from the
/// display matrix or the legacy `rotate` tag) swaps the reported dimensions.
fn parse_stream_info(stdout: &str) -> Result<StreamInfo> {
    let mut width = None;
    let mut height = None;
    let mut fps = 0.0;
    let mut rotation = 0.0;

    for line in stdout.lines().map(str::trim) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "width" => width = Some(value.parse::<u32>().context("failed to parse width")?),
            "height" => height = Some(value.parse::<u32>().context("failed to parse height")?),
            "r_frame_rate" => fps = parse_frame_rate(value),
            "rotation" | "TAG:rotate" => rotation = value.trim().parse().unwrap_or(0.0),
            _ => {}
        }
    }

    let (Some(mut width), Some(mut height)) = (width, height) else {
        bail!("ffprobe found no video stream");
    };
    if width == 0 || height == 0 {
        bail!("invalid video dimensions: {width}x{height}");
    }

    if is_quarter_turn(rotation) {
        debug!(rotation, "rotated stream, swapping dimensions");
        std::mem::swap(&mut width, &mut height);
    }

    Ok(StreamInfo { width, height, fps })
}

fn is_quarter_turn(degrees: f64) -> bool {
    degrees.is_finite() && (degrees.round() as i64).rem_euclid(180) == 90
}

/// Parse a frame rate given either as `num/den` or as a plain number.
/// Anything unparseable, non-finite or negative reads as 0.0 (unknown).
fn parse_frame_rate(raw: &str) -> f64 {
    let raw = raw.trim();
    let fps = if let Some((num, den)) = raw.split_once('/') {
        match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(num), Ok(den)) if den > 0.0 => num / den,
            _ => 0.0,
        }
    } else {
        raw.parse().unwrap_or(0.0)
    };

    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        0.0
    }
}

/// Collect ffmpeg's stderr on a thread so the pipe never fills, keeping only the tail.
fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut tail = Vec::new();
        let mut chunk = [0u8; 1024];
        while let Ok(n) = stderr.read(&mut chunk) {
            if n == 0 {
                break;
            }
            tail.extend_from_slice(&chunk[..n]);
            if tail.len() > STDERR_TAIL_BYTES {
                tail.drain(..tail.len() - STDERR_TAIL_BYTES);
            }
        }
        String::from_utf8_lossy(&tail).trim().to_string()
    })
}

/// Decodes video frames by piping raw RGB24 data from the ffmpeg CLI.
pub struct VideoDecoder {
    child: Child,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: u32,
    frame_bytes: usize,
    finished: bool,
}

impl VideoDecoder {
    /// Open a video file for decoding.
    ///
    /// Fails when the file is missing, ffprobe cannot read a video stream from it,
    /// or the ffmpeg process cannot be spawned.
    pub fn open(path: &Path, tools: &DecoderTools) -> Result<Self> {
        if !path.is_file() {
            bail!("video file does not exist: {}", path.display());
        }

        let info = read_stream_info(tools, path)?;

        info!(?path, ffmpeg = ?tools.ffmpeg, "spawning ffmpeg decoder process");

        let mut child = Command::new(&tools.ffmpeg)
            .arg("-nostdin")
            .args(["-i"])
            .arg(path)
            .args([
                "-map", "0:v:0",
                "-an",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-v", "error",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ffmpeg, is ffmpeg installed?")?;

        let stderr = child.stderr.take().map(drain_stderr);
        let frame_bytes = (info.width as usize) * (info.height as usize) * 3;

        info!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            frame_bytes,
            "video decoder opened"
        );

        Ok(Self {
            child,
            stderr,
            width: info.width,
            height: info.height,
            fps: info.fps,
            frame_count: 0,
            frame_bytes,
            finished: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Read the next frame from the ffmpeg pipe, or `None` if the video is finished.
    ///
    /// A stream that ends because ffmpeg failed is an error, not an end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let stdout = self
            .child
            .stdout
            .as_mut()
            .context("ffmpeg stdout not available")?;

        let mut buf = vec![0u8; self.frame_bytes];
        let mut read = 0;

        while read < self.frame_bytes {
            match stdout.read(&mut buf[read..]) {
                Ok(0) => {
                    self.finished = true;
                    self.check_exit()?;
                    if read == 0 {
                        info!(total_frames = self.frame_count, "video stream ended");
                        return Ok(None);
                    }
                    error!(
                        read_bytes = read,
                        expected_bytes = self.frame_bytes,
                        frame = self.frame_count,
                        "ffmpeg stream ended mid-frame"
                    );
                    bail!(
                        "ffmpeg stream ended mid-frame (read {read}/{} bytes)",
                        self.frame_bytes,
                    );
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    error!(frame = self.frame_count, %e, "failed to read from ffmpeg pipe");
                    return Err(e).context("failed to read from ffmpeg pipe");
                }
            }
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .context("failed to create RgbImage from raw frame data")?;

        let frame = Frame::new(image, self.frame_count, self.fps);
        self.frame_count += 1;

        debug!(
            frame_number = frame.frame_number,
            timestamp_seconds = frame.timestamp_seconds,
            "decoded frame"
        );

        Ok(Some(frame))
    }

    /// Reap ffmpeg once its output is exhausted and fail if it exited unsuccessfully.
    fn check_exit(&mut self) -> Result<()> {
        let status = self.child.wait().context("failed to wait for ffmpeg")?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        error!(%status, %stderr, frame = self.frame_count, "ffmpeg exited with an error");
        if stderr.is_empty() {
            bail!("ffmpeg exited with {status}");
        }
        bail!("ffmpeg exited with {status}: {stderr}");
    }
}

impl FrameSource for VideoDecoder {
    fn native_fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        VideoDecoder::next_frame(self)
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        info!(total_frames = self.frame_count, "closing video decoder");
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}
