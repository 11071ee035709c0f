use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::num::NonZeroU32;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::error::ExtractError;
use crate::video::decoder::{DecoderTools, VideoDecoder};
use crate::video::FrameSource;

/// Default JPEG quality for saved frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Desired number of retained frames per second of source video. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFps(NonZeroU32);

impl TargetFps {
    pub fn new(fps: u32) -> Result<Self, ExtractError> {
        NonZeroU32::new(fps)
            .map(Self)
            .ok_or_else(|| ExtractError::InvalidRate(fps.to_string()))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl FromStr for TargetFps {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fps: u32 = s
            .trim()
            .parse()
            .map_err(|_| ExtractError::InvalidRate(s.to_string()))?;
        Self::new(fps).map_err(|_| ExtractError::InvalidRate(s.to_string()))
    }
}

impl fmt::Display for TargetFps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of native frames to advance between kept frames.
///
/// `max(1, floor(native / target))`. An unknown (0, negative or non-finite)
/// native rate keeps every frame.
pub fn stride(native_fps: f64, target: TargetFps) -> u32 {
    if !native_fps.is_finite() || native_fps <= 0.0 {
        return 1;
    }
    let raw = (native_fps / target.get() as f64).floor();
    if raw < 1.0 {
        1
    } else {
        raw.min(u32::MAX as f64) as u32
    }
}

/// File name of the `index`-th saved frame.
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index:05}.jpg")
}

/// Parameters for a single extraction.
#[derive(Debug, Clone)]
pub struct SamplerOptions {
    /// JPEG quality, 1 (worst) to 100 (best).
    pub jpeg_quality: u8,
    /// Checked between frames; once set, extraction stops.
    pub cancel: Option<Arc<AtomicBool>>,
    /// ffprobe and ffmpeg executables used to decode the source.
    pub tools: DecoderTools,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            cancel: None,
            tools: DecoderTools::default(),
        }
    }
}

impl SamplerOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// How an extraction ended.
#[derive(Debug)]
pub enum ExtractStatus {
    /// The stream was read to its end, or to a read failure after the first frame.
    Completed,
    /// The cancellation flag was raised between frames.
    Cancelled,
    /// Extraction could not start or could not write its output.
    Failed(ExtractError),
}

impl fmt::Display for ExtractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractStatus::Completed => write!(f, "completed"),
            ExtractStatus::Cancelled => write!(f, "cancelled"),
            ExtractStatus::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Outcome of one extraction call.
#[derive(Debug)]
pub struct ExtractReport {
    /// Stride used, or `None` if the stream never opened.
    pub stride: Option<u32>,
    pub frames_decoded: u64,
    pub frames_saved: u64,
    pub status: ExtractStatus,
}

impl ExtractReport {
    pub(crate) fn unreadable(reason: String) -> Self {
        Self {
            stride: None,
            frames_decoded: 0,
            frames_saved: 0,
            status: ExtractStatus::Failed(ExtractError::StreamUnreadable(reason)),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, ExtractStatus::Completed)
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(
            self.status,
            ExtractStatus::Failed(ExtractError::StreamUnreadable(_))
        )
    }
}

/// Decode `source` and save a uniformly sampled subset of its frames as
/// `frame_NNNNN.jpg` images in `destination`.
///
/// Never fails outright: a source that cannot be opened, or whose first frame
/// cannot be decoded, yields a report with zero saved frames and leaves
/// `destination` untouched.
pub fn extract(
    source: &Path,
    destination: &Path,
    target: TargetFps,
    options: &SamplerOptions,
) -> ExtractReport {
    info!(?source, ?destination, %target, "starting extraction");

    let mut decoder = match VideoDecoder::open(source, &options.tools) {
        Ok(decoder) => decoder,
        Err(e) => {
            let reason = format!("{e:#}");
            error!(?source, %reason, "could not open video file");
            return ExtractReport::unreadable(reason);
        }
    };

    let report = sample_frames(&mut decoder, destination, target, options);
    drop(decoder);

    info!(
        ?source,
        ?destination,
        frames_saved = report.frames_saved,
        frames_decoded = report.frames_decoded,
        "extraction finished"
    );
    report
}

/// Run the sampling loop over an already opened frame source.
///
/// `destination` is created just before the first frame is written, so a
/// source that yields no frames leaves no directory behind.
pub fn sample_frames<S: FrameSource>(
    source: &mut S,
    destination: &Path,
    target: TargetFps,
    options: &SamplerOptions,
) -> ExtractReport {
    let native_fps = source.native_fps();
    let stride = stride(native_fps, target);
    info!(native_fps, %target, stride, "sampling plan");

    let mut report = ExtractReport {
        stride: Some(stride),
        frames_decoded: 0,
        frames_saved: 0,
        status: ExtractStatus::Completed,
    };

    let stride = u64::from(stride);
    loop {
        if options.is_cancelled() {
            warn!(frames_saved = report.frames_saved, "extraction cancelled");
            report.status = ExtractStatus::Cancelled;
            break;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if report.frames_decoded == 0 => {
                let reason = format!("{e:#}");
                error!(%reason, "could not decode any frame");
                report.status = ExtractStatus::Failed(ExtractError::StreamUnreadable(reason));
                break;
            }
            Err(e) => {
                warn!(
                    frame_number = report.frames_decoded,
                    error = %format!("{e:#}"),
                    "read failure mid-stream, treating as end of stream"
                );
                break;
            }
        };
        let frame_number = report.frames_decoded;
        report.frames_decoded += 1;

        if frame_number % stride != 0 {
            continue;
        }

        if report.frames_saved == 0 {
            if let Err(e) = std::fs::create_dir_all(destination) {
                error!(?destination, %e, "failed to create output directory");
                report.status = ExtractStatus::Failed(ExtractError::CreateDir {
                    path: destination.to_path_buf(),
                    source: e,
                });
                break;
            }
        }

        let path = destination.join(frame_file_name(report.frames_saved));
        if let Err(e) = persist(&frame.image, &path, options.jpeg_quality) {
            error!(?path, %e, "failed to write frame");
            report.status = ExtractStatus::Failed(ExtractError::WriteFrame { path, source: e });
            break;
        }
        debug!(frame_number, ?path, "saved frame");
        report.frames_saved += 1;
    }

    info!(
        frames_saved = report.frames_saved,
        ?destination,
        "extracted {} frames",
        report.frames_saved
    );
    report
}

fn persist(image: &RgbImage, path: &Path, quality: u8) -> Result<(), image::ImageError> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100)).encode_image(image)?;
    writer.flush()?;
    Ok(())
}
