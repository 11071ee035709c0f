use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framegrab_core::sampler::{self, TargetFps};
use framegrab_core::video::decoder::DecoderTools;

#[derive(Parser)]
#[command(name = "framegrab", about = "Extract evenly spaced frames from uploaded videos")]
pub struct Cli {
    /// Directory holding uploaded videos.
    #[arg(long, env = "FRAMEGRAB_UPLOAD_DIR", default_value = "static/uploads")]
    pub upload_dir: PathBuf,

    /// Directory receiving one frame folder per processed video.
    #[arg(long, env = "FRAMEGRAB_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// ffprobe executable used to read stream metadata.
    #[arg(long, env = "FRAMEGRAB_FFPROBE", default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    /// ffmpeg executable used to decode frames.
    #[arg(long, env = "FRAMEGRAB_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn decoder_tools(&self) -> DecoderTools {
        DecoderTools {
            ffprobe: self.ffprobe.clone(),
            ffmpeg: self.ffmpeg.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy video files (.mp4, .avi, .mov, .mkv) into the upload directory.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show uploaded videos and existing output folders.
    List,

    /// Extract frames from uploaded videos.
    Extract {
        /// Frames to keep per second of video.
        #[arg(short, long, default_value = "1")]
        fps: TargetFps,

        /// JPEG quality of the saved frames (1-100).
        #[arg(
            short,
            long,
            default_value_t = sampler::DEFAULT_JPEG_QUALITY,
            value_parser = clap::value_parser!(u8).range(1..=100)
        )]
        quality: u8,

        /// Process every uploaded video.
        #[arg(long, conflicts_with = "videos")]
        all: bool,

        /// File names of uploaded videos to process.
        #[arg(required_unless_present = "all")]
        videos: Vec<String>,
    },

    /// Print the frame images of one output folder.
    Gallery {
        /// Output folder name (the video name without extension).
        folder: String,
    },
}
