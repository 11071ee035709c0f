use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::error::LibraryError;
use crate::sampler::{self, ExtractReport, ExtractStatus, SamplerOptions, TargetFps};

/// Video file extensions accepted for upload (compared case-insensitively).
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Returns true if `name` ends in one of [`VIDEO_EXTENSIONS`].
pub fn is_accepted_video(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
}

/// Where uploaded videos and extracted frames live.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Flat directory holding uploaded videos.
    pub upload_dir: PathBuf,
    /// One subdirectory per processed video.
    pub output_dir: PathBuf,
}

/// Result of processing one video of a batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub video: String,
    pub destination: PathBuf,
    pub report: ExtractReport,
}

/// Upload, listing and gallery operations over a [`LibraryConfig`].
pub struct MediaLibrary {
    config: LibraryConfig,
}

impl MediaLibrary {
    pub fn new(config: LibraryConfig) -> Self {
        Self { config }
    }

    /// Copy a video into the upload directory, replacing any file of the same name.
    pub fn import_video(&self, source: &Path) -> Result<PathBuf, LibraryError> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.is_empty() {
            warn!(?source, "no file selected");
            return Err(LibraryError::NoFileSelected);
        }
        if !is_accepted_video(name) {
            warn!(?source, "rejected upload with unsupported extension");
            return Err(LibraryError::InvalidFileType(name.to_string()));
        }

        ensure_dir(&self.config.upload_dir)?;
        let stored = self.config.upload_dir.join(name);
        let copy_err = |e: std::io::Error| {
            LibraryError::io(
                format!("failed to copy {} to upload directory", source.display()),
                e,
            )
        };

        // Copying a file onto itself truncates it.
        let canonical_source = source.canonicalize().map_err(copy_err)?;
        if stored.canonicalize().ok().as_deref() == Some(canonical_source.as_path()) {
            info!(?stored, "video already in upload directory");
            return Ok(stored);
        }

        std::fs::copy(source, &stored).map_err(copy_err)?;

        info!(?source, ?stored, "video uploaded");
        Ok(stored)
    }

    /// Uploaded videos with an accepted extension, sorted by name.
    pub fn list_videos(&self) -> Result<Vec<String>, LibraryError> {
        let mut videos: Vec<String> = read_entries(&self.config.upload_dir)?
            .into_iter()
            .filter(|(_, path)| path.is_file())
            .map(|(name, _)| name)
            .filter(|name| is_accepted_video(name))
            .collect();
        videos.sort();
        Ok(videos)
    }

    /// Output folders, one per processed video, sorted by name.
    pub fn list_output_folders(&self) -> Result<Vec<String>, LibraryError> {
        let mut folders: Vec<String> = read_entries(&self.config.output_dir)?
            .into_iter()
            .filter(|(_, path)| path.is_dir())
            .map(|(name, _)| name)
            .collect();
        folders.sort();
        Ok(folders)
    }

    /// Image files inside one output folder, sorted by name.
    pub fn gallery(&self, folder: &str) -> Result<Vec<String>, LibraryError> {
        let dir = self.config.output_dir.join(plain_name(folder)?);
        if !dir.is_dir() {
            warn!(?dir, "gallery folder does not exist");
            return Err(LibraryError::FolderNotFound(folder.to_string()));
        }

        let mut images: Vec<String> = read_entries(&dir)?
            .into_iter()
            .filter(|(_, path)| path.is_file())
            .map(|(name, _)| name)
            .collect();
        images.sort();
        Ok(images)
    }

    /// Path of one image inside an output folder.
    pub fn image_path(&self, folder: &str, file: &str) -> Result<PathBuf, LibraryError> {
        Ok(self
            .config
            .output_dir
            .join(plain_name(folder)?)
            .join(plain_name(file)?))
    }

    /// Output folder for a video: its file name with the extension stripped.
    pub fn output_dir_for(&self, video: &str) -> PathBuf {
        let stem = Path::new(video)
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| video.into());
        self.config.output_dir.join(stem)
    }

    /// Extract frames from each selected upload, one after another.
    ///
    /// A failure on one video does not stop the others. Only a raised
    /// cancellation flag ends the batch early.
    pub fn process_batch(
        &self,
        videos: &[String],
        target: TargetFps,
        options: &SamplerOptions,
    ) -> Vec<BatchEntry> {
        info!(count = videos.len(), %target, "processing batch");

        let mut entries = Vec::with_capacity(videos.len());
        for video in videos {
            let destination = self.output_dir_for(video);
            let report = match plain_name(video) {
                Ok(name) => sampler::extract(
                    &self.config.upload_dir.join(name),
                    &destination,
                    target,
                    options,
                ),
                Err(e) => {
                    warn!(%video, %e, "skipping video with invalid name");
                    ExtractReport::unreadable(e.to_string())
                }
            };

            let cancelled = matches!(report.status, ExtractStatus::Cancelled);
            entries.push(BatchEntry {
                video: video.clone(),
                destination,
                report,
            });
            if cancelled {
                warn!(processed = entries.len(), "batch cancelled");
                break;
            }
        }

        info!(
            processed = entries.len(),
            frames_saved = entries.iter().map(|e| e.report.frames_saved).sum::<u64>(),
            "batch complete"
        );
        entries
    }
}

/// Accept only a single normal path component, so names cannot escape their directory.
fn plain_name(name: &str) -> Result<&str, LibraryError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(LibraryError::InvalidName(name.to_string())),
    }
}

fn ensure_dir(dir: &Path) -> Result<(), LibraryError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| LibraryError::io(format!("failed to create {}", dir.display()), e))
}

/// Names and paths of the entries in `dir`, creating it first if missing.
/// Entries with non-UTF-8 names are skipped.
fn read_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, LibraryError> {
    ensure_dir(dir)?;
    let read_err =
        |e: std::io::Error| LibraryError::io(format!("failed to read {}", dir.display()), e);

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        match entry.file_name().into_string() {
            Ok(name) => entries.push((name, entry.path())),
            Err(name) => warn!(?name, "skipping entry with non UTF-8 name"),
        }
    }
    Ok(entries)
}
