use std::path::PathBuf;

use thiserror::Error;

/// Reasons a single extraction can stop short.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid target frame rate {0:?}, expected a positive integer")]
    InvalidRate(String),

    #[error("stream unreadable: {0}")]
    StreamUnreadable(String),

    #[error("failed to create output directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write frame {}", path.display())]
    WriteFrame {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Errors from the media library (upload, listing, gallery).
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("no file selected")]
    NoFileSelected,

    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("folder does not exist: {0}")]
    FolderNotFound(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl LibraryError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
