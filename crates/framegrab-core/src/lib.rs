pub mod error;
pub mod library;
pub mod sampler;
pub mod video;

#[cfg(test)]
mod test_support;

pub use error::{ExtractError, LibraryError};
pub use library::{LibraryConfig, MediaLibrary};
pub use sampler::{extract, ExtractReport, ExtractStatus, SamplerOptions, TargetFps};
