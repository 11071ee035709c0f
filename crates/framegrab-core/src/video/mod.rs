pub mod decoder;
pub mod frame;

use anyhow::Result;

use frame::Frame;

/// A sequential stream of decoded frames.
pub trait FrameSource {
    /// Native frame rate reported by the source. May be 0.0 when unknown.
    fn native_fps(&self) -> f64;

    /// Decode the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
