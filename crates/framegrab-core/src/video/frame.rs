use image::RgbImage;

/// A single decoded video frame with metadata.
#[derive(Debug)]
pub struct Frame {
    /// The frame's image data.
    pub image: RgbImage,
    /// Absolute frame number from the start of the source (0-based).
    pub frame_number: u32,
    /// Elapsed seconds from the start of the source.
    pub timestamp_seconds: f64,
}

impl Frame {
    /// Build a frame, deriving its timestamp from the native rate.
    /// A non-positive rate gives a timestamp of 0.0.
    pub fn new(image: RgbImage, frame_number: u32, fps: f64) -> Self {
        let timestamp_seconds = if fps > 0.0 {
            frame_number as f64 / fps
        } else {
            0.0
        };
        Self {
            image,
            frame_number,
            timestamp_seconds,
        }
    }
}
