use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for face detection.
///
/// Takes a single-channel luminance frame and returns face bounding boxes in
/// that frame's coordinates. `&mut self` lets implementations reuse scratch
/// buffers between frames.
pub trait FaceDetector: Send {
    fn detect(&mut self, luma: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
