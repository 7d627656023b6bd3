use crate::shared::frame::Frame;
use crate::shared::video_metadata::{VideoMetadata, VideoSource};

/// Reads RGB frames from a video file or a live capture device.
///
/// Implementations handle I/O details (codec, container, capture API)
/// while the pipeline works with the abstract `Frame` and `VideoMetadata`
/// types.
pub trait VideoReader: Send {
    /// Opens the source and returns its metadata. Nothing is decoded yet.
    fn open(&mut self, source: &VideoSource) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in decode order.
    ///
    /// The iterator ends at end of stream; an `Err` item means the next
    /// frame could not be read.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    /// Releases any resources held by the reader.
    fn close(&mut self);
}
