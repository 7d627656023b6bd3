use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Blurs rectangular regions of a frame in place.
///
/// Regions are applied in slice order; a later region sees the pixels an
/// earlier one already changed.
pub trait FrameBlurrer: Send {
    fn blur(&self, frame: &mut Frame, regions: &[Region])
        -> Result<(), Box<dyn std::error::Error>>;
}
