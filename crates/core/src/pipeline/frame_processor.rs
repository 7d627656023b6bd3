use std::time::Instant;

use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::progress_reporter::ProgressReporter;

/// Per-frame operation shared by every runner: luminance → detect → blur.
///
/// Regions are blurred in the order the detector returned them, each one in
/// place, so overlapping regions compound.
pub struct FrameProcessor {
    detector: Box<dyn FaceDetector>,
    blurrer: Box<dyn FrameBlurrer>,
}

impl FrameProcessor {
    pub fn new(detector: Box<dyn FaceDetector>, blurrer: Box<dyn FrameBlurrer>) -> Self {
        Self { detector, blurrer }
    }

    /// Blurs every detected face in `frame` and returns the detected regions.
    pub fn process(
        &mut self,
        frame: &mut Frame,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let t0 = Instant::now();
        let luma = frame.to_luma();
        let regions = self.detector.detect(&luma)?;
        reporter.timing("detect", t0.elapsed().as_secs_f64() * 1000.0);

        let t0 = Instant::now();
        self.blurrer.blur(frame, &regions)?;
        reporter.timing("blur", t0.elapsed().as_secs_f64() * 1000.0);

        log::debug!("Frame {}: blurred {} regions", frame.index(), regions.len());
        Ok(regions)
    }
}
