use std::cell::RefCell;

use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::shared::config::BlurConfig;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::gaussian::{self, RoiRect};

/// CPU blurrer that replaces each rectangular region with a Gaussian-blurred
/// copy of itself.
///
/// Regions are processed one after another directly in the frame, so where
/// two regions overlap the later blur reads pixels the earlier one already
/// softened. Regions are clipped to the frame; empty ones are skipped.
pub struct CpuRectangularBlurrer {
    kernel: Vec<f32>,
    roi_buf: RefCell<Vec<u8>>,
    blur_temp: RefCell<Vec<f32>>,
}

impl CpuRectangularBlurrer {
    pub fn new(config: BlurConfig) -> Self {
        Self {
            kernel: gaussian::gaussian_kernel_1d(config.kernel_size, config.sigma),
            roi_buf: RefCell::new(Vec::new()),
            blur_temp: RefCell::new(Vec::new()),
        }
    }
}

impl Default for CpuRectangularBlurrer {
    fn default() -> Self {
        Self::new(BlurConfig::default())
    }
}

impl FrameBlurrer for CpuRectangularBlurrer {
    fn blur(
        &self,
        frame: &mut Frame,
        regions: &[Region],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (fw, fh) = (frame.width(), frame.height());
        let channels = frame.channels() as usize;
        let data = frame.data_mut();
        let mut roi = self.roi_buf.borrow_mut();
        let mut temp = self.blur_temp.borrow_mut();

        for r in regions {
            let Some(clipped) = r.clamp_to(fw, fh) else {
                continue;
            };
            let rect = RoiRect {
                x: clipped.x as usize,
                y: clipped.y as usize,
                w: clipped.width as usize,
                h: clipped.height as usize,
            };
            gaussian::extract_roi(data, fw as usize, channels, rect, &mut roi);
            gaussian::separable_gaussian_blur_with_kernel(
                &mut roi,
                rect.w,
                rect.h,
                channels,
                &self.kernel,
                &mut temp,
            );
            gaussian::write_roi_back(data, &roi, fw as usize, channels, rect);
        }

        Ok(())
    }
}
