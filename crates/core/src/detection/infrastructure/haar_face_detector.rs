use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::rect_grouper::{group_rectangles, GROUP_EPS};
use crate::shared::config::DetectorConfig;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::haar_cascade::{HaarCascade, HaarFeature};
use super::integral_image::IntegralImage;

/// Windows whose inner area divided by `sqrt(variance)` reaches this are
/// skipped, i.e. windows with a pixel standard deviation of 10 or less.
const MIN_CONTRAST_RATIO: f64 = 0.1;

/// Multi-scale sliding-window face detector driven by a boosted Haar cascade.
///
/// The input is shrunk by `scale_factor` per pyramid level while the cascade
/// window stays fixed. Every window that passes all stages becomes a
/// candidate; candidates are then clustered and filtered by
/// `min_neighbors`.
pub struct HaarFaceDetector {
    cascade: Arc<HaarCascade>,
    config: DetectorConfig,
}

impl HaarFaceDetector {
    /// The cascade is shared so several detectors (one per run) can reuse a
    /// single parsed model.
    pub fn new(cascade: Arc<HaarCascade>, config: DetectorConfig) -> Self {
        Self { cascade, config }
    }

    /// Pyramid factors whose scaled window still fits in a `width` x `height` image.
    fn scales(&self, width: u32, height: u32) -> Vec<f64> {
        let (ww, wh) = (self.cascade.window_width as f64, self.cascade.window_height as f64);
        let min_size = self.config.min_size as f64;
        let mut scales = Vec::new();
        let mut factor = 1.0;
        loop {
            let win_w = (ww * factor).round();
            let win_h = (wh * factor).round();
            if win_w > width as f64 || win_h > height as f64 {
                break;
            }
            if win_w >= min_size && win_h >= min_size {
                scales.push(factor);
            }
            factor *= self.config.scale_factor;
        }
        scales
    }

    /// Every window, across all pyramid levels, that passes the full cascade.
    fn candidates(&self, luma: &Frame) -> Vec<Region> {
        let (width, height) = (luma.width(), luma.height());
        let (ww, wh) = (self.cascade.window_width, self.cascade.window_height);
        let mut hits = Vec::new();

        for factor in self.scales(width, height) {
            let sw = (width as f64 / factor).round() as u32;
            let sh = (height as f64 / factor).round() as u32;
            if sw <= ww || sh <= wh {
                continue;
            }

            let level;
            let pixels: &[u8] = if sw == width && sh == height {
                luma.data()
            } else {
                level = downscale(luma, sw, sh);
                level.as_raw().as_slice()
            };
            let ii = IntegralImage::new(pixels, sw as usize, sh as usize);

            let step = if factor > 2.0 { 1 } else { 2 };
            let before = hits.len();
            for y in (0..(sh - wh) as usize).step_by(step) {
                for x in (0..(sw - ww) as usize).step_by(step) {
                    if self.passes(&ii, x, y) {
                        hits.push(
                            Region::new(x as i32, y as i32, ww as i32, wh as i32).scaled(factor),
                        );
                    }
                }
            }
            log::trace!(
                "scale {factor:.3} ({sw}x{sh}): {} windows passed",
                hits.len() - before
            );
        }
        hits
    }

    fn passes(&self, ii: &IntegralImage, x: usize, y: usize) -> bool {
        let (ww, wh) = (
            self.cascade.window_width as usize,
            self.cascade.window_height as usize,
        );
        let norm_area = ((ww - 2) * (wh - 2)) as f64;
        let sum = ii.rect_sum(x + 1, y + 1, ww - 2, wh - 2) as f64;
        let sq_sum = ii.rect_sq_sum(x + 1, y + 1, ww - 2, wh - 2) as f64;
        let variance = norm_area * sq_sum - sum * sum;
        if variance <= 0.0 {
            return false;
        }
        let norm = variance.sqrt();
        if norm_area / norm >= MIN_CONTRAST_RATIO {
            return false;
        }

        let features = &self.cascade.features;
        self.cascade.stages.iter().all(|stage| {
            let total: f64 = stage
                .classifiers
                .iter()
                .map(|weak| {
                    weak.evaluate(|node| feature_value(&features[node.feature], ii, x, y) / norm)
                })
                .sum();
            total >= stage.threshold
        })
    }
}

fn feature_value(feature: &HaarFeature, ii: &IntegralImage, x: usize, y: usize) -> f64 {
    feature
        .rects
        .iter()
        .map(|r| {
            r.weight
                * ii.rect_sum(
                    x + r.x as usize,
                    y + r.y as usize,
                    r.width as usize,
                    r.height as usize,
                ) as f64
        })
        .sum()
}

fn downscale(luma: &Frame, width: u32, height: u32) -> GrayImage {
    let view = image::ImageBuffer::<image::Luma<u8>, &[u8]>::from_raw(
        luma.width(),
        luma.height(),
        luma.data(),
    );
    match view {
        Some(view) => imageops::resize(&view, width, height, FilterType::Triangle),
        None => GrayImage::new(width, height),
    }
}

impl FaceDetector for HaarFaceDetector {
    fn detect(&mut self, luma: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if luma.channels() != 1 {
            return Err(format!(
                "face detection expects a single-channel frame, got {} channels",
                luma.channels()
            )
            .into());
        }
        if luma.width() <= self.cascade.window_width || luma.height() <= self.cascade.window_height
        {
            return Ok(Vec::new());
        }

        let candidates = self.candidates(luma);
        let faces: Vec<Region> = group_rectangles(&candidates, self.config.min_neighbors, GROUP_EPS)
            .into_iter()
            .map(|g| g.region)
            .collect();
        log::debug!(
            "Frame {}: {} candidate windows, {} faces",
            luma.index(),
            candidates.len(),
            faces.len()
        );
        Ok(faces)
    }
}
