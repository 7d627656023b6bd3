use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::constants::{
    DEFAULT_BLUR_KERNEL, DEFAULT_BLUR_SIGMA, DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR,
    PHOTO_OUTPUT_FOLDER, VIDEO_OUTPUT_FOLDER,
};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("scale factor must be greater than 1.0, got {0}")]
    ScaleFactor(f64),
    #[error("blur kernel size must be odd and positive, got {0}")]
    KernelSize(usize),
    #[error("blur sigma must be positive, got {0}")]
    Sigma(f64),
}

/// Sensitivity of the face detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Ratio between successive pyramid scales.
    pub scale_factor: f64,
    /// A candidate needs strictly more than this many overlapping hits to be kept.
    pub min_neighbors: u32,
    /// Smallest face side in pixels; zero means the cascade's own window size.
    pub min_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: 0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale_factor > 1.0) {
            return Err(ConfigError::ScaleFactor(self.scale_factor));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurConfig {
    pub kernel_size: usize,
    pub sigma: f64,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            kernel_size: DEFAULT_BLUR_KERNEL,
            sigma: DEFAULT_BLUR_SIGMA,
        }
    }
}

impl BlurConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(ConfigError::KernelSize(self.kernel_size));
        }
        if !(self.sigma > 0.0) {
            return Err(ConfigError::Sigma(self.sigma));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProcessingConfig {
    pub detector: DetectorConfig,
    pub blur: BlurConfig,
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        self.blur.validate()
    }
}

/// Output directories for blurred photos and recordings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub photo_dir: PathBuf,
    pub video_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::under(Path::new("."))
    }
}

impl OutputConfig {
    /// The standard folder names beneath `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            photo_dir: root.join(PHOTO_OUTPUT_FOLDER),
            video_dir: root.join(VIDEO_OUTPUT_FOLDER),
        }
    }

    /// Creates both directories if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.photo_dir)?;
        fs::create_dir_all(&self.video_dir)
    }
}
