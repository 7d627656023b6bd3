use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use faceblur_core::shared::config::{BlurConfig, DetectorConfig, OutputConfig, ProcessingConfig};
use faceblur_core::shared::video_metadata::CameraDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    System,
    Dark,
    Light,
}

/// User settings persisted as JSON. Missing fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scale_factor: f64,
    pub min_neighbors: u32,
    pub min_size: u32,
    pub blur_kernel: usize,
    pub blur_sigma: f64,
    pub photo_dir: PathBuf,
    pub video_dir: PathBuf,
    pub camera_format: String,
    pub camera_device: String,
    pub appearance: Appearance,
}

impl Default for Settings {
    fn default() -> Self {
        let processing = ProcessingConfig::default();
        let output = OutputConfig::default();
        let camera = CameraDevice::default();
        Self {
            scale_factor: processing.detector.scale_factor,
            min_neighbors: processing.detector.min_neighbors,
            min_size: processing.detector.min_size,
            blur_kernel: processing.blur.kernel_size,
            blur_sigma: processing.blur.sigma,
            photo_dir: output.photo_dir,
            video_dir: output.video_dir,
            camera_format: camera.format,
            camera_device: camera.device,
            appearance: Appearance::System,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceBlur").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_or_create(&path))
            .unwrap_or_default()
    }

    /// Like [`Settings::load_from`], but a missing file is first written
    /// with the defaults so there is something to edit.
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            return Self::load_from(path);
        }
        let settings = Self::default();
        settings.save_to(path);
        log::info!("Wrote default settings to {}", path.display());
        settings
    }

    /// Reads `path`; a missing, unreadable or invalid file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let Some(settings) = fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str::<Settings>(&json).ok())
        else {
            return Self::default();
        };
        match settings.processing_config().validate() {
            Ok(()) => settings,
            Err(e) => {
                log::warn!("Ignoring settings in {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(self) {
            if let Err(e) = fs::write(path, json) {
                log::warn!("Could not save settings to {}: {e}", path.display());
            }
        }
    }

    pub fn processing_config(&self) -> ProcessingConfig {
        ProcessingConfig {
            detector: DetectorConfig {
                scale_factor: self.scale_factor,
                min_neighbors: self.min_neighbors,
                min_size: self.min_size,
            },
            blur: BlurConfig {
                kernel_size: self.blur_kernel,
                sigma: self.blur_sigma,
            },
        }
    }

    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            photo_dir: self.photo_dir.clone(),
            video_dir: self.video_dir.clone(),
        }
    }

    pub fn camera(&self) -> CameraDevice {
        CameraDevice {
            format: self.camera_format.clone(),
            device: self.camera_device.clone(),
        }
    }
}
