use std::fmt;
use std::path::PathBuf;

use super::constants::{DEFAULT_CAMERA_DEVICE, DEFAULT_CAMERA_FORMAT};

/// A capture device as libavdevice understands it: an input format name
/// (`v4l2`, `avfoundation`, `dshow`) and a device string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraDevice {
    pub format: String,
    pub device: String,
}

impl Default for CameraDevice {
    fn default() -> Self {
        Self {
            format: DEFAULT_CAMERA_FORMAT.to_string(),
            device: DEFAULT_CAMERA_DEVICE.to_string(),
        }
    }
}

impl fmt::Display for CameraDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format, self.device)
    }
}

/// Where a video stream comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoSource {
    File(PathBuf),
    Camera(CameraDevice),
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSource::File(path) => write!(f, "{}", path.display()),
            VideoSource::Camera(device) => write!(f, "camera {device}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Zero when the source cannot report a frame count (cameras, some containers).
    pub total_frames: usize,
    pub codec: String,
    pub source: VideoSource,
}

impl VideoMetadata {
    pub fn has_frame_count(&self) -> bool {
        self.total_frames > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(total_frames: usize, source: VideoSource) -> VideoMetadata {
        VideoMetadata {
            width: 640,
            height: 480,
            fps: 30.0,
            total_frames,
            codec: "h264".to_string(),
            source,
        }
    }

    #[test]
    fn test_frame_count_known() {
        let m = meta(900, VideoSource::File(PathBuf::from("/tmp/test.mp4")));
        assert!(m.has_frame_count());
    }

    #[test]
    fn test_camera_has_no_frame_count() {
        let m = meta(0, VideoSource::Camera(CameraDevice::default()));
        assert!(!m.has_frame_count());
    }

    #[test]
    fn test_source_display() {
        let file = VideoSource::File(PathBuf::from("clip.mp4"));
        assert_eq!(file.to_string(), "clip.mp4");

        let cam = VideoSource::Camera(CameraDevice {
            format: "v4l2".to_string(),
            device: "/dev/video2".to_string(),
        });
        assert_eq!(cam.to_string(), "camera v4l2:/dev/video2");
    }

    #[test]
    fn test_default_camera_uses_platform_constants() {
        let cam = CameraDevice::default();
        assert_eq!(cam.format, DEFAULT_CAMERA_FORMAT);
        assert_eq!(cam.device, DEFAULT_CAMERA_DEVICE);
    }
}
