pub const CASCADE_MODEL_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

pub const PHOTO_OUTPUT_FOLDER: &str = "blurred_photos";
pub const VIDEO_OUTPUT_FOLDER: &str = "output_videos";

/// Recordings are always written at this rate, whatever the source rate.
pub const OUTPUT_FPS: f64 = 20.0;
pub const OUTPUT_FOURCC: [u8; 4] = *b"XVID";
pub const OUTPUT_VIDEO_EXTENSION: &str = "avi";

pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 4;
pub const DEFAULT_BLUR_KERNEL: usize = 99;
pub const DEFAULT_BLUR_SIGMA: f64 = 30.0;

pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi"];

/// libavdevice input format and device name of the default camera.
#[cfg(target_os = "linux")]
pub const DEFAULT_CAMERA_FORMAT: &str = "v4l2";
#[cfg(target_os = "linux")]
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

#[cfg(target_os = "macos")]
pub const DEFAULT_CAMERA_FORMAT: &str = "avfoundation";
#[cfg(target_os = "macos")]
pub const DEFAULT_CAMERA_DEVICE: &str = "0";

#[cfg(target_os = "windows")]
pub const DEFAULT_CAMERA_FORMAT: &str = "dshow";
#[cfg(target_os = "windows")]
pub const DEFAULT_CAMERA_DEVICE: &str = "video=Integrated Camera";

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const DEFAULT_CAMERA_FORMAT: &str = "v4l2";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
