use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::shared::constants::OUTPUT_VIDEO_EXTENSION;

/// `{photo_dir}/blurred_{basename}`, keeping the original extension.
pub fn photo_output_path(photo_dir: &Path, input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    photo_dir.join(format!("blurred_{name}"))
}

/// `{video_dir}/{stem}_blurred.avi`.
pub fn video_output_path(video_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    video_dir.join(format!("{stem}_blurred.{OUTPUT_VIDEO_EXTENSION}"))
}

/// `{video_dir}/webcam_blurred_{YYYYMMDD_HHMMSS}.avi` in local time.
pub fn webcam_output_path(video_dir: &Path, started_at: DateTime<Local>) -> PathBuf {
    video_dir.join(format!(
        "webcam_blurred_{}.{OUTPUT_VIDEO_EXTENSION}",
        started_at.format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("/home/me/pics/cat.jpg", "out/blurred_cat.jpg")]
    #[case("dog.PNG", "out/blurred_dog.PNG")]
    #[case("archive.tar.jpeg", "out/blurred_archive.tar.jpeg")]
    fn test_photo_output_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(
            photo_output_path(Path::new("out"), Path::new(input)),
            PathBuf::from(expected)
        );
    }

    #[rstest]
    #[case("/videos/party.mp4", "vids/party_blurred.avi")]
    #[case("clip.avi", "vids/clip_blurred.avi")]
    #[case("a.b.mp4", "vids/a.b_blurred.avi")]
    fn test_video_output_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(
            video_output_path(Path::new("vids"), Path::new(input)),
            PathBuf::from(expected)
        );
    }

    #[test]
    fn test_webcam_output_path_embeds_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(
            webcam_output_path(Path::new("vids"), at),
            PathBuf::from("vids/webcam_blurred_20240307_090502.avi")
        );
    }

    #[test]
    fn test_same_input_maps_to_same_output() {
        let a = photo_output_path(Path::new("out"), Path::new("x/cat.jpg"));
        let b = photo_output_path(Path::new("out"), Path::new("y/cat.jpg"));
        assert_eq!(a, b);
    }
}
