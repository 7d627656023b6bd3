use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Local;

use crate::shared::constants::OUTPUT_FPS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::{CameraDevice, VideoMetadata, VideoSource};
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

use super::frame_processor::FrameProcessor;
use super::infrastructure::threaded_stream_executor::{StreamOutcome, ThreadedStreamExecutor};
use super::output_paths::{video_output_path, webcam_output_path};
use super::progress_reporter::ProgressReporter;
use super::run_error::{cause, RunError};

pub const WEBCAM_STATUS: &str = "Press 'q' to stop webcam";

/// Lifecycle of a single video run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Opening,
    OpenFailed,
    Streaming,
    EndOfStream,
    StopRequested,
    Closing,
}

/// What a video run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRunSummary {
    pub output_path: PathBuf,
    pub frames_written: usize,
    pub stopped: bool,
}

/// Blurs a video file or a live camera feed into an AVI in the video
/// output directory.
///
/// A runner is consumed by one run; the reader and writer move onto the
/// executor's I/O threads.
pub struct VideoStreamRunner {
    reader: Box<dyn VideoReader>,
    writer: Box<dyn VideoWriter>,
    processor: FrameProcessor,
    output_dir: PathBuf,
    executor: ThreadedStreamExecutor,
    state: StreamState,
}

impl VideoStreamRunner {
    pub fn new(
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        processor: FrameProcessor,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            reader,
            writer,
            processor,
            output_dir,
            executor: ThreadedStreamExecutor::new(),
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Blurs every frame of `video_path` into `{stem}_blurred.avi`.
    ///
    /// Percentage progress is reported only when the container knows its
    /// frame count. A read failure mid-file ends the stream early.
    pub fn run_file(
        mut self,
        video_path: &Path,
        reporter: &mut dyn ProgressReporter,
        cancelled: &Arc<AtomicBool>,
    ) -> Result<VideoRunSummary, RunError> {
        let metadata = self.open(VideoSource::File(video_path.to_path_buf()))?;
        let output_path = video_output_path(&self.output_dir, video_path);
        let total_frames = if metadata.has_frame_count() {
            metadata.total_frames
        } else {
            log::info!("{video_path:?} does not report a frame count; progress disabled");
            0
        };

        let summary = self.stream(
            &metadata,
            output_path,
            total_frames,
            reporter,
            cancelled,
            &mut |_: &Frame| {},
        )?;

        reporter.reset();
        reporter.finished(&format!("Saved as {}", summary.output_path.display()));
        reporter.summary();
        Ok(summary)
    }

    /// Records `device` until `cancelled` is set or the device stops
    /// delivering frames. Each processed frame is also handed to `preview`.
    pub fn run_camera(
        mut self,
        device: &CameraDevice,
        reporter: &mut dyn ProgressReporter,
        cancelled: &Arc<AtomicBool>,
        preview: &mut dyn FnMut(&Frame),
    ) -> Result<VideoRunSummary, RunError> {
        let metadata = self.open(VideoSource::Camera(device.clone()))?;
        let output_path = webcam_output_path(&self.output_dir, Local::now());

        reporter.status(WEBCAM_STATUS);
        let summary = self.stream(&metadata, output_path, 0, reporter, cancelled, preview)?;

        reporter.reset();
        reporter.finished(&format!(
            "Saved webcam recording to {}",
            summary.output_path.display()
        ));
        reporter.summary();
        Ok(summary)
    }

    fn transition(&mut self, next: StreamState) {
        log_transition(&mut self.state, next);
    }

    fn open(&mut self, source: VideoSource) -> Result<VideoMetadata, RunError> {
        self.transition(StreamState::Opening);
        match self.reader.open(&source) {
            Ok(metadata) => {
                log::info!(
                    "Opened {source}: {}x{} @ {:.2} fps, {} frames",
                    metadata.width,
                    metadata.height,
                    metadata.fps,
                    metadata.total_frames
                );
                Ok(metadata)
            }
            Err(e) => {
                self.transition(StreamState::OpenFailed);
                Err(RunError::SourceUnavailable {
                    input: source.to_string(),
                    cause: cause(e),
                })
            }
        }
    }

    fn stream(
        mut self,
        metadata: &VideoMetadata,
        output_path: PathBuf,
        total_frames: usize,
        reporter: &mut dyn ProgressReporter,
        cancelled: &Arc<AtomicBool>,
        on_frame: &mut dyn FnMut(&Frame),
    ) -> Result<VideoRunSummary, RunError> {
        if let Err(io) = std::fs::create_dir_all(&self.output_dir) {
            self.reader.close();
            return Err(RunError::OutputDir {
                path: self.output_dir.clone(),
                io,
            });
        }

        let output_metadata = VideoMetadata {
            fps: OUTPUT_FPS,
            ..metadata.clone()
        };

        self.transition(StreamState::Streaming);
        log::info!("Writing {}", output_path.display());
        let result = self.executor.execute(
            self.reader,
            self.writer,
            &output_metadata,
            &output_path,
            total_frames,
            &mut self.processor,
            reporter,
            cancelled,
            on_frame,
        );

        let end = match &result {
            Ok(StreamOutcome { stopped: true, .. }) => StreamState::StopRequested,
            _ => StreamState::EndOfStream,
        };
        for next in [end, StreamState::Closing, StreamState::Idle] {
            log_transition(&mut self.state, next);
        }

        let outcome = result?;
        log::info!(
            "Wrote {} frames to {}",
            outcome.frames_written,
            output_path.display()
        );
        Ok(VideoRunSummary {
            output_path,
            frames_written: outcome.frames_written,
            stopped: outcome.stopped,
        })
    }
}

fn log_transition(state: &mut StreamState, next: StreamState) {
    log::debug!("Stream state: {state:?} -> {next:?}");
    *state = next;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use super::*;
    use crate::pipeline::frame_processor::test_support::{processor, textured_frame};
    use crate::pipeline::progress_reporter::test_support::{Event, RecordingProgressReporter};
    use crate::shared::region::Region;

    struct StubVideoReader {
        frames: Vec<Frame>,
        fail_open: bool,
        fail_at: Option<usize>,
        closed: Arc<AtomicBool>,
    }

    impl StubVideoReader {
        fn with_frames(count: usize) -> Self {
            Self {
                frames: (0..count).map(|i| textured_frame(32, 24, i)).collect(),
                fail_open: false,
                fail_at: None,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl VideoReader for StubVideoReader {
        fn open(
            &mut self,
            source: &VideoSource,
        ) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("no such device".into());
            }
            let total_frames = match source {
                VideoSource::File(_) => self.frames.len(),
                VideoSource::Camera(_) => 0,
            };
            Ok(VideoMetadata {
                width: 32,
                height: 24,
                fps: 29.97,
                total_frames,
                codec: "stub".into(),
                source: source.clone(),
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            let fail_at = self.fail_at;
            Box::new(self.frames.drain(..).enumerate().map(move |(i, f)| {
                if Some(i) == fail_at {
                    Err("corrupt packet".into())
                } else {
                    Ok(f)
                }
            }))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Relaxed);
        }
    }

    #[derive(Clone, Default)]
    struct StubVideoWriter {
        opened: Arc<Mutex<Option<(PathBuf, VideoMetadata)>>>,
        written: Arc<Mutex<Vec<usize>>>,
        fail_write: bool,
    }

    impl VideoWriter for StubVideoWriter {
        fn open(
            &mut self,
            path: &Path,
            metadata: &VideoMetadata,
        ) -> Result<(), Box<dyn std::error::Error>> {
            *self.opened.lock().unwrap() = Some((path.to_path_buf(), metadata.clone()));
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail_write {
                return Err("disk full".into());
            }
            self.written.lock().unwrap().push(frame.index());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    fn runner(reader: StubVideoReader, writer: StubVideoWriter, dir: &Path) -> VideoStreamRunner {
        VideoStreamRunner::new(
            Box::new(reader),
            Box::new(writer),
            processor(vec![Region::new(2, 2, 12, 12)]),
            dir.to_path_buf(),
        )
    }

    fn not_cancelled() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn test_file_frames_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StubVideoWriter::default();
        let summary = runner(StubVideoReader::with_frames(12), writer.clone(), dir.path())
            .run_file(
                Path::new("clips/party.mp4"),
                &mut RecordingProgressReporter::default(),
                &not_cancelled(),
            )
            .unwrap();

        assert_eq!(summary.frames_written, 12);
        assert!(!summary.stopped);
        assert_eq!(summary.output_path, dir.path().join("party_blurred.avi"));
        assert_eq!(*writer.written.lock().unwrap(), (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_output_uses_fixed_rate_and_native_size() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StubVideoWriter::default();
        runner(StubVideoReader::with_frames(2), writer.clone(), dir.path())
            .run_file(
                Path::new("a.mp4"),
                &mut RecordingProgressReporter::default(),
                &not_cancelled(),
            )
            .unwrap();

        let (path, meta) = writer.opened.lock().unwrap().clone().unwrap();
        assert_eq!(path, dir.path().join("a_blurred.avi"));
        assert_eq!((meta.width, meta.height), (32, 24));
        assert_eq!(meta.fps, OUTPUT_FPS);
    }

    #[test]
    fn test_file_progress_then_reset_then_saved_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = RecordingProgressReporter::default();
        runner(StubVideoReader::with_frames(4), StubVideoWriter::default(), dir.path())
            .run_file(Path::new("a.mp4"), &mut reporter, &not_cancelled())
            .unwrap();

        assert_eq!(reporter.percentages(), vec![25, 50, 75, 100, 0]);
        assert_eq!(
            reporter.events[0],
            Event::Progress(25, "Blurring video... 25%".to_string())
        );
        let expected = format!("Saved as {}", dir.path().join("a_blurred.avi").display());
        assert_eq!(reporter.finished_messages(), vec![expected.as_str()]);
    }

    #[test]
    fn test_unopenable_source_creates_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StubVideoWriter::default();
        let mut reader = StubVideoReader::with_frames(3);
        reader.fail_open = true;
        let mut reporter = RecordingProgressReporter::default();

        let err = runner(reader, writer.clone(), dir.path())
            .run_file(Path::new("missing.mp4"), &mut reporter, &not_cancelled())
            .unwrap_err();

        assert!(matches!(err, RunError::SourceUnavailable { .. }));
        assert!(writer.opened.lock().unwrap().is_none());
        assert!(reporter.events.is_empty());
    }

    #[test]
    fn test_read_error_ends_stream_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StubVideoWriter::default();
        let mut reader = StubVideoReader::with_frames(10);
        reader.fail_at = Some(6);
        let closed = reader.closed.clone();

        let summary = runner(reader, writer.clone(), dir.path())
            .run_file(
                Path::new("a.mp4"),
                &mut RecordingProgressReporter::default(),
                &not_cancelled(),
            )
            .unwrap();

        assert_eq!(summary.frames_written, 6);
        assert_eq!(*writer.written.lock().unwrap(), (0..6).collect::<Vec<_>>());
        assert!(closed.load(Ordering::Relaxed));
    }

    #[test]
    fn test_write_failure_is_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StubVideoWriter {
            fail_write: true,
            ..Default::default()
        };
        let err = runner(StubVideoReader::with_frames(30), writer, dir.path())
            .run_file(
                Path::new("a.mp4"),
                &mut RecordingProgressReporter::default(),
                &not_cancelled(),
            )
            .unwrap_err();
        assert!(matches!(err, RunError::Sink { .. }));
    }

    #[test]
    fn test_camera_stops_on_cancel_and_previews_each_frame() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StubVideoWriter::default();
        let cancelled = not_cancelled();
        let mut reporter = RecordingProgressReporter::default();
        let mut previewed = Vec::new();

        let flag = cancelled.clone();
        let summary = runner(StubVideoReader::with_frames(100), writer.clone(), dir.path())
            .run_camera(&CameraDevice::default(), &mut reporter, &cancelled, &mut |frame: &Frame| {
                previewed.push(frame.index());
                if previewed.len() == 3 {
                    flag.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();

        assert!(summary.stopped);
        assert_eq!(summary.frames_written, 3);
        assert_eq!(previewed, vec![0, 1, 2]);
        assert_eq!(*writer.written.lock().unwrap(), vec![0, 1, 2]);

        let name = summary.output_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("webcam_blurred_") && name.ends_with(".avi"));

        assert_eq!(reporter.events[0], Event::Status(WEBCAM_STATUS.to_string()));
        assert_eq!(reporter.percentages(), vec![0]);
        assert!(reporter.finished_messages()[0].starts_with("Saved webcam recording to"));
    }

    #[test]
    fn test_camera_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = StubVideoReader::with_frames(1);
        reader.fail_open = true;
        let err = runner(reader, StubVideoWriter::default(), dir.path())
            .run_camera(
                &CameraDevice::default(),
                &mut RecordingProgressReporter::default(),
                &not_cancelled(),
                &mut |_: &Frame| {},
            )
            .unwrap_err();
        assert!(matches!(err, RunError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_open_failure_moves_to_open_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = StubVideoReader::with_frames(1);
        reader.fail_open = true;
        let mut runner = runner(reader, StubVideoWriter::default(), dir.path());
        assert_eq!(runner.state(), StreamState::Idle);
        assert!(runner
            .open(VideoSource::File(PathBuf::from("x.mp4")))
            .is_err());
        assert_eq!(runner.state(), StreamState::OpenFailed);
    }
}
