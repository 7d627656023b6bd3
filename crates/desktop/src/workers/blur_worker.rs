use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use iced::widget::image::Handle;

use faceblur_core::blurring::infrastructure::cpu_rectangular_blurrer::CpuRectangularBlurrer;
use faceblur_core::detection::infrastructure::haar_face_detector::HaarFaceDetector;
use faceblur_core::pipeline::frame_processor::FrameProcessor;
use faceblur_core::pipeline::photo_batch_runner::PhotoBatchRunner;
use faceblur_core::pipeline::progress_reporter::{LogProgressReporter, ProgressReporter};
use faceblur_core::pipeline::run_error::RunError;
use faceblur_core::pipeline::video_stream_runner::VideoStreamRunner;
use faceblur_core::shared::config::{OutputConfig, ProcessingConfig};
use faceblur_core::shared::frame::Frame;
use faceblur_core::shared::video_metadata::CameraDevice;
use faceblur_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use faceblur_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use faceblur_core::video::infrastructure::image_file_reader::ImageFileReader;
use faceblur_core::video::infrastructure::image_file_writer::ImageFileWriter;

use super::model_cache::ModelCache;

const PREVIEW_INTERVAL: Duration = Duration::from_millis(40);

/// Messages sent from the worker thread to the UI.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    DownloadProgress(u64, u64),
    Progress(u8, String),
    Status(String),
    Preview(Handle),
    /// Completion notice for the user, e.g. where the output was saved.
    Finished(String),
    Reset,
    Error(String),
    Cancelled,
    /// The worker has exited normally.
    Done,
}

#[derive(Debug, Clone)]
pub enum Job {
    Photos(Vec<PathBuf>),
    VideoFile(PathBuf),
    Webcam(CameraDevice),
}

pub struct JobParams {
    pub job: Job,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
    pub model_cache: Arc<ModelCache>,
}

/// The UI's side of a running job.
pub struct WorkerHandle {
    pub rx: Receiver<WorkerMessage>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Forwards runner events to the UI channel and mirrors them to the log,
/// which also keeps the per-stage timings for the end-of-run summary.
struct ChannelProgressReporter {
    tx: Sender<WorkerMessage>,
    log: LogProgressReporter,
}

impl ChannelProgressReporter {
    fn new(tx: Sender<WorkerMessage>) -> Self {
        Self {
            tx,
            log: LogProgressReporter::default(),
        }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn progress(&mut self, percent: u8, status: &str) {
        self.log.progress(percent, status);
        let _ = self
            .tx
            .send(WorkerMessage::Progress(percent, status.to_string()));
    }

    fn status(&mut self, status: &str) {
        self.log.status(status);
        let _ = self.tx.send(WorkerMessage::Status(status.to_string()));
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.log.timing(stage, duration_ms);
    }

    fn finished(&mut self, message: &str) {
        self.log.finished(message);
        let _ = self.tx.send(WorkerMessage::Finished(message.to_string()));
    }

    fn reset(&mut self) {
        self.log.reset();
        let _ = self.tx.send(WorkerMessage::Reset);
    }

    fn summary(&self) {
        self.log.summary();
    }
}

/// Spawn a background worker for `params.job`.
pub fn spawn(params: JobParams) -> WorkerHandle {
    let (tx, rx) = crossbeam_channel::unbounded::<WorkerMessage>();
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = cancelled.clone();

    thread::spawn(move || {
        match run_job(&tx, &cancelled_clone, params) {
            Ok(()) => {
                let _ = tx.send(WorkerMessage::Done);
            }
            Err(JobError::Cancelled) => {
                let _ = tx.send(WorkerMessage::Cancelled);
            }
            Err(JobError::Failed(message)) => {
                let _ = tx.send(WorkerMessage::Error(message));
            }
        }
    });

    WorkerHandle { rx, cancelled }
}

enum JobError {
    Cancelled,
    Failed(String),
}

fn run_job(
    tx: &Sender<WorkerMessage>,
    cancelled: &Arc<AtomicBool>,
    params: JobParams,
) -> Result<(), JobError> {
    let JobParams {
        job,
        processing,
        output,
        model_cache,
    } = params;
    let fail = |e: RunError| JobError::Failed(user_message(&job, &e));

    processing.validate().map_err(|e| fail(e.into()))?;

    let tx_dl = tx.clone();
    let cascade = model_cache
        .wait(
            &|dl, total| {
                let _ = tx_dl.send(WorkerMessage::DownloadProgress(dl, total));
            },
            cancelled,
        )
        .map_err(|e| {
            if cancelled.load(Ordering::Relaxed) {
                JobError::Cancelled
            } else {
                JobError::Failed(format!("Face model unavailable: {e}"))
            }
        })?;

    let processor = FrameProcessor::new(
        Box::new(HaarFaceDetector::new(cascade, processing.detector)),
        Box::new(CpuRectangularBlurrer::new(processing.blur)),
    );
    let mut reporter = ChannelProgressReporter::new(tx.clone());

    match &job {
        Job::Photos(paths) => {
            let mut runner = PhotoBatchRunner::new(
                Box::new(ImageFileReader::new()),
                Box::new(ImageFileWriter::new()),
                processor,
                output.photo_dir.clone(),
            );
            let summary = runner.run(paths, &mut reporter, cancelled).map_err(fail)?;
            if summary.cancelled {
                return Err(JobError::Cancelled);
            }
        }
        Job::VideoFile(path) => {
            video_runner(processor, &output)
                .run_file(path, &mut reporter, cancelled)
                .map_err(fail)?;
        }
        Job::Webcam(device) => {
            let mut last_preview: Option<Instant> = None;
            let mut preview = |frame: &Frame| {
                if last_preview.is_some_and(|t| t.elapsed() < PREVIEW_INTERVAL) {
                    return;
                }
                last_preview = Some(Instant::now());
                let _ = tx.send(WorkerMessage::Preview(to_handle(frame)));
            };
            video_runner(processor, &output)
                .run_camera(device, &mut reporter, cancelled, &mut preview)
                .map_err(fail)?;
        }
    }
    Ok(())
}

fn video_runner(processor: FrameProcessor, output: &OutputConfig) -> VideoStreamRunner {
    VideoStreamRunner::new(
        Box::new(FfmpegReader::new()),
        Box::new(FfmpegWriter::new()),
        processor,
        output.video_dir.clone(),
    )
}

/// Text shown in the error dialog for a failed job.
fn user_message(job: &Job, err: &RunError) -> String {
    log::error!("{err}");
    match (job, err) {
        (Job::VideoFile(_), RunError::SourceUnavailable { .. }) => "Cannot open video file.".into(),
        (Job::Webcam(_), RunError::SourceUnavailable { .. }) => "Cannot access webcam.".into(),
        _ => err.to_string(),
    }
}

fn to_handle(frame: &Frame) -> Handle {
    let rgba: Vec<u8> = frame
        .data()
        .chunks_exact(3)
        .flat_map(|px| [px[0], px[1], px[2], 255])
        .collect();
    Handle::from_rgba(frame.width(), frame.height(), rgba)
}
