use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::pipeline::frame_processor::FrameProcessor;
use crate::pipeline::progress_reporter::ProgressReporter;
use crate::pipeline::run_error::{cause, Cause, RunError};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub frames_written: usize,
    pub stopped: bool,
}

/// Runs a video stream with dedicated threads for decoding and encoding.
///
/// Layout: `reader → runner thread [process] → writer`
///
/// Processing stays on the calling thread, so frames reach the writer in
/// the order they were decoded.
pub struct ThreadedStreamExecutor {
    channel_capacity: usize,
}

impl ThreadedStreamExecutor {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Streams every frame from the already opened `reader` through
    /// `processor` into `writer`, which is opened here at `output_path`.
    ///
    /// `total_frames` drives percentage progress; pass 0 when unknown.
    /// `on_frame` sees each processed frame before it is encoded.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &self,
        mut reader: Box<dyn VideoReader>,
        mut writer: Box<dyn VideoWriter>,
        output_metadata: &VideoMetadata,
        output_path: &Path,
        total_frames: usize,
        processor: &mut FrameProcessor,
        reporter: &mut dyn ProgressReporter,
        cancelled: &Arc<AtomicBool>,
        on_frame: &mut dyn FnMut(&Frame),
    ) -> Result<StreamOutcome, RunError> {
        if let Err(e) = writer.open(output_path, output_metadata) {
            reader.close();
            return Err(RunError::Sink {
                path: output_path.to_path_buf(),
                cause: cause(e),
            });
        }

        let cap = self.channel_capacity;
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Frame>(cap);
        let (write_tx, write_rx) = crossbeam_channel::bounded::<Frame>(cap);

        let reader_handle = spawn_reader(reader, frame_tx, cancelled.clone());
        let writer_handle = spawn_writer(writer, write_rx);

        let main_result = run_main_loop(
            frame_rx,
            &write_tx,
            processor,
            reporter,
            total_frames,
            cancelled,
            on_frame,
        );

        drop(write_tx);

        join_threads(reader_handle, writer_handle, output_path, main_result)
    }
}

impl Default for ThreadedStreamExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_reader(
    mut reader: Box<dyn VideoReader>,
    frame_tx: Sender<Frame>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<Box<dyn VideoReader>> {
    std::thread::spawn(move || {
        for frame_result in reader.frames() {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            match frame_result {
                Ok(frame) => {
                    if frame_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Frame read failed, treating as end of stream: {e}");
                    break;
                }
            }
        }
        reader
    })
}

fn spawn_writer(
    mut writer: Box<dyn VideoWriter>,
    write_rx: Receiver<Frame>,
) -> JoinHandle<Result<Box<dyn VideoWriter>, (Box<dyn VideoWriter>, Cause)>> {
    std::thread::spawn(move || {
        for frame in write_rx {
            if let Err(e) = writer.write(&frame) {
                return Err((writer, cause(e)));
            }
        }
        Ok(writer)
    })
}

fn run_main_loop(
    frame_rx: Receiver<Frame>,
    write_tx: &Sender<Frame>,
    processor: &mut FrameProcessor,
    reporter: &mut dyn ProgressReporter,
    total_frames: usize,
    cancelled: &AtomicBool,
    on_frame: &mut dyn FnMut(&Frame),
) -> Result<StreamOutcome, RunError> {
    let mut frames_written = 0usize;
    let mut last_percent = None;

    for mut frame in frame_rx {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }

        processor
            .process(&mut frame, reporter)
            .map_err(|e| RunError::Processing(cause(e)))?;
        on_frame(&frame);

        // Writer thread gone: its error surfaces when it is joined.
        if write_tx.send(frame).is_err() {
            break;
        }
        frames_written += 1;

        if total_frames > 0 {
            let percent = (frames_written * 100 / total_frames).min(100) as u8;
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                reporter.progress(percent, &format!("Blurring video... {percent}%"));
            }
        }
    }

    Ok(StreamOutcome {
        frames_written,
        stopped: cancelled.load(Ordering::Relaxed),
    })
}

/// Joins both I/O threads, closes reader and writer, and keeps the first error.
fn join_threads(
    reader_handle: JoinHandle<Box<dyn VideoReader>>,
    writer_handle: JoinHandle<Result<Box<dyn VideoWriter>, (Box<dyn VideoWriter>, Cause)>>,
    output_path: &Path,
    main_result: Result<StreamOutcome, RunError>,
) -> Result<StreamOutcome, RunError> {
    let sink_error = |cause: Cause| RunError::Sink {
        path: output_path.to_path_buf(),
        cause,
    };
    let mut result = main_result;
    let mut keep_first = |err: RunError| {
        if result.is_ok() {
            result = Err(err);
        }
    };

    match reader_handle.join() {
        Ok(mut r) => r.close(),
        Err(_) => keep_first(RunError::Processing("Reader thread panicked".into())),
    }

    match writer_handle.join() {
        Ok(Ok(mut w)) => {
            if let Err(e) = w.close() {
                keep_first(sink_error(cause(e)));
            }
        }
        Ok(Err((mut w, e))) => {
            let _ = w.close();
            keep_first(sink_error(e));
        }
        Err(_) => keep_first(sink_error("Writer thread panicked".into())),
    }

    result
}
