use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::video::domain::image_reader::ImageReader;
use crate::video::domain::image_writer::ImageWriter;

use super::frame_processor::FrameProcessor;
use super::output_paths::photo_output_path;
use super::progress_reporter::ProgressReporter;
use super::run_error::{cause, RunError};

/// What a photo batch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoBatchSummary {
    pub output_dir: PathBuf,
    pub written: Vec<PathBuf>,
    pub cancelled: bool,
}

/// Blurs a list of photos one by one into the photo output directory.
pub struct PhotoBatchRunner {
    reader: Box<dyn ImageReader>,
    writer: Box<dyn ImageWriter>,
    processor: FrameProcessor,
    output_dir: PathBuf,
}

impl PhotoBatchRunner {
    pub fn new(
        reader: Box<dyn ImageReader>,
        writer: Box<dyn ImageWriter>,
        processor: FrameProcessor,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            reader,
            writer,
            processor,
            output_dir,
        }
    }

    /// Processes `inputs` in order, writing `blurred_{basename}` for each.
    ///
    /// The first photo that fails aborts the batch; outputs already written
    /// are kept. `cancelled` is checked before each photo.
    pub fn run(
        &mut self,
        inputs: &[PathBuf],
        reporter: &mut dyn ProgressReporter,
        cancelled: &AtomicBool,
    ) -> Result<PhotoBatchSummary, RunError> {
        let mut summary = PhotoBatchSummary {
            output_dir: self.output_dir.clone(),
            written: Vec::with_capacity(inputs.len()),
            cancelled: false,
        };
        if inputs.is_empty() {
            return Ok(summary);
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|io| RunError::OutputDir {
            path: self.output_dir.clone(),
            io,
        })?;

        let total = inputs.len();
        log::info!(
            "Blurring {total} photos into {}",
            self.output_dir.display()
        );

        for (i, input) in inputs.iter().enumerate() {
            if cancelled.load(Ordering::Relaxed) {
                log::info!("Photo batch cancelled after {i}/{total}");
                summary.cancelled = true;
                reporter.reset();
                return Ok(summary);
            }

            let output = self.blur_one(input, reporter)?;
            summary.written.push(output);

            let completed = i + 1;
            reporter.progress(
                (completed * 100 / total) as u8,
                &format!("Processed {completed}/{total}"),
            );
        }

        reporter.finished(&format!(
            "Saved all blurred photos to {}",
            self.output_dir.display()
        ));
        reporter.reset();
        reporter.summary();
        Ok(summary)
    }

    fn blur_one(
        &mut self,
        input: &Path,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<PathBuf, RunError> {
        let photo_error = |e| RunError::Photo {
            path: input.to_path_buf(),
            cause: cause(e),
        };

        let mut frame = self.reader.read(input).map_err(photo_error)?;
        let regions = self
            .processor
            .process(&mut frame, reporter)
            .map_err(photo_error)?;

        let output = photo_output_path(&self.output_dir, input);
        self.writer
            .write(&output, &frame)
            .map_err(|e| RunError::Sink {
                path: output.clone(),
                cause: cause(e),
            })?;
        log::debug!(
            "{} -> {} ({} faces)",
            input.display(),
            output.display(),
            regions.len()
        );
        Ok(output)
    }
}
