pub mod frame_processor;
pub mod infrastructure;
pub mod output_paths;
pub mod photo_batch_runner;
pub mod progress_reporter;
pub mod run_error;
pub mod video_stream_runner;
