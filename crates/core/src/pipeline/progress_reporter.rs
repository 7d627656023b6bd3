use std::collections::HashMap;
use std::time::Instant;

/// Observer for run lifecycle events: progress, status text, per-stage
/// timings and the completion notice.
///
/// Runners only talk to this trait, so the same orchestration code can feed
/// a GUI channel, the log, or nothing at all.
pub trait ProgressReporter: Send {
    /// Percentage (0..=100) together with the status line that goes with it.
    fn progress(&mut self, percent: u8, status: &str);

    /// Status text without a percentage change.
    fn status(&mut self, status: &str);

    /// Record how long a named per-frame stage took.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// The run completed; `message` names where the output went.
    fn finished(&mut self, message: &str);

    /// Back to 0% with an empty status line.
    fn reset(&mut self);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {
    fn progress(&mut self, _percent: u8, _status: &str) {}
    fn status(&mut self, _status: &str) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn finished(&mut self, _message: &str) {}
    fn reset(&mut self) {}
}

/// Sends events to the `log` crate.
///
/// Progress lines are throttled to one per `step_percent` so long videos do
/// not flood the log. Timings are kept for a per-stage summary.
pub struct LogProgressReporter {
    step_percent: u8,
    last_logged: Option<u8>,
    timings: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl LogProgressReporter {
    pub fn new(step_percent: u8) -> Self {
        Self {
            step_percent: step_percent.max(1),
            last_logged: None,
            timings: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the formatted summary, or `None` if no timings were recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.timings.values().map(Vec::len).max().unwrap_or(0);
        let mut lines = vec![format!(
            "Run summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len() as f64;
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:8}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }
}

impl Default for LogProgressReporter {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ProgressReporter for LogProgressReporter {
    fn progress(&mut self, percent: u8, status: &str) {
        let due = match self.last_logged {
            None => true,
            Some(last) => percent >= last.saturating_add(self.step_percent) || percent == 100,
        };
        if due && self.last_logged != Some(percent) {
            self.last_logged = Some(percent);
            log::info!("{status} ({percent}%)");
        }
    }

    fn status(&mut self, status: &str) {
        log::info!("{status}");
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn finished(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn reset(&mut self) {
        self.last_logged = None;
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ProgressReporter;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Event {
        Progress(u8, String),
        Status(String),
        Finished(String),
        Reset,
    }

    /// Keeps every event except timings, in order.
    #[derive(Default)]
    pub struct RecordingProgressReporter {
        pub events: Vec<Event>,
    }

    impl RecordingProgressReporter {
        /// Percentages in order, with each reset recorded as 0.
        pub fn percentages(&self) -> Vec<u8> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Progress(p, _) => Some(*p),
                    Event::Reset => Some(0),
                    _ => None,
                })
                .collect()
        }

        pub fn finished_messages(&self) -> Vec<&str> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Finished(m) => Some(m.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    impl ProgressReporter for RecordingProgressReporter {
        fn progress(&mut self, percent: u8, status: &str) {
            self.events.push(Event::Progress(percent, status.to_string()));
        }
        fn status(&mut self, status: &str) {
            self.events.push(Event::Status(status.to_string()));
        }
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn finished(&mut self, message: &str) {
            self.events.push(Event::Finished(message.to_string()));
        }
        fn reset(&mut self) {
            self.events.push(Event::Reset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_reporter_all_methods_are_noop() {
        let mut reporter = NullProgressReporter;
        reporter.progress(50, "half");
        reporter.status("busy");
        reporter.timing("detect", 5.0);
        reporter.finished("done");
        reporter.reset();
        reporter.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut reporter = LogProgressReporter::new(10);
        reporter.timing("detect", 20.0);
        reporter.timing("detect", 30.0);
        reporter.timing("blur", 5.0);

        let detect = reporter.timings_for("detect").unwrap();
        assert_eq!(detect.len(), 2);
        assert_relative_eq!(detect[1], 30.0);
        assert_eq!(reporter.timings_for("blur").unwrap().len(), 1);
        assert!(reporter.timings_for("encode").is_none());
    }

    #[test]
    fn test_summary_lists_stages_and_throughput() {
        let mut reporter = LogProgressReporter::new(10);
        reporter.timing("detect", 20.0);
        reporter.timing("blur", 5.0);

        let summary = reporter.summary_string().unwrap();
        assert!(summary.contains("Run summary (1 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("blur"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogProgressReporter::default().summary_string().is_none());
    }

    #[test]
    fn test_progress_throttled_to_step() {
        let mut reporter = LogProgressReporter::new(25);
        reporter.progress(1, "x");
        assert_eq!(reporter.last_logged, Some(1));
        reporter.progress(10, "x");
        assert_eq!(reporter.last_logged, Some(1));
        reporter.progress(26, "x");
        assert_eq!(reporter.last_logged, Some(26));
        reporter.progress(100, "x");
        assert_eq!(reporter.last_logged, Some(100));
        reporter.reset();
        assert_eq!(reporter.last_logged, None);
    }

    #[test]
    fn test_zero_step_is_clamped() {
        assert_eq!(LogProgressReporter::new(0).step_percent, 1);
    }
}
