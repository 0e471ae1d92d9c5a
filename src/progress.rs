//! Progress reporting infrastructure

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::borrow::Cow;

/// CLI progress report of ongoing operations
///
/// To avoid corrupted terminal output, you should not write anything to stderr
/// yourself as long as a report is being displayed. Please use logs for debug
/// messages.
#[derive(Clone, Debug, Default)]
pub struct ProgressReport(MultiProgress);
//
impl ProgressReport {
    /// Prepare to report progress on the cli
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare to track progress without displaying anything
    pub fn hidden() -> Self {
        Self(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    /// Prepare to report on a new operation
    pub fn add(
        &self,
        what: impl Into<Cow<'static, str>>,
        config: ProgressConfig,
    ) -> ProgressTracker {
        let ProgressConfig {
            initial_work,
            show_rate_eta,
        } = config;
        let bar = match initial_work {
            Work::Unbounded => ProgressBar::no_length(),
            bounded => ProgressBar::new(bounded.into()),
        };
        let style_header = match initial_work {
            Work::Unbounded => "{prefix} ",
            _ => "{prefix} {wide_bar} ",
        };
        let style_trailer = match (initial_work, show_rate_eta) {
            (Work::Steps(_), false) => "{pos}/{len}",
            (Work::Steps(_), true) => "{pos}/{len} ({per_sec})",
            (Work::Bytes(_), false) => "{decimal_bytes}/{decimal_total_bytes}",
            (Work::Bytes(_), true) => {
                "{decimal_bytes}/{decimal_total_bytes} ({decimal_bytes_per_sec})"
            }
            (Work::Unbounded, false) => "{human_pos}",
            (Work::Unbounded, true) => "{human_pos} ({per_sec})",
        };
        let bar = bar.with_prefix(what).with_style(
            ProgressStyle::with_template(&format!("{style_header}{style_trailer}"))
                .expect("all styles above should be valid indicatif styles"),
        );
        if initial_work == Work::Unbounded || u64::from(initial_work) > 0 {
            self.0.add(bar.clone());
        }
        ProgressTracker {
            bar,
            report: self.0.clone(),
        }
    }
}

/// Progress bar configuration
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ProgressConfig {
    /// Initial length of the progress bar
    initial_work: Work,

    /// Show the completion rate or estimated remaining time, depending on work
    show_rate_eta: bool,
}
//
impl ProgressConfig {
    /// Default configuration, with some initial amount of work
    pub fn new(initial_work: Work) -> Self {
        Self {
            initial_work,
            show_rate_eta: true,
        }
    }

    /// Disable tracking of step completions
    pub fn dont_show_rate_eta(self) -> Self {
        Self {
            show_rate_eta: false,
            ..self
        }
    }
}

/// Work whose progression that can be tracked
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Work {
    /// Steps to be taken, with a precise count display
    Steps(usize),

    /// Bytes to be processed
    Bytes(u64),

    /// Items to be counted, with no known end
    Unbounded,
}
//
impl From<Work> for u64 {
    fn from(value: Work) -> Self {
        match value {
            Work::Steps(s) => s as u64,
            Work::Bytes(b) => b,
            Work::Unbounded => 0,
        }
    }
}

/// Mechanism to track progress
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    /// Progress bar for this specific process
    bar: ProgressBar,

    /// Underlying process report
    report: MultiProgress,
}
//
impl ProgressTracker {
    /// Show that a certain amount of progress has been made
    ///
    /// Returns truth that the progress bar has reached its maximum value,
    /// which never happens for unbounded work.
    pub fn make_progress(&self, progress: u64) -> bool {
        // Track progress
        self.bar.inc(progress);
        let current = self.bar.position();
        let Some(max) = self.bar.length() else {
            return false;
        };
        assert!(current <= max, "recorded more progress than expected");

        // Hide progress bar once done
        let finished = current == max;
        if finished {
            self.finish();
        }
        finished
    }

    /// Current amount of progress
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Hide the progress bar, whether the work is done or not
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.report.remove(&self.bar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_work_finishes() {
        let report = ProgressReport::hidden();
        let tracker = report.add("Testing", ProgressConfig::new(Work::Steps(2)));
        assert!(!tracker.make_progress(1));
        assert!(tracker.make_progress(1));
        assert_eq!(tracker.position(), 2);
    }

    #[test]
    fn unbounded_work_never_finishes() {
        let report = ProgressReport::hidden();
        let tracker = report.add("Counting", ProgressConfig::new(Work::Unbounded));
        for _ in 0..10 {
            assert!(!tracker.make_progress(100));
        }
        assert_eq!(tracker.position(), 1000);
        tracker.finish();
    }

    #[test]
    #[should_panic]
    fn overshooting_bounded_work_panics() {
        let report = ProgressReport::hidden();
        let tracker = report.add("Testing", ProgressConfig::new(Work::Bytes(1)));
        tracker.make_progress(2);
    }
}
