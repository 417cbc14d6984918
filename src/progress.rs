use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;

/// Number of bar steps covering the fraction range [0, 1].
pub const BAR_STEPS: u64 = 1000;

/// Receives the overall fraction of work done.
pub trait ProgressReporter {
    fn report(&self, fraction: f64);

    fn finish(&self) {}
}

impl<T: ProgressReporter + ?Sized> ProgressReporter for &T {
    fn report(&self, fraction: f64) {
        (**self).report(fraction)
    }

    fn finish(&self) {
        (**self).finish()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _fraction: f64) {}
}

pub fn default_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Terminal progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(message: &'static str) -> Self {
        let bar = default_bar(BAR_STEPS);
        bar.set_message(message);
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for BarProgress {
    fn report(&self, fraction: f64) {
        self.bar.set_position((fraction * BAR_STEPS as f64).round() as u64);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// Keeps every reported value.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    values: RefCell<Vec<f64>>,
    finished: RefCell<bool>,
}

impl RecordingProgress {
    pub fn values(&self) -> Vec<f64> {
        self.values.borrow().clone()
    }

    pub fn finished(&self) -> bool {
        *self.finished.borrow()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, fraction: f64) {
        self.values.borrow_mut().push(fraction);
    }

    fn finish(&self) {
        *self.finished.borrow_mut() = true;
    }
}

/// Running fraction of work done for a single merge. Values are clamped to
/// [0, 1] and never move backwards.
pub struct Progress<'a> {
    reporter: &'a dyn ProgressReporter,
    fraction: f64,
}

impl<'a> Progress<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            fraction: 0.0,
        }
    }

    /// Move to `fraction`, unless that would go backwards.
    pub fn set(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction >= self.fraction {
            self.fraction = fraction;
        }
        self.reporter.report(self.fraction);
    }

    pub fn advance(&mut self, delta: f64) {
        self.set(self.fraction + delta);
    }

    pub fn complete(&mut self) {
        self.set(1.0);
        self.reporter.finish();
    }
}
