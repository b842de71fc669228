//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements
//! [`DiscoveryProgress`] to display a spinner while a discovery session
//! runs. The reporter is purely cosmetic: the orchestrator never depends on
//! what it does.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinner animation
//! - Plain text updates
//! - Reduced update frequency for screen reader compatibility

use std::cell::RefCell;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::discovery::TerminationTrigger;

/// Point-in-time view of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Time since the session started
    pub elapsed: Duration,
    /// Session budget
    pub max_duration: Duration,
    /// Backlog entries processed so far
    pub drained: usize,
}

/// Callback for discovery session progress.
///
/// Implement this trait to receive updates while a session runs.
pub trait DiscoveryProgress {
    /// Called once when the session starts.
    ///
    /// # Arguments
    ///
    /// * `label` - Name of the connector being scanned
    /// * `max_duration` - Session budget
    fn on_start(&self, label: &str, max_duration: Duration);

    /// Called on every progress tick.
    fn on_tick(&self, snapshot: &ProgressSnapshot);

    /// Called once when the session ends.
    ///
    /// `trigger` is `None` when the session ended with an error.
    fn on_finish(&self, trigger: Option<TerminationTrigger>);
}

/// Progress sink that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DiscoveryProgress for NoProgress {
    fn on_start(&self, _label: &str, _max_duration: Duration) {}
    fn on_tick(&self, _snapshot: &ProgressSnapshot) {}
    fn on_finish(&self, _trigger: Option<TerminationTrigger>) {}
}

/// Spinner-based progress reporter.
#[derive(Debug)]
pub struct Progress {
    bar: RefCell<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, nothing will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use devprobe::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            bar: RefCell::new(None),
            quiet,
            accessible,
        }
    }

    /// Check if accessible mode is enabled.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    fn style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("{msg} [{elapsed_precise}] {pos} results")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} results")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }
}

impl DiscoveryProgress for Progress {
    fn on_start(&self, label: &str, max_duration: Duration) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(self.style());
        pb.set_message(format!(
            "Discovering devices on {} (up to {}s)",
            label,
            max_duration.as_secs()
        ));
        // In accessible mode, use a slower tick rate
        let tick_rate = if self.accessible { 500 } else { 100 };
        pb.enable_steady_tick(Duration::from_millis(tick_rate));
        *self.bar.borrow_mut() = Some(pb);
    }

    fn on_tick(&self, snapshot: &ProgressSnapshot) {
        if let Some(ref pb) = *self.bar.borrow() {
            pb.set_position(snapshot.drained as u64);
        }
    }

    fn on_finish(&self, trigger: Option<TerminationTrigger>) {
        if let Some(pb) = self.bar.borrow_mut().take() {
            match trigger {
                Some(trigger) => pb.finish_with_message(format!("Discovery {}", trigger)),
                None => pb.abandon_with_message("Discovery failed"),
            }
        }
    }
}
