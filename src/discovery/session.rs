//! Session state and timing configuration for one discovery run.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Longest session budget a run may be configured with.
pub const MAX_SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing budget for a discovery session.
///
/// The three intervals form a strict hierarchy:
/// `drain_interval < recheck_interval < max_duration`. Draining is fast so
/// the backlog empties promptly once the scanner stops, while the decision
/// to stop waiting is re-evaluated only every `recheck_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    /// Upper bound on total session wall-clock time.
    #[serde(with = "duration_secs")]
    pub max_duration: Duration,
    /// Delay between re-evaluations of the termination condition.
    #[serde(with = "duration_secs")]
    pub recheck_interval: Duration,
    /// How often the backlog is drained.
    #[serde(with = "duration_millis")]
    pub drain_interval: Duration,
    /// How often the progress reporter ticks.
    #[serde(with = "duration_millis")]
    pub progress_interval: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(60),
            recheck_interval: Duration::from_secs(5),
            drain_interval: Duration::from_millis(10),
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// Violations of the [`SessionTimings`] hierarchy.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimingError {
    /// One of the intervals is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The re-check interval does not fit inside the session budget.
    #[error("recheck interval ({recheck:?}) must be shorter than max duration ({max:?})")]
    RecheckTooLong {
        /// Configured re-check interval
        recheck: Duration,
        /// Configured session budget
        max: Duration,
    },

    /// The drain tick is not faster than the re-check.
    #[error("drain interval ({drain:?}) must be shorter than recheck interval ({recheck:?})")]
    DrainTooSlow {
        /// Configured drain interval
        drain: Duration,
        /// Configured re-check interval
        recheck: Duration,
    },

    /// The session budget exceeds [`MAX_SESSION_DURATION`].
    #[error("max duration ({max:?}) must not exceed {limit:?}")]
    BudgetTooLong {
        /// Configured session budget
        max: Duration,
        /// Largest accepted budget
        limit: Duration,
    },
}

impl SessionTimings {
    /// Check the interval hierarchy.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), TimingError> {
        for (name, value) in [
            ("max duration", self.max_duration),
            ("recheck interval", self.recheck_interval),
            ("drain interval", self.drain_interval),
            ("progress interval", self.progress_interval),
        ] {
            if value.is_zero() {
                return Err(TimingError::Zero(name));
            }
        }
        if self.max_duration > MAX_SESSION_DURATION {
            return Err(TimingError::BudgetTooLong {
                max: self.max_duration,
                limit: MAX_SESSION_DURATION,
            });
        }
        if self.recheck_interval >= self.max_duration {
            return Err(TimingError::RecheckTooLong {
                recheck: self.recheck_interval,
                max: self.max_duration,
            });
        }
        if self.drain_interval >= self.recheck_interval {
            return Err(TimingError::DrainTooSlow {
                drain: self.drain_interval,
                recheck: self.recheck_interval,
            });
        }
        Ok(())
    }

    /// Override the session budget.
    #[must_use]
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

/// The working state of a single running session.
///
/// Created when the orchestrator starts and dropped when it terminates.
#[derive(Debug, Clone, Copy)]
pub struct DiscoverySession {
    started_at: Instant,
    timings: SessionTimings,
}

impl DiscoverySession {
    /// Start the session clock now.
    #[must_use]
    pub fn begin(timings: SessionTimings) -> Self {
        Self {
            started_at: Instant::now(),
            timings,
        }
    }

    /// Monotonic start time.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time elapsed since the session began.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Instant at which the session budget runs out.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.started_at + self.timings.max_duration
    }

    /// Whether the session budget has been used up.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.elapsed() >= self.timings.max_duration
    }

    /// The timing configuration this session runs with.
    #[must_use]
    pub fn timings(&self) -> &SessionTimings {
        &self.timings
    }
}

/// The reason a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationTrigger {
    /// The backlog drained after the scanner finished on its own.
    NaturalCompletion,
    /// The operator cancelled the session.
    ExternalInterrupt,
    /// The session ran out of time with entries still pending.
    DeadlineExceeded,
}

impl fmt::Display for TerminationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NaturalCompletion => write!(f, "completed"),
            Self::ExternalInterrupt => write!(f, "interrupted"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Outcome of a session that ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Which signal ended the session
    pub trigger: TerminationTrigger,
    /// Wall-clock time from start to termination
    pub elapsed: Duration,
    /// Number of backlog entries processed
    pub drained: usize,
}

impl SessionReport {
    /// Whether the session hit its time budget.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.trigger == TerminationTrigger::DeadlineExceeded
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).map_err(serde::ser::Error::custom)?;
        s.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
