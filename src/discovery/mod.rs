//! Bounded device discovery.
//!
//! This module contains the discovery orchestrator and the collaborator
//! contracts it consumes:
//! - [`Scanner`]: produces discovery results asynchronously
//! - [`Backlog`]: holds results until they are drained
//! - [`DiscoveryOrchestrator`]: runs one time-boxed session and decides
//!   when it is finished
//!
//! # Architecture
//!
//! A session runs on a single-threaded tokio `LocalSet`. Timers are local
//! tasks that post signals to the orchestrator, which handles them one at a
//! time. Nothing shared with the timers is ever locked.
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use devprobe::discovery::{DiscoveryOrchestrator, MessageBacklog, SessionTimings};
//! use devprobe::devices::DeviceCollector;
//! use devprobe::progress::NoProgress;
//! use devprobe::scanner::UdpScanner;
//! use devprobe::signal::InterruptListener;
//! # async fn demo(connector: devprobe::config::ConnectorConfig) -> anyhow::Result<()> {
//! let collector = Rc::new(DeviceCollector::new(connector.id.clone()));
//! let backlog = Rc::new(MessageBacklog::new(collector.clone()));
//! let scanner = UdpScanner::new(connector, Rc::clone(&backlog));
//!
//! let report = DiscoveryOrchestrator::new(scanner, backlog, SessionTimings::default())
//!     .with_progress(Rc::new(NoProgress))
//!     .with_interrupts(InterruptListener::os())
//!     .run()
//!     .await?;
//! println!("session {} after {:?}", report.trigger, report.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod backlog;
pub mod orchestrator;
pub mod session;
pub mod timer;

use std::fmt;
use std::io;

use tokio::sync::mpsc::UnboundedReceiver;

pub use backlog::{ConsumeError, DiscoveryMessage, MessageBacklog, MessageConsumer};
pub use orchestrator::DiscoveryOrchestrator;
pub use session::{
    DiscoverySession, SessionReport, SessionTimings, TerminationTrigger, TimingError,
    MAX_SESSION_DURATION,
};
pub use timer::TimerSlot;

/// Queue of not-yet-processed discovery results.
pub trait Backlog {
    /// Whether no entries are pending. Must be cheap and side-effect-free.
    fn is_empty(&self) -> bool;

    /// Remove and process one pending entry.
    ///
    /// Returns `Ok(false)` when nothing was pending.
    ///
    /// # Errors
    ///
    /// Returns a [`TerminateSignal`] when processing hit a condition that
    /// must stop the whole session.
    fn drain(&self) -> Result<bool, TerminateSignal>;
}

/// Events a scanner reports while a session runs.
#[derive(Debug)]
pub enum ScannerEvent {
    /// The scanner's own work is done. Fires at most once.
    Finished,
    /// The scanner failed while producing results.
    Failed(ScannerError),
}

/// Receiving side of a scanner's event stream.
pub type ScannerEvents = UnboundedReceiver<ScannerEvent>;

/// Client that performs the device scan and fills a backlog.
pub trait Scanner {
    /// Begin producing into the backlog. Must not block.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan could not be started.
    fn discover(&mut self) -> Result<ScannerEvents, ScannerError>;

    /// Abort in-flight work and stop producing. Safe to call repeatedly.
    fn disconnect(&mut self);
}

/// Errors raised by a scanner.
#[derive(thiserror::Error, Debug)]
pub enum ScannerError {
    /// Binding the local socket failed.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Local address that was requested
        addr: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Sending the discovery probe failed.
    #[error("Failed to send probe to {target}: {source}")]
    Probe {
        /// Broadcast address the probe was sent to
        target: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An I/O error occurred while receiving responses.
    #[error("I/O error while scanning: {0}")]
    Io(#[from] io::Error),

    /// The scanner is not in a state that allows the request.
    #[error("Scanner unavailable: {0}")]
    Unavailable(String),
}

/// A "stop everything" control signal.
///
/// Raised by collaborators when continuing would corrupt state. Distinct
/// from ordinary failures so the command boundary can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateSignal {
    reason: String,
}

impl TerminateSignal {
    /// Create a terminate signal with a reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the session must stop.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for TerminateSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Errors that end a session early.
///
/// Deadline and interrupt are not errors; they are reported through
/// [`SessionReport::trigger`].
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    /// The scanner failed to start or failed while producing.
    #[error("Scanner failed: {0}")]
    Scanner(#[from] ScannerError),

    /// A collaborator requested that everything stop.
    #[error("Discovery terminated: {0}")]
    Terminate(TerminateSignal),

    /// The session timings are inconsistent.
    #[error("Invalid session timings: {0}")]
    InvalidTimings(#[from] TimingError),
}
