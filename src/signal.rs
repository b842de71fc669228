//! Interrupt handling for graceful session cancellation.
//!
//! An [`InterruptListener`] is owned by one discovery session. It yields
//! once per operator interrupt, either Ctrl+C from the OS or a manual
//! request through a cloned [`InterruptHandle`]. Dropping the listener at
//! the end of a session releases its Ctrl+C subscription.
//!
//! The first [`InterruptListener::os`] subscription installs tokio's
//! process-wide SIGINT handler, which stays installed for the life of the
//! process, so a Ctrl+C after the session has ended is ignored rather than
//! killing the process.
//!
//! # Usage
//!
//! ```rust,no_run
//! use devprobe::signal::{interrupt_channel, InterruptListener};
//!
//! // Listen for Ctrl+C only
//! let listener = InterruptListener::os();
//!
//! // Or create a manual trigger, e.g. for tests or embedding
//! let (handle, listener) = interrupt_channel();
//! handle.interrupt();
//! ```
//!
//! # Exit Codes
//!
//! An interrupt during a session is a graceful termination and still exits
//! successfully. An interrupt before a session starts (for example at the
//! connector prompt) exits with code 130 (128 + SIGINT).

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Sending side used to request an interrupt manually.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: UnboundedSender<()>,
}

impl InterruptHandle {
    /// Request an interrupt. Returns `false` if the listener is gone.
    pub fn interrupt(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Source of operator interrupts for a single session.
#[derive(Debug)]
pub struct InterruptListener {
    manual: Option<UnboundedReceiver<()>>,
    os_signal: bool,
}

impl InterruptListener {
    /// Listen for Ctrl+C from the operating system.
    #[must_use]
    pub fn os() -> Self {
        Self {
            manual: None,
            os_signal: true,
        }
    }

    /// A listener that never fires.
    #[must_use]
    pub fn none() -> Self {
        Self {
            manual: None,
            os_signal: false,
        }
    }

    /// Wait for the next interrupt.
    ///
    /// Returns `None` once no interrupt can arrive any more.
    pub async fn recv(&mut self) -> Option<()> {
        loop {
            let event = match (self.manual.as_mut(), self.os_signal) {
                (None, false) => return None,
                (Some(rx), false) => return rx.recv().await,
                (None, true) => Received::Os(tokio::signal::ctrl_c().await),
                (Some(rx), true) => tokio::select! {
                    received = rx.recv() => Received::Manual(received),
                    result = tokio::signal::ctrl_c() => Received::Os(result),
                },
            };

            match event {
                Received::Manual(Some(())) => return Some(()),
                Received::Os(Ok(())) => {
                    log::info!("Shutdown signal received");
                    return Some(());
                }
                Received::Manual(None) => self.manual = None,
                Received::Os(Err(e)) => {
                    log::warn!("Ctrl+C listener unavailable: {}", e);
                    self.os_signal = false;
                }
            }
        }
    }
}

enum Received {
    Manual(Option<()>),
    Os(std::io::Result<()>),
}

/// Create a manual interrupt trigger and the listener it feeds.
#[must_use]
pub fn interrupt_channel() -> (InterruptHandle, InterruptListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        InterruptHandle { tx },
        InterruptListener {
            manual: Some(rx),
            os_signal: false,
        },
    )
}
