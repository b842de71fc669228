//! In-memory backlog of discovery results.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

use chrono::{DateTime, Utc};

use super::{Backlog, TerminateSignal};

/// A raw discovery response waiting to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryMessage {
    /// Address the response came from
    pub source: SocketAddr,
    /// Response body as received
    pub payload: String,
    /// When the response arrived
    pub received_at: DateTime<Utc>,
}

impl DiscoveryMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(source: SocketAddr, payload: impl Into<String>) -> Self {
        Self {
            source,
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// Errors a [`MessageConsumer`] can report for a single message.
#[derive(thiserror::Error, Debug)]
pub enum ConsumeError {
    /// The message could not be understood. It is skipped.
    #[error("Malformed message from {sender}: {reason}")]
    Malformed {
        /// Sender of the message
        sender: SocketAddr,
        /// What was wrong with it
        reason: String,
    },

    /// Processing must stop for the whole session.
    #[error("{0}")]
    Terminate(TerminateSignal),
}

/// Processes messages drained from a [`MessageBacklog`].
pub trait MessageConsumer {
    /// Handle one message.
    ///
    /// # Errors
    ///
    /// See [`ConsumeError`].
    fn consume(&self, message: DiscoveryMessage) -> Result<(), ConsumeError>;
}

/// FIFO backlog shared between a scanner (producer) and the orchestrator.
pub struct MessageBacklog {
    queue: RefCell<VecDeque<DiscoveryMessage>>,
    consumer: Rc<dyn MessageConsumer>,
}

impl MessageBacklog {
    /// Create an empty backlog feeding `consumer`.
    #[must_use]
    pub fn new(consumer: Rc<dyn MessageConsumer>) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            consumer,
        }
    }

    /// Append a message produced by the scanner.
    pub fn push(&self, message: DiscoveryMessage) {
        self.queue.borrow_mut().push_back(message);
    }

    /// Number of pending messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl fmt::Debug for MessageBacklog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBacklog")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl Backlog for MessageBacklog {
    fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    fn drain(&self) -> Result<bool, TerminateSignal> {
        // Release the borrow before consuming.
        let Some(message) = self.queue.borrow_mut().pop_front() else {
            return Ok(false);
        };

        match self.consumer.consume(message) {
            Ok(()) => Ok(true),
            Err(ConsumeError::Terminate(signal)) => Err(signal),
            Err(e) => {
                log::warn!("Skipping discovery result: {}", e);
                Ok(true)
            }
        }
    }
}
