//! Structured error handling and exit codes.

use serde::Serialize;

use crate::discovery::DiscoveryError;

/// Exit codes for the devprobe application.
///
/// - 0: Success (the session ended normally; a deadline also counts unless
///   `--fail-on-timeout` is set)
/// - 1: Failure (scanner error, terminate signal or unexpected failure)
/// - 2: Timed out (deadline reached with `--fail-on-timeout`)
/// - 130: Interrupted by user before a session started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The discovery session ended normally.
    Success = 0,
    /// Discovery failed.
    Failure = 1,
    /// The session ran out of time and timeouts were requested to fail.
    TimedOut = 2,
    /// The user cancelled before discovery started.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DP000",
            Self::Failure => "DP001",
            Self::TimedOut => "DP002",
            Self::Interrupted => "DP130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DP001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether discovery was stopped by a terminate signal
    pub terminated: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            terminated: is_terminate(err),
        }
    }
}

/// Whether `err` was caused by a propagated terminate signal.
#[must_use]
pub fn is_terminate(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<DiscoveryError>()
            .is_some_and(|e| matches!(e, DiscoveryError::Terminate(_)))
    })
}
