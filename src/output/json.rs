//! JSON output formatter for discovery results.
//!
//! Provides machine-readable JSON output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "connector": "lan",
//!   "new_devices": [
//!     {
//!       "identifier": "shellyplug-a1",
//!       "model": "SHPLG-S",
//!       "address": "192.168.1.40",
//!       "discovered_at": "2026-10-16T09:12:44Z"
//!     }
//!   ],
//!   "summary": {
//!     "trigger": "natural_completion",
//!     "timed_out": false,
//!     "elapsed_ms": 10412,
//!     "results_processed": 3,
//!     "devices_seen": 2,
//!     "new_devices": 1,
//!     "exit_code": 0,
//!     "exit_code_name": "DP000"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use super::DiscoveryOutcome;
use crate::devices::DiscoveredDevice;
use crate::discovery::TerminationTrigger;

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Why the session ended
    pub trigger: TerminationTrigger,
    /// Whether the session hit its time budget
    pub timed_out: bool,
    /// Session duration in milliseconds
    pub elapsed_ms: u64,
    /// Number of discovery responses processed
    pub results_processed: usize,
    /// Distinct devices seen in this session
    pub devices_seen: usize,
    /// Devices not known to the connector before
    pub new_devices: usize,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DP000")
    pub exit_code_name: String,
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Connector the session ran on
    pub connector: &'a str,
    /// Newly discovered devices
    pub new_devices: &'a [DiscoveredDevice],
    /// Session summary
    pub summary: JsonSummary,
}

impl<'a> JsonOutput<'a> {
    /// Build the JSON view of a finished session.
    #[must_use]
    pub fn new(outcome: &'a DiscoveryOutcome) -> Self {
        Self {
            connector: &outcome.connector,
            new_devices: &outcome.new_devices,
            summary: JsonSummary {
                trigger: outcome.report.trigger,
                timed_out: outcome.report.timed_out(),
                elapsed_ms: outcome.report.elapsed.as_millis() as u64,
                results_processed: outcome.report.drained,
                devices_seen: outcome.devices_seen,
                new_devices: outcome.new_devices.len(),
                exit_code: outcome.exit_code.as_i32(),
                exit_code_name: outcome.exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)
    }
}
