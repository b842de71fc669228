//! Output formatters for discovery results.
//!
//! - [`table`]: aligned text table for humans
//! - [`json`]: JSON for automation and scripting

pub mod json;
pub mod table;

use crate::devices::DiscoveredDevice;
use crate::discovery::SessionReport;
use crate::error::ExitCode;

pub use json::JsonOutput;
pub use table::TableOutput;

/// Everything the command layer reports about a finished session.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// Connector the session ran on
    pub connector: String,
    /// How the session ended
    pub report: SessionReport,
    /// Distinct devices seen during the session
    pub devices_seen: usize,
    /// Devices that were not known to the connector before
    pub new_devices: Vec<DiscoveredDevice>,
    /// Exit code the command will return
    pub exit_code: ExitCode,
}
