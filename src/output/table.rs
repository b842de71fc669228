//! Plain-text table of newly discovered devices.

use std::io::{self, Write};

use yansi::Paint;

use super::DiscoveryOutcome;
use crate::devices::DiscoveredDevice;
use crate::discovery::TerminationTrigger;

const HEADERS: [&str; 5] = ["Identifier", "Model", "Name", "Address", "Firmware"];

/// Renders a [`DiscoveryOutcome`] as an aligned text table.
#[derive(Debug)]
pub struct TableOutput<'a> {
    outcome: &'a DiscoveryOutcome,
}

impl<'a> TableOutput<'a> {
    /// Wrap an outcome for rendering.
    #[must_use]
    pub fn new(outcome: &'a DiscoveryOutcome) -> Self {
        Self { outcome }
    }

    /// Write the table and the session summary line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let devices = &self.outcome.new_devices;
        if devices.is_empty() {
            writeln!(writer, "No new devices were found.")?;
        } else {
            let rows: Vec<[String; 5]> = devices.iter().map(row).collect();
            let widths = column_widths(&rows);

            let header = format_line(&HEADERS.map(str::to_string), &widths);
            writeln!(writer, "{}", header.bold())?;
            writeln!(
                writer,
                "{}",
                widths
                    .iter()
                    .map(|w| "-".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("  ")
            )?;
            for r in &rows {
                writeln!(writer, "{}", format_line(r, &widths))?;
            }
        }

        let report = &self.outcome.report;
        let label = report.trigger.to_string();
        let status = match report.trigger {
            TerminationTrigger::NaturalCompletion => label.as_str().green(),
            TerminationTrigger::ExternalInterrupt => label.as_str().yellow(),
            TerminationTrigger::DeadlineExceeded => label.as_str().red(),
        };
        writeln!(
            writer,
            "\nDiscovery on {} {} after {:.1}s: {} new of {} devices seen, {} responses processed.",
            self.outcome.connector,
            status,
            report.elapsed.as_secs_f64(),
            devices.len(),
            self.outcome.devices_seen,
            report.drained
        )
    }
}

fn row(device: &DiscoveredDevice) -> [String; 5] {
    [
        device.identifier.clone(),
        device.model.clone(),
        device.name.clone().unwrap_or_else(|| "-".to_string()),
        device.address.to_string(),
        device.firmware.clone().unwrap_or_else(|| "-".to_string()),
    ]
}

fn column_widths(rows: &[[String; 5]]) -> [usize; 5] {
    let mut widths = HEADERS.map(|h| h.chars().count());
    for r in rows {
        for (width, cell) in widths.iter_mut().zip(r) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

fn format_line(cells: &[String; 5], widths: &[usize; 5]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell:<w$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
