//! Command implementations behind the CLI.

use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::task::LocalSet;
use yansi::Paint;

use crate::cli::{Cli, Commands, DiscoverArgs, OutputFormat};
use crate::config::{Config, ConnectorConfig};
use crate::devices::{DeviceCollector, DeviceStore};
use crate::discovery::{
    DiscoveryOrchestrator, MessageBacklog, MessageConsumer, SessionReport, TerminationTrigger,
};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::{DiscoveryOutcome, JsonOutput, TableOutput};
use crate::progress::Progress;
use crate::scanner::UdpScanner;
use crate::select::{select_connector, SelectError};
use crate::signal::InterruptListener;

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, no connector can be
/// selected, or the discovery session fails.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Connectors => {
            list_connectors(&config.connectors, io::stdout().lock())?;
            Ok(ExitCode::Success)
        }
        Commands::Discover(args) => discover(config, args, cli.quiet),
    }
}

/// Print one line per configured connector.
fn list_connectors<W: Write>(connectors: &[ConnectorConfig], mut out: W) -> io::Result<()> {
    if connectors.is_empty() {
        return writeln!(out, "No connectors are configured.");
    }
    for c in connectors {
        write!(out, "{}", c.id.as_str().bold())?;
        if c.display_name() != c.id {
            write!(out, "  {}", c.display_name())?;
        }
        writeln!(
            out,
            "  probe {} every {}ms x{}, listen {}s",
            c.broadcast,
            c.probe_interval_ms,
            c.probe_attempts,
            c.listen_window_secs
        )?;
    }
    Ok(())
}

fn discover(mut config: Config, args: DiscoverArgs, quiet: bool) -> Result<ExitCode> {
    if let Some(max_duration) = args.max_duration {
        config.discovery = config.discovery.with_max_duration(max_duration);
    }
    config.fail_on_timeout |= args.fail_on_timeout;
    config.accessible |= args.accessible;

    let interactive = !args.no_interaction && io::stdin().is_terminal();
    let connector = match select_connector(
        &config.connectors,
        args.connector.as_deref(),
        interactive,
        &mut io::stdin().lock(),
        &mut io::stderr(),
    ) {
        Ok(connector) => connector.clone(),
        Err(SelectError::Cancelled) => {
            log::warn!("Connector selection cancelled");
            return Ok(ExitCode::Interrupted);
        }
        Err(e) => return Err(e.into()),
    };

    let store_path = match args.store.or_else(|| config.store_path.clone()) {
        Some(path) => path,
        None => DeviceStore::default_path()?,
    };
    let mut store = DeviceStore::load_or_default(&store_path)?;

    let collector = Rc::new(
        DeviceCollector::new(connector.id.clone())
            .with_device_filter(args.device.clone())
            .with_claims(store.claims()),
    );
    let consumer: Rc<dyn MessageConsumer> = collector.clone();
    let backlog = Rc::new(MessageBacklog::new(consumer));
    let scanner = UdpScanner::new(connector.clone(), Rc::clone(&backlog));
    let progress = Rc::new(Progress::with_accessible(
        quiet || args.output == OutputFormat::Json,
        config.accessible,
    ));

    let orchestrator = DiscoveryOrchestrator::new(scanner, backlog, config.discovery)
        .with_label(connector.display_name())
        .with_progress(progress)
        .with_interrupts(InterruptListener::os());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let report = LocalSet::new()
        .block_on(&runtime, orchestrator.run())
        .context("Device discovery failed")?;

    let seen = collector.devices();
    let new_devices = store.record(&connector.id, &seen);
    if !seen.is_empty() {
        store.save(&store_path)?;
    }

    let outcome = DiscoveryOutcome {
        connector: connector.id.clone(),
        exit_code: exit_code_for(&report, config.fail_on_timeout),
        report,
        devices_seen: seen.len(),
        new_devices,
    };
    render(&outcome, args.output, &store_path)?;
    Ok(outcome.exit_code)
}

/// Map a finished session to the process exit code.
fn exit_code_for(report: &SessionReport, fail_on_timeout: bool) -> ExitCode {
    match report.trigger {
        TerminationTrigger::DeadlineExceeded if fail_on_timeout => ExitCode::TimedOut,
        _ => ExitCode::Success,
    }
}

fn render(outcome: &DiscoveryOutcome, format: OutputFormat, store_path: &Path) -> Result<()> {
    let stdout = io::stdout().lock();
    match format {
        OutputFormat::Json => JsonOutput::new(outcome).write_to(stdout)?,
        OutputFormat::Table => TableOutput::new(outcome).write_to(stdout)?,
    }
    log::debug!("Device store: {}", store_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(trigger: TerminationTrigger) -> SessionReport {
        SessionReport {
            trigger,
            elapsed: Duration::from_secs(1),
            drained: 0,
        }
    }

    #[test]
    fn test_deadline_is_success_by_default() {
        let r = report(TerminationTrigger::DeadlineExceeded);
        assert_eq!(exit_code_for(&r, false), ExitCode::Success);
        assert_eq!(exit_code_for(&r, true), ExitCode::TimedOut);
    }

    #[test]
    fn test_other_triggers_are_success() {
        for trigger in [
            TerminationTrigger::NaturalCompletion,
            TerminationTrigger::ExternalInterrupt,
        ] {
            assert_eq!(exit_code_for(&report(trigger), true), ExitCode::Success);
        }
    }

    #[test]
    fn test_list_connectors() {
        yansi::disable();
        let connectors = vec![
            ConnectorConfig {
                id: "lan".to_string(),
                ..ConnectorConfig::default()
            },
            ConnectorConfig {
                id: "garage".to_string(),
                name: Some("Garage hub".to_string()),
                ..ConnectorConfig::default()
            },
        ];
        let mut buf = Vec::new();
        list_connectors(&connectors, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("lan  probe 255.255.255.255:5683 every 1000ms x3, listen 10s"));
        assert!(text.contains("garage  Garage hub  probe"));
    }

    #[test]
    fn test_list_no_connectors() {
        let mut buf = Vec::new();
        list_connectors(&[], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "No connectors are configured.\n");
    }
}
