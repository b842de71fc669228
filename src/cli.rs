//! Command-line interface definitions for devprobe.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//!
//! # Example
//!
//! ```bash
//! # Discover devices on the only configured connector
//! devprobe discover
//!
//! # Pick a connector explicitly, never prompt, print JSON
//! devprobe discover --connector lan --no-interaction --output json
//!
//! # Look for a single device with a shorter budget
//! devprobe -v discover --connector lan --device shellyplug-a1 --max-duration 30s
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Time-boxed smart-home device discovery.
#[derive(Debug, Parser)]
#[command(name = "devprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a discovery session on a connector
    Discover(DiscoverArgs),
    /// List configured connectors
    Connectors,
}

/// Arguments for the discover subcommand.
#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Connector to discover with
    #[arg(long, value_name = "ID")]
    pub connector: Option<String>,

    /// Only report the device with this identifier
    #[arg(long, value_name = "ID")]
    pub device: Option<String>,

    /// Never prompt; fail if the connector is ambiguous
    #[arg(long)]
    pub no_interaction: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Device store file
    ///
    /// If not specified, the configured or platform-specific path is used.
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Session time budget (e.g., 60, 90s, 2m)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub max_duration: Option<Duration>,

    /// Exit with code 2 when the session hits its time budget
    #[arg(long)]
    pub fail_on_timeout: bool,

    /// Simplified progress output for screen readers
    #[arg(long)]
    pub accessible: bool,
}

/// Output format for discovery results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable duration.
///
/// Supports suffixes: ms, s, m, h. Case-insensitive. Numbers without suffix
/// are treated as seconds.
///
/// # Examples
///
/// ```
/// use devprobe::cli::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("1.5m").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a non-positive number, or an unknown suffix.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_lowercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let seconds = match suffix.as_str() {
        "" | "s" | "sec" => num,
        "ms" => num / 1_000.0,
        "m" | "min" => num * 60.0,
        "h" => num * 3_600.0,
        _ => return Err(format!("Unknown duration suffix: '{suffix}'")),
    };

    if seconds <= 0.0 {
        return Err("Duration must be greater than zero".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_plain_seconds() {
        assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration(" 5 s ").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1H").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("10ms").unwrap(), Duration::from_millis(10));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_cli_parse_discover_basic() {
        let cli = Cli::try_parse_from(["devprobe", "discover"]).unwrap();
        assert_eq!(cli.verbose, 0);
        match cli.command {
            Commands::Discover(args) => {
                assert_eq!(args.connector, None);
                assert_eq!(args.output, OutputFormat::Table);
                assert!(!args.no_interaction);
            }
            _ => panic!("Expected Discover command"),
        }
    }

    #[test]
    fn test_cli_parse_discover_with_options() {
        let cli = Cli::try_parse_from([
            "devprobe",
            "-v",
            "discover",
            "--connector",
            "lan",
            "--device",
            "plug-1",
            "--no-interaction",
            "--output",
            "json",
            "--max-duration",
            "30s",
            "--fail-on-timeout",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Discover(args) => {
                assert_eq!(args.connector.as_deref(), Some("lan"));
                assert_eq!(args.device.as_deref(), Some("plug-1"));
                assert!(args.no_interaction);
                assert_eq!(args.output, OutputFormat::Json);
                assert_eq!(args.max_duration, Some(Duration::from_secs(30)));
                assert!(args.fail_on_timeout);
            }
            _ => panic!("Expected Discover command"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "devprobe",
            "connectors",
            "--config",
            "/etc/devprobe.toml",
            "--json-errors",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/devprobe.toml")));
        assert!(cli.json_errors);
        assert!(matches!(cli.command, Commands::Connectors));
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["devprobe", "-v", "-q", "discover"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_invalid_duration() {
        let result = Cli::try_parse_from(["devprobe", "discover", "--max-duration", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_invalid_subcommand() {
        let result = Cli::try_parse_from(["devprobe", "invalid"]);
        assert!(result.is_err());
    }
}
