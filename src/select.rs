//! Connector selection for the discover command.
//!
//! Resolution order:
//!
//! 1. `--connector ID`, which must name a configured connector
//! 2. the only configured connector
//! 3. a numbered prompt, when running interactively
//!
//! Anything else is an error.

use std::io::{self, BufRead, Write};

use crate::config::ConnectorConfig;

/// Minimum similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.7;

/// Errors raised while choosing a connector.
#[derive(thiserror::Error, Debug)]
pub enum SelectError {
    /// Nothing is configured.
    #[error("No connectors are configured. Add a [[connectors]] entry to the configuration file")]
    NoConnectors,

    /// `--connector` named an unknown connector.
    #[error("Unknown connector '{id}'{}", suggestion.as_ref().map(|s| format!(". Did you mean '{s}'?")).unwrap_or_default())]
    Unknown {
        /// The requested identifier
        id: String,
        /// Closest configured identifier, if any is similar enough
        suggestion: Option<String>,
    },

    /// Several connectors exist and prompting is not possible.
    #[error("{count} connectors are configured; choose one with --connector ({ids})")]
    Ambiguous {
        /// Number of configured connectors
        count: usize,
        /// Comma-separated identifiers
        ids: String,
    },

    /// The operator gave up at the prompt.
    #[error("Connector selection cancelled")]
    Cancelled,

    /// Prompt I/O failed.
    #[error("Failed to read connector choice: {0}")]
    Io(#[from] io::Error),
}

/// Pick the connector a discovery session runs on.
///
/// `input` and `output` are only used when `interactive` is set and
/// several connectors are configured. Invalid answers are re-asked; an
/// empty line, `q` or end of input cancels.
///
/// # Errors
///
/// See [`SelectError`].
pub fn select_connector<'a, R, W>(
    connectors: &'a [ConnectorConfig],
    requested: Option<&str>,
    interactive: bool,
    input: &mut R,
    output: &mut W,
) -> Result<&'a ConnectorConfig, SelectError>
where
    R: BufRead,
    W: Write,
{
    if let Some(id) = requested {
        return connectors
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| SelectError::Unknown {
                id: id.to_string(),
                suggestion: suggest(connectors, id),
            });
    }

    match connectors {
        [] => Err(SelectError::NoConnectors),
        [only] => {
            log::debug!("Using the only configured connector '{}'", only.id);
            Ok(only)
        }
        _ if !interactive => Err(SelectError::Ambiguous {
            count: connectors.len(),
            ids: connectors
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
        _ => prompt(connectors, input, output),
    }
}

fn prompt<'a, R: BufRead, W: Write>(
    connectors: &'a [ConnectorConfig],
    input: &mut R,
    output: &mut W,
) -> Result<&'a ConnectorConfig, SelectError> {
    writeln!(output, "Select a connector:")?;
    for (index, connector) in connectors.iter().enumerate() {
        if connector.display_name() == connector.id {
            writeln!(output, "  {}) {}", index + 1, connector.id)?;
        } else {
            writeln!(
                output,
                "  {}) {} ({})",
                index + 1,
                connector.display_name(),
                connector.id
            )?;
        }
    }

    loop {
        write!(output, "Connector [1-{}, q to quit]: ", connectors.len())?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(SelectError::Cancelled);
        }
        let answer = line.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("q") {
            return Err(SelectError::Cancelled);
        }

        let chosen = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| connectors.get(i))
            .or_else(|| connectors.iter().find(|c| c.id == answer));
        match chosen {
            Some(connector) => return Ok(connector),
            None => writeln!(output, "'{answer}' is not a valid choice.")?,
        }
    }
}

/// Closest configured connector id to `id`.
fn suggest(connectors: &[ConnectorConfig], id: &str) -> Option<String> {
    connectors
        .iter()
        .map(|c| (strsim::jaro_winkler(&c.id, id), &c.id))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, id)| id.clone())
}
