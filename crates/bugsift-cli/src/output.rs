//! Shared output layer for pretty/text/JSON parity across all commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / `--json`
//! 2. `BUGSIFT_FORMAT` env var
//! 3. `output` in the project config, then the user config
//! 4. Default: pretty on a TTY, text when piped

use std::io::{self, Write};

use bugsift_core::{DetectError, ErrorCode};
use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde::Serialize;

/// Shared width for pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-oriented sections and separators.
    Pretty,
    /// One line per record for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Map a resolved mode name onto the enum. Unknown names fall back to text.
    pub fn from_name(name: &str) -> Self {
        match name {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Resolve the output mode from flags and configuration.
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    config_output: Option<&str>,
) -> OutputMode {
    format_flag.unwrap_or_else(|| {
        OutputMode::from_name(bugsift_core::config::resolve_output(json_flag, config_output))
    })
}

/// Render a serializable value with explicit text and pretty renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with an optional suggestion and code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub retryable: bool,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
            retryable: false,
        }
    }
}

impl From<&DetectError> for CliError {
    fn from(err: &DetectError) -> Self {
        Self {
            message: err.to_string(),
            suggestion: err.hint().map(str::to_string),
            error_code: Some(err.code().code().to_string()),
            retryable: err.is_retryable(),
        }
    }
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        err.downcast_ref::<DetectError>().map_or_else(
            || Self {
                message: format!("{err:#}"),
                suggestion: ErrorCode::InternalUnexpected.hint().map(str::to_string),
                error_code: Some(ErrorCode::InternalUnexpected.code().to_string()),
                retryable: false,
            },
            Self::from,
        )
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut out, &serde_json::json!({ "error": error }))?;
        writeln!(out)?;
    } else {
        match &error.error_code {
            Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
            None => writeln!(out, "error: {}", error.message)?,
        }
        if let Some(suggestion) = &error.suggestion {
            writeln!(out, "  suggestion: {suggestion}")?;
        }
    }
    Ok(())
}

/// Local wall-clock rendering of a microsecond timestamp.
pub fn micros_to_local(us: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(us).map_or_else(
        || us.to_string(),
        |ts| {
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

/// Two-decimal rendering of an optional score.
pub fn score(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}
