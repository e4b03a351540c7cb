//! Output format helpers for CLI commands.

use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::Value;

/// Output format choices for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-friendly text output.
    #[default]
    Text,
    /// Machine-friendly JSON output.
    Json,
    /// Line-delimited JSON (NDJSON) output.
    Ndjson,
}

/// Output-related CLI flags.
#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Output format for command responses.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// Output mode derived from CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct OutputMode {
    pub format: OutputFormat,
}

impl OutputMode {
    /// Build output mode from CLI flags.
    #[must_use]
    pub const fn from_args(args: &OutputArgs) -> Self {
        Self {
            format: args.output,
        }
    }

    /// Returns true when JSON output is requested.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Returns true when NDJSON output is requested.
    #[must_use]
    pub const fn is_ndjson(self) -> bool {
        matches!(self.format, OutputFormat::Ndjson)
    }
}

/// Pretty JSON document with a trailing newline.
pub fn json_document(payload: &impl Serialize) -> Result<String, serde_json::Error> {
    let mut out = serde_json::to_string_pretty(payload)?;
    out.push('\n');
    Ok(out)
}

/// One NDJSON line: `{"type": kind, ...payload}`.
pub fn ndjson_line(kind: &str, payload: Value) -> Result<String, serde_json::Error> {
    let mut object = serde_json::Map::new();
    object.insert("type".to_owned(), Value::from(kind));
    match payload {
        Value::Object(map) => object.extend(map),
        Value::Null => {},
        other => {
            object.insert("value".to_owned(), other);
        },
    }
    let mut out = serde_json::to_string(&Value::Object(object))?;
    out.push('\n');
    Ok(out)
}
