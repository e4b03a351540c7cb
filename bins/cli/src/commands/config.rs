//! Config command handlers.

use super::parsed_env;
use crate::error::{CliError, ExitCode};
use crate::format::{json_document, ndjson_line};
use crate::{CliOutput, CommandContext, format_error_output};
use docsync_config::ConfigFormat;
use docsync_infra::{SourceRegistry, check_config, render_config};
use std::fmt::Write as _;
use std::path::Path;

/// Print the effective config (defaults, file, overrides and env merged).
pub fn run_config_show(
    ctx: &CommandContext<'_>,
    path: Option<&Path>,
    format: ConfigFormat,
) -> Result<CliOutput, CliError> {
    let rendered = match render_config(ctx.config, format) {
        Ok(rendered) => rendered,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };

    let stdout = if ctx.mode.is_ndjson() || ctx.mode.is_json() {
        let effective = match format {
            ConfigFormat::Json => serde_json::from_str(rendered.trim())?,
            ConfigFormat::Toml => serde_json::Value::String(rendered),
        };
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": path.map(|value| value.to_string_lossy().into_owned()),
            "effectiveConfig": effective,
        });
        if ctx.mode.is_ndjson() {
            ndjson_line("config", payload)?
        } else {
            json_document(&payload)?
        }
    } else {
        rendered
    };
    Ok(CliOutput::ok(stdout))
}

/// Check credentials and source settings; exits with 2 when a check fails.
pub fn run_config_check(ctx: &CommandContext<'_>) -> Result<CliOutput, CliError> {
    let env = match parsed_env(ctx) {
        Ok(env) => env,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };
    let report = check_config(ctx.config, &env, &SourceRegistry::with_builtin());
    let status = if report.is_ok() { "ok" } else { "error" };

    let stdout = if ctx.mode.is_ndjson() {
        let mut out = String::new();
        for check in &report.checks {
            out.push_str(&ndjson_line("check", serde_json::to_value(check)?)?);
        }
        out.push_str(&ndjson_line(
            "summary",
            serde_json::json!({ "status": status, "kind": "config" }),
        )?);
        out
    } else if ctx.mode.is_json() {
        json_document(&serde_json::json!({ "status": status, "checks": report.checks }))?
    } else {
        let mut out = String::new();
        let _ = writeln!(out, "status: {status}");
        for check in &report.checks {
            let mark = if check.ok { "ok" } else { "failed" };
            let _ = writeln!(out, "{}: {mark} ({})", check.name, check.message);
        }
        out
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: if report.is_ok() {
            ExitCode::Ok
        } else {
            ExitCode::InvalidInput
        },
    })
}
