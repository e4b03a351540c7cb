//! Sync command handler.

use super::{block_on, parsed_env};
use crate::error::{CliError, ExitCode};
use crate::format::{OutputMode, json_document, ndjson_line};
use crate::{CliOutput, CommandContext, format_error_output};
use docsync_infra::SyncReport;
use docsync_shared::RequestContext;
use std::fmt::Write as _;

/// Run one sync pass and print its counters.
pub fn run_sync(ctx: &CommandContext<'_>, index: &str) -> Result<CliOutput, CliError> {
    let env = match parsed_env(ctx) {
        Ok(env) => env,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };
    let request = RequestContext::new_request();
    let outcome = block_on(
        &request,
        docsync_infra::run_sync(&request, ctx.config, &env, index),
    )?;
    match outcome {
        Ok(report) => format_sync_output(ctx.mode, &report),
        Err(error) => Ok(format_error_output(ctx.mode, &error)),
    }
}

fn format_sync_output(mode: OutputMode, report: &SyncReport) -> Result<CliOutput, CliError> {
    let status = if report.is_ok() { "ok" } else { "error" };
    let stdout = if mode.is_ndjson() {
        ndjson_line(
            "summary",
            serde_json::json!({
                "status": status,
                "kind": "sync",
                "report": report,
            }),
        )?
    } else if mode.is_json() {
        json_document(&serde_json::json!({ "status": status, "report": report }))?
    } else {
        format_sync_text(status, report)
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: report.error.as_ref().map_or(ExitCode::Ok, ExitCode::for_error),
    })
}

fn format_sync_text(status: &str, report: &SyncReport) -> String {
    let result = &report.result;
    let mut out = String::new();
    let _ = writeln!(out, "status: {status}");
    let _ = writeln!(out, "index: {}", report.index);
    let _ = writeln!(out, "serviceType: {}", report.service_type);
    let _ = writeln!(out, "indexCreated: {}", report.index_created);
    let _ = writeln!(out, "indexed: {}", result.indexed);
    let _ = writeln!(out, "upsertOperations: {}", result.upsert_operations);
    let _ = writeln!(out, "deleted: {}", result.deleted);
    let _ = writeln!(out, "unchanged: {}", result.unchanged);
    let _ = writeln!(out, "bulkCalls: {}", result.bulk_calls);
    let _ = writeln!(out, "bulkDurationMs: {}", result.bulk_duration_ms);
    let _ = writeln!(out, "partialFailures: {}", result.partial_failures);
    let _ = writeln!(out, "enrichmentFailures: {}", result.enrichment_failures);
    for (name, total) in &report.counters {
        let _ = writeln!(out, "counter {name}: {total}");
    }
    if let Some(error) = report.error.as_ref() {
        let _ = writeln!(out, "error: {} {}", error.code, error.message);
    }
    out
}
