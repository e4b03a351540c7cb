//! Index administration command handlers.

use super::{admin_client, block_on};
use crate::error::{CliError, ExitCode};
use crate::format::{OutputMode, json_document, ndjson_line};
use crate::{CliOutput, CommandContext, format_error_output};
use docsync_infra::{IndexListing, clean_index, delete_indices, list_indices};
use docsync_shared::RequestContext;
use std::fmt::Write as _;

/// List indices with their document counts.
pub fn run_index_list(ctx: &CommandContext<'_>) -> Result<CliOutput, CliError> {
    let admin = match admin_client(ctx) {
        Ok(admin) => admin,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };
    let request = RequestContext::new_request();
    let listing = block_on(
        &request,
        list_indices(&request, admin.as_ref(), ctx.config.retry_policy()),
    )?;
    match listing {
        Ok(listing) => format_listing(ctx.mode, &listing),
        Err(error) => Ok(format_error_output(ctx.mode, &error)),
    }
}

/// Delete every document of `name`; requires `--yes`.
pub fn run_index_clean(
    ctx: &CommandContext<'_>,
    name: &str,
    confirmed: bool,
) -> Result<CliOutput, CliError> {
    if !confirmed {
        return Ok(refuse(ctx.mode, &format!("index clean {name}")));
    }
    let admin = match admin_client(ctx) {
        Ok(admin) => admin,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };
    let request = RequestContext::new_request();
    let deleted = block_on(
        &request,
        clean_index(&request, admin.as_ref(), ctx.config.retry_policy(), name),
    )?;
    match deleted {
        Ok(deleted) => format_summary(
            ctx.mode,
            "clean",
            &serde_json::json!({ "index": name, "deleted": deleted }),
            &format!("status: ok\nindex: {name}\ndeleted: {deleted}\n"),
        ),
        Err(error) => Ok(format_error_output(ctx.mode, &error)),
    }
}

/// Delete indices; requires `--yes`.
pub fn run_index_delete(
    ctx: &CommandContext<'_>,
    names: &[String],
    confirmed: bool,
) -> Result<CliOutput, CliError> {
    if !confirmed {
        return Ok(refuse(ctx.mode, &format!("index delete {}", names.join(" "))));
    }
    let admin = match admin_client(ctx) {
        Ok(admin) => admin,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };
    let request = RequestContext::new_request();
    let deleted = block_on(
        &request,
        delete_indices(&request, admin.as_ref(), ctx.config.retry_policy(), names),
    )?;
    match deleted {
        Ok(deleted) => {
            let mut text = String::from("status: ok\n");
            for name in &deleted {
                let _ = writeln!(text, "deleted: {name}");
            }
            format_summary(
                ctx.mode,
                "delete",
                &serde_json::json!({ "deleted": deleted }),
                &text,
            )
        },
        Err(error) => Ok(format_error_output(ctx.mode, &error)),
    }
}

/// Output for a destructive command run without `--yes`.
fn refuse(mode: OutputMode, command: &str) -> CliOutput {
    let message = format!("refusing to run `{command}` without --yes");
    let stdout = if mode.is_ndjson() {
        ndjson_line(
            "error",
            serde_json::json!({ "status": "error", "message": message }),
        )
        .unwrap_or_default()
    } else if mode.is_json() {
        json_document(&serde_json::json!({ "status": "error", "message": message }))
            .unwrap_or_default()
    } else {
        format!("status: error\nmessage: {message}\n")
    };
    CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::InvalidInput,
    }
}

fn format_listing(mode: OutputMode, listing: &[IndexListing]) -> Result<CliOutput, CliError> {
    let stdout = if mode.is_ndjson() {
        let mut out = String::new();
        for row in listing {
            out.push_str(&ndjson_line("index", serde_json::to_value(row)?)?);
        }
        out.push_str(&ndjson_line(
            "summary",
            serde_json::json!({ "status": "ok", "kind": "list", "count": listing.len() }),
        )?);
        out
    } else if mode.is_json() {
        json_document(&serde_json::json!({ "status": "ok", "indices": listing }))?
    } else {
        let mut out = String::new();
        for row in listing {
            match row.docs_count {
                Some(count) => {
                    let _ = writeln!(out, "{}\t{count}", row.name);
                },
                None => {
                    let _ = writeln!(out, "{}\t-", row.name);
                },
            }
        }
        out
    };
    Ok(CliOutput::ok(stdout))
}

fn format_summary(
    mode: OutputMode,
    kind: &str,
    payload: &serde_json::Value,
    text: &str,
) -> Result<CliOutput, CliError> {
    let mut object = serde_json::json!({ "status": "ok", "kind": kind });
    if let (Some(target), Some(extra)) = (object.as_object_mut(), payload.as_object()) {
        target.extend(extra.clone());
    }
    let stdout = if mode.is_ndjson() {
        ndjson_line("summary", object)?
    } else if mode.is_json() {
        json_document(&object)?
    } else {
        text.to_owned()
    };
    Ok(CliOutput::ok(stdout))
}
