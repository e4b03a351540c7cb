//! Secret storage command handlers.

use super::{admin_client, block_on};
use crate::error::CliError;
use crate::format::{OutputMode, json_document, ndjson_line};
use crate::{CliOutput, CommandContext, format_error_output};
use docsync_infra::{create_secret, get_secret};
use docsync_shared::{RequestContext, SecretString};

/// Store `value` and print the new secret id.
pub fn run_secret_create(ctx: &CommandContext<'_>, value: &str) -> Result<CliOutput, CliError> {
    let admin = match admin_client(ctx) {
        Ok(admin) => admin,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };
    let request = RequestContext::new_request();
    let created = block_on(
        &request,
        create_secret(
            &request,
            admin.as_ref(),
            ctx.config.retry_policy(),
            SecretString::new(value),
        ),
    )?;
    match created {
        Ok(id) => format_field(ctx.mode, "id", &id),
        Err(error) => Ok(format_error_output(ctx.mode, &error)),
    }
}

/// Print the value of secret `id`.
pub fn run_secret_get(ctx: &CommandContext<'_>, id: &str) -> Result<CliOutput, CliError> {
    let admin = match admin_client(ctx) {
        Ok(admin) => admin,
        Err(error) => return Ok(format_error_output(ctx.mode, &error)),
    };
    let request = RequestContext::new_request();
    let fetched = block_on(
        &request,
        get_secret(&request, admin.as_ref(), ctx.config.retry_policy(), id),
    )?;
    match fetched {
        Ok(secret) => format_field(ctx.mode, "value", secret.expose()),
        Err(error) => Ok(format_error_output(ctx.mode, &error)),
    }
}

fn format_field(mode: OutputMode, key: &str, value: &str) -> Result<CliOutput, CliError> {
    let mut payload = serde_json::Map::new();
    payload.insert("status".to_owned(), serde_json::Value::from("ok"));
    payload.insert(key.to_owned(), serde_json::Value::from(value));
    let payload = serde_json::Value::Object(payload);

    let stdout = if mode.is_ndjson() {
        ndjson_line("summary", payload)?
    } else if mode.is_json() {
        json_document(&payload)?
    } else {
        format!("{value}\n")
    };
    Ok(CliOutput::ok(stdout))
}
