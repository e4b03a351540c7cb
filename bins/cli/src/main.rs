//! CLI binary entrypoint.

mod commands;
mod error;
mod format;
mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use commands::{
    run_config_check, run_config_show, run_index_clean, run_index_delete, run_index_list,
    run_secret_create, run_secret_get, run_sync,
};
use docsync_config::{ConfigFormat, ValidatedDocsyncConfig};
use docsync_infra::{InfraError, load_effective_config};
use docsync_shared::ErrorKind;
use error::{CliError, ExitCode};
use format::{OutputArgs, OutputMode, json_document, ndjson_line};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "docsync",
    version,
    about = "Synchronize documents from a data source into a search index",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    /// Config file path (JSON or TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one incremental sync pass into an index.
    Sync {
        /// Target index name.
        #[arg(long)]
        index: String,
        /// Data source type (overrides `sources.serviceType`).
        #[arg(long)]
        service_type: Option<String>,
        /// Root directory for the `directory` source.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Index administration commands.
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
    /// Secret storage commands.
    Secret {
        #[command(subcommand)]
        command: SecretCommands,
    },
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum IndexCommands {
    /// List indices with their document counts.
    List,
    /// Delete every document of an index.
    Clean {
        /// Index name.
        name: String,
        /// Confirm the destructive operation.
        #[arg(long)]
        yes: bool,
    },
    /// Delete indices.
    Delete {
        /// Index names.
        #[arg(required = true)]
        names: Vec<String>,
        /// Confirm the destructive operation.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SecretCommands {
    /// Store a secret and print its id.
    Create {
        /// Secret value.
        value: String,
    },
    /// Print a stored secret.
    Get {
        /// Secret id.
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the effective config.
    Show {
        /// Document format.
        #[arg(long, value_enum, default_value_t = ConfigDocumentFormat::Json)]
        format: ConfigDocumentFormat,
    },
    /// Check credentials and source settings against the effective config.
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConfigDocumentFormat {
    Json,
    Toml,
}

impl From<ConfigDocumentFormat> for ConfigFormat {
    fn from(value: ConfigDocumentFormat) -> Self {
        match value {
            ConfigDocumentFormat::Json => Self::Json,
            ConfigDocumentFormat::Toml => Self::Toml,
        }
    }
}

pub(crate) struct CliOutput {
    stdout: String,
    stderr: String,
    exit_code: ExitCode,
}

impl CliOutput {
    pub(crate) const fn ok(stdout: String) -> Self {
        Self {
            stdout,
            stderr: String::new(),
            exit_code: ExitCode::Ok,
        }
    }
}

/// Inputs shared by every command handler.
pub(crate) struct CommandContext<'a> {
    pub mode: OutputMode,
    pub config: &'a ValidatedDocsyncConfig,
    pub env: &'a BTreeMap<String, String>,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = OutputMode::from_args(&cli.output);

    match run(&cli, mode) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

fn run(cli: &Cli, mode: OutputMode) -> Result<CliOutput, CliError> {
    let env = collect_scoped_env("DOCSYNC_");
    let overrides = build_overrides_json(&cli.command)?;
    let config = match load_effective_config(&env, cli.config.as_deref(), overrides.as_deref()) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    logging::init_tracing(config.service.tracing_directive(), mode.format);

    let ctx = CommandContext {
        mode,
        config: &config,
        env: &env,
    };
    match &cli.command {
        Commands::Sync { index, .. } => run_sync(&ctx, index),
        Commands::Index { command } => match command {
            IndexCommands::List => run_index_list(&ctx),
            IndexCommands::Clean { name, yes } => run_index_clean(&ctx, name, *yes),
            IndexCommands::Delete { names, yes } => run_index_delete(&ctx, names, *yes),
        },
        Commands::Secret { command } => match command {
            SecretCommands::Create { value } => run_secret_create(&ctx, value),
            SecretCommands::Get { id } => run_secret_get(&ctx, id),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => {
                run_config_show(&ctx, cli.config.as_deref(), (*format).into())
            },
            ConfigCommands::Check => run_config_check(&ctx),
        },
    }
}

/// Dotted-key overrides from `sync` flags; `None` when no flag is set.
fn build_overrides_json(command: &Commands) -> Result<Option<String>, CliError> {
    let Commands::Sync {
        service_type, path, ..
    } = command
    else {
        return Ok(None);
    };

    let mut overrides = serde_json::Map::new();
    if let Some(service_type) = service_type {
        overrides.insert(
            "sources.serviceType".to_owned(),
            serde_json::Value::from(service_type.as_str()),
        );
    }
    if let Some(path) = path {
        overrides.insert(
            "sources.directory.path".to_owned(),
            serde_json::Value::from(path_to_string(path)?),
        );
    }
    if overrides.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&serde_json::Value::Object(
        overrides,
    ))?))
}

fn path_to_string(path: &Path) -> Result<String, CliError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| CliError::InvalidInput(format!("path is not valid UTF-8: {}", path.display())))
}

pub(crate) fn format_error_output(mode: OutputMode, error: &InfraError) -> CliOutput {
    let error = error.clone().redact_metadata(&[]);
    let payload = serde_json::json!({
        "code": error.code.to_string(),
        "message": error.message,
        "kind": error_kind_label(error.kind),
        "retriable": error.is_retriable(),
        "metadata": error.metadata,
    });

    let stdout = if mode.is_ndjson() {
        ndjson_line("error", serde_json::json!({ "status": "error", "error": payload }))
            .unwrap_or_else(|_| "{\"type\":\"error\",\"status\":\"error\"}\n".to_owned())
    } else if mode.is_json() {
        json_document(&serde_json::json!({ "status": "error", "error": payload }))
            .unwrap_or_else(|_| "{\"status\":\"error\"}\n".to_owned())
    } else {
        use std::fmt::Write as _;

        let mut out = format!("status: error\ncode: {}\nmessage: {}\n", error.code, error.message);
        if !error.metadata.is_empty() {
            out.push_str("meta:\n");
            for (key, value) in &error.metadata {
                let _ = writeln!(out, "  {key}: {value}");
            }
        }
        out
    };

    CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::for_error(&error),
    }
}

const fn error_kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Expected => "EXPECTED",
        ErrorKind::Invariant => "INVARIANT",
        ErrorKind::Unexpected => "UNEXPECTED",
    }
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}

fn collect_scoped_env(prefix: &str) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect()
}
