//! CLI command handlers.

pub mod config;
pub mod index;
pub mod secret;
pub mod sync;

pub use config::{run_config_check, run_config_show};
pub use index::{run_index_clean, run_index_delete, run_index_list};
pub use secret::{run_secret_create, run_secret_get};
pub use sync::run_sync;

use crate::CommandContext;
use crate::error::CliError;
use docsync_config::DocsyncEnv;
use docsync_infra::{InfraResult, build_es_client};
use docsync_ports::IndexAdminPort;
use docsync_shared::{ErrorEnvelope, RequestContext};
use std::future::Future;
use std::sync::Arc;

/// Run `task` on a fresh runtime; Ctrl-C cancels `ctx`.
pub(crate) fn block_on<F>(ctx: &RequestContext, task: F) -> Result<F::Output, CliError>
where
    F: Future,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    Ok(runtime.block_on(async {
        let cancel = ctx.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
        let output = task.await;
        watcher.abort();
        output
    }))
}

/// Parsed `DOCSYNC_*` secrets and overrides.
pub(crate) fn parsed_env(ctx: &CommandContext<'_>) -> InfraResult<DocsyncEnv> {
    DocsyncEnv::from_map(ctx.env).map_err(ErrorEnvelope::from)
}

/// Elasticsearch admin client for the effective config.
pub(crate) fn admin_client(ctx: &CommandContext<'_>) -> InfraResult<Arc<dyn IndexAdminPort>> {
    let env = parsed_env(ctx)?;
    Ok(Arc::new(build_es_client(ctx.config, &env)?))
}
