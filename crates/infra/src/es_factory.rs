//! Elasticsearch client construction from config and env secrets.

use crate::InfraResult;
use docsync_adapters::{ElasticsearchClient, EsAuth, EsAuthInput, EsClientConfig};
use docsync_config::{DocsyncEnv, ValidatedDocsyncConfig};

/// Resolve credentials and build the REST client.
///
/// Secrets only come from `env`; an API key wins over basic auth.
pub fn build_es_client(
    config: &ValidatedDocsyncConfig,
    env: &DocsyncEnv,
) -> InfraResult<ElasticsearchClient> {
    let auth = EsAuth::resolve(&EsAuthInput {
        api_key: env.es_api_key.as_ref(),
        username: config.elasticsearch.username.as_deref(),
        password: env.es_password.as_ref(),
    })?;

    let mut client_config = EsClientConfig::new(config.elasticsearch.host.clone(), auth);
    client_config.serverless = config.elasticsearch.serverless;
    client_config.timeout_ms = config.limits().es_timeout_ms.get();
    tracing::debug!(
        host = %client_config.host,
        serverless = client_config.serverless,
        "building elasticsearch client"
    );
    ElasticsearchClient::new(client_config)
}
