//! Environment validation helpers for CLI surfaces.

use docsync_config::{DocsyncConfig, DocsyncEnv, apply_env_overrides};
use docsync_shared::ErrorEnvelope;
use std::collections::BTreeMap;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Validate that the provided `DOCSYNC_*` variables parse and merge into a config.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<()> {
    let parsed = DocsyncEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let _ = apply_env_overrides(DocsyncConfig::default(), &parsed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn accepts_known_overrides() {
        let vars = env(&[("DOCSYNC_SYNC_CHUNK_SIZE", "50"), ("DOCSYNC_LOG_LEVEL", "debug")]);
        assert!(validate_env_parsing(&vars).is_ok());
    }

    #[test]
    fn rejects_malformed_numbers() {
        let vars = env(&[("DOCSYNC_SYNC_CHUNK_SIZE", "many")]);
        assert!(validate_env_parsing(&vars).is_err());
    }
}
