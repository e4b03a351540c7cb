//! Elasticsearch credential resolution and the `Authorization` header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use docsync_shared::{ErrorCode, ErrorEnvelope, Result, SecretString};

/// Credentials used by the REST client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EsAuth {
    /// Encoded API key (`base64(id:key)`).
    ApiKey(SecretString),
    /// Basic auth.
    Basic {
        /// User name.
        username: Box<str>,
        /// Password.
        password: SecretString,
    },
}

/// Raw credential inputs, as read from config and env.
#[derive(Debug, Clone, Default)]
pub struct EsAuthInput<'a> {
    /// API key, either encoded or as `id:key`.
    pub api_key: Option<&'a SecretString>,
    /// Basic-auth user.
    pub username: Option<&'a str>,
    /// Basic-auth password.
    pub password: Option<&'a SecretString>,
}

impl EsAuth {
    /// Pick credentials: an API key wins over username/password.
    ///
    /// An API key containing `:` is treated as `id:key` and base64 encoded.
    pub fn resolve(input: &EsAuthInput<'_>) -> Result<Self> {
        let api_key = input
            .api_key
            .map(|key| key.expose().trim())
            .filter(|key| !key.is_empty());
        if let Some(key) = api_key {
            let encoded = if key.contains(':') {
                STANDARD.encode(key.as_bytes())
            } else {
                key.to_owned()
            };
            return Ok(Self::ApiKey(SecretString::new(encoded)));
        }

        let username = input.username.map(str::trim).filter(|user| !user.is_empty());
        let password = input.password.filter(|password| !password.expose().is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok(Self::Basic {
                username: username.into(),
                password: password.clone(),
            }),
            _ => Err(ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_credentials"),
                "Invalid Elasticsearch credentials",
            )),
        }
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn header_value(&self) -> SecretString {
        match self {
            Self::ApiKey(key) => SecretString::new(format!("ApiKey {}", key.expose())),
            Self::Basic { username, password } => {
                let raw = format!("{username}:{}", password.expose());
                SecretString::new(format!("Basic {}", STANDARD.encode(raw.as_bytes())))
            },
        }
    }
}
