//! Elasticsearch REST adapter for the search index and admin ports.

mod admin;
mod auth;
mod client;
mod error;
mod search_index;

pub use auth::{EsAuth, EsAuthInput};
pub use client::{ElasticsearchClient, EsClientConfig};
pub use error::{EsErrorContext, error_reason, map_http_error, map_transport_error};
pub use search_index::{encode_bulk, parse_bulk_response};
