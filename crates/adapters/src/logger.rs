//! Logger adapters: JSON lines and `tracing` forwarding.

use crate::log_sink::LogSink;
use docsync_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use docsync_shared::{REDACTED, is_secret_key};
use serde_json::{Map, Value};
use std::sync::Arc;

/// JSON logger emitting one line per event.
#[derive(Clone)]
pub struct JsonLogger {
    sink: Arc<dyn LogSink>,
    base_fields: LogFields,
    min_level: LogLevel,
}

impl JsonLogger {
    /// Create a JSON logger backed by the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_fields: LogFields::new(),
            min_level: LogLevel::Info,
        }
    }

    /// Set base fields applied to every event.
    #[must_use]
    pub fn with_base_fields(mut self, fields: LogFields) -> Self {
        self.base_fields = fields;
        self
    }

    /// Set the minimum log level.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }
}

impl LoggerPort for JsonLogger {
    fn log(&self, event: LogEvent) {
        if event.level < self.min_level {
            return;
        }

        let fields = merged_fields(&self.base_fields, event.fields);
        let mut payload = Map::new();
        payload.insert(
            "timestamp".to_owned(),
            Value::String(docsync_domain::iso_utc(chrono::Utc::now())),
        );
        payload.insert("level".to_owned(), Value::from(event.level.as_str()));
        payload.insert("event".to_owned(), Value::from(&*event.event));
        payload.insert("message".to_owned(), Value::from(&*event.message));
        if !fields.is_empty() {
            payload.insert("fields".to_owned(), fields_to_json(&fields));
        }
        if let Some(mut error) = event.error {
            redact_value(&mut error);
            payload.insert("error".to_owned(), error);
        }

        let line = serde_json::to_string(&Value::Object(payload)).map_or_else(
            |_| {
                "{\"level\":\"error\",\"event\":\"logger.serialize_failed\",\"message\":\"log serialization failed\"}\n"
                    .to_owned()
            },
            |mut encoded| {
                encoded.push('\n');
                encoded
            },
        );
        self.sink.write_line(&line);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self {
            sink: Arc::clone(&self.sink),
            base_fields: merged_fields(&self.base_fields, Some(fields)),
            min_level: self.min_level,
        })
    }
}

/// Logger forwarding events to the installed `tracing` subscriber.
///
/// Fields are rendered as one JSON string so arbitrary keys survive the
/// static field set of `tracing` macros.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Logger without base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let fields = merged_fields(&self.base_fields, event.fields);
        let fields = if fields.is_empty() {
            String::new()
        } else {
            fields_to_json(&fields).to_string()
        };
        let error = event
            .error
            .map(|mut error| {
                redact_value(&mut error);
                error.to_string()
            })
            .unwrap_or_default();
        let name = &*event.event;
        let message = &*event.message;

        match event.level {
            LogLevel::Debug => tracing::debug!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Info => tracing::info!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Warn => tracing::warn!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Error => tracing::error!(event = name, fields = %fields, error = %error, "{message}"),
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self {
            base_fields: merged_fields(&self.base_fields, Some(fields)),
        })
    }
}

fn merged_fields(base: &LogFields, extra: Option<LogFields>) -> LogFields {
    let mut fields = base.clone();
    fields.extend(extra.into_iter().flatten());
    for (key, value) in &mut fields {
        if is_secret_key(key) {
            *value = Value::from(REDACTED);
        } else {
            redact_value(value);
        }
    }
    fields
}

fn fields_to_json(fields: &LogFields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
    )
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if is_secret_key(key) {
                    *nested = Value::from(REDACTED);
                } else {
                    redact_value(nested);
                }
            }
        },
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {},
    }
}
