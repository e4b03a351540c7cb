//! Analysis settings and mappings applied to content indices.

use docsync_ports::ContentIndexSpec;
use serde_json::{Map, Value, json};

/// Analyzer applied to text fields.
pub const TEXT_ANALYZER: &str = "docsync_text";

/// Analyzer stemmer/stopword language for an ISO 639-1 code, if supported.
#[must_use]
pub fn analyzer_language(language_code: &str) -> Option<&'static str> {
    let language = match language_code.trim().to_ascii_lowercase().as_str() {
        "da" => "danish",
        "de" => "german",
        "en" => "english",
        "es" => "spanish",
        "fi" => "finnish",
        "fr" => "french",
        "it" => "italian",
        "nl" => "dutch",
        "no" => "norwegian",
        "pt" => "portuguese",
        "ru" => "russian",
        "sv" => "swedish",
        _ => return None,
    };
    Some(language)
}

/// Settings and mappings for a content index in `language_code`.
///
/// Unsupported languages fall back to a lowercase-only analyzer.
#[must_use]
pub fn content_index_spec(language_code: &str) -> ContentIndexSpec {
    ContentIndexSpec {
        settings: settings(language_code),
        mappings: default_mappings(),
    }
}

fn settings(language_code: &str) -> Value {
    let mut filters = vec![Value::from("lowercase")];
    let mut filter_defs = Map::new();
    if let Some(language) = analyzer_language(language_code) {
        filter_defs.insert(
            "docsync_stop".to_owned(),
            json!({ "type": "stop", "stopwords": format!("_{language}_") }),
        );
        filter_defs.insert(
            "docsync_stem".to_owned(),
            json!({ "type": "stemmer", "language": language }),
        );
        filters.push(Value::from("docsync_stop"));
        filters.push(Value::from("docsync_stem"));
    }

    json!({
        "analysis": {
            "filter": filter_defs,
            "analyzer": {
                TEXT_ANALYZER: {
                    "type": "custom",
                    "tokenizer": "standard",
                    "filter": filters,
                },
            },
        },
    })
}

/// Mappings shared by every content index: every string becomes analyzed
/// text with a `keyword` subfield.
#[must_use]
pub fn default_mappings() -> Value {
    json!({
        "dynamic": true,
        "dynamic_templates": [
            {
                "all_text_fields": {
                    "match_mapping_type": "string",
                    "mapping": {
                        "type": "text",
                        "analyzer": TEXT_ANALYZER,
                        "fields": {
                            "keyword": { "type": "keyword", "ignore_above": 2048 },
                        },
                    },
                },
            },
        ],
        "properties": {
            "id": { "type": "keyword" },
            "timestamp": { "type": "date" },
            "title": { "type": "text", "analyzer": TEXT_ANALYZER },
            "text": { "type": "text", "analyzer": TEXT_ANALYZER },
        },
    })
}

/// Add what `desired` has and `existing` lacks. Existing values win; nested
/// objects are merged the same way.
#[must_use]
pub fn merge_missing(existing: &Value, desired: &Value) -> Value {
    let (Value::Object(existing_map), Value::Object(desired_map)) = (existing, desired) else {
        return existing.clone();
    };

    let mut merged = existing_map.clone();
    for (key, desired_value) in desired_map {
        match merged.get_mut(key) {
            Some(current) => {
                if current.is_object() && desired_value.is_object() {
                    *current = merge_missing(current, desired_value);
                }
            },
            None => {
                merged.insert(key.clone(), desired_value.clone());
            },
        }
    }
    Value::Object(merged)
}

/// Returns true when index settings already define analysis.
#[must_use]
pub fn has_analysis(settings: &Value) -> bool {
    settings.get("analysis").is_some()
        || settings
            .get("index")
            .and_then(|index| index.get("analysis"))
            .is_some()
}
