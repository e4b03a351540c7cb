//! JSON merge helpers used when layering config sources.
//!
//! Objects merge recursively; any other value replaces what was there.
//! Override documents may use dotted keys (`"sync.chunkSize": 10`), which are
//! expanded to nested objects before merging.

use serde_json::{Map, Value};

/// Merge `overlay` into `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    },
                }
            }
        },
        (slot, value) => *slot = value,
    }
}

/// Set `value` at a dotted `path`, creating intermediate objects.
///
/// A non-object found along the path is replaced by an object.
pub fn nest_value(target: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_owned(), value);
            return;
        }
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
}

/// Expand dotted keys of an override document into nested objects.
///
/// Keys are applied in document order, so a later key wins over an earlier
/// one that sets the same path.
#[must_use]
pub fn expand_dotted_keys(overrides: Value) -> Value {
    let Value::Object(map) = overrides else {
        return overrides;
    };

    let mut expanded = Value::Object(Map::new());
    for (key, value) in map {
        let value = expand_dotted_keys(value);
        let mut single = Map::new();
        nest_value(&mut single, &key, value);
        deep_merge(&mut expanded, Value::Object(single));
    }
    expanded
}

/// Remove and return the value at a dotted `path`, pruning emptied parents.
pub fn take_path(target: &mut Value, path: &str) -> Option<Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Value::Object(map) = target else {
        return None;
    };

    match rest {
        None => map.remove(head),
        Some(rest) => {
            let child = map.get_mut(head)?;
            let taken = take_path(child, rest);
            if child.as_object().is_some_and(Map::is_empty) {
                map.remove(head);
            }
            taken
        },
    }
}

/// Returns true when a value exists at a dotted `path`.
#[must_use]
pub fn has_path(target: &Value, path: &str) -> bool {
    path.split('.')
        .try_fold(target, |node, segment| node.get(segment))
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_field_is_created_when_missing() {
        let mut config = Map::new();
        nest_value(&mut config, "test.nested.property", json!(50));
        assert_eq!(Value::Object(config), json!({ "test": { "nested": { "property": 50 } } }));
    }

    #[test]
    fn nested_field_is_replaced_when_present() {
        let mut config = json!({ "test": { "nested": { "property": 25 } } });
        if let Value::Object(map) = &mut config {
            nest_value(map, "test.nested.property", json!(50));
        }
        assert_eq!(config["test"]["nested"]["property"], 50);
    }

    #[test]
    fn root_field_is_replaced() {
        let mut config = Map::new();
        config.insert("test".to_owned(), json!(10));
        nest_value(&mut config, "test", json!(50));
        assert_eq!(config.get("test"), Some(&json!(50)));
    }

    #[test]
    fn objects_merge_and_scalars_replace() {
        let mut base = json!({ "sync": { "chunkSize": 500, "maxConcurrency": 5 }, "version": 1 });
        deep_merge(&mut base, json!({ "sync": { "chunkSize": 10 }, "service": { "logLevel": "DEBUG" } }));

        assert_eq!(
            base,
            json!({
                "sync": { "chunkSize": 10, "maxConcurrency": 5 },
                "version": 1,
                "service": { "logLevel": "DEBUG" }
            })
        );
    }

    #[test]
    fn dotted_keys_expand_and_merge_with_nested_keys() {
        let expanded = expand_dotted_keys(json!({
            "sync.chunkSize": 10,
            "sync": { "displayEvery": 1 },
            "elasticsearch.pipeline.name": "ingest"
        }));

        assert_eq!(expanded["sync"]["chunkSize"], 10);
        assert_eq!(expanded["sync"]["displayEvery"], 1);
        assert_eq!(expanded["elasticsearch"]["pipeline"]["name"], "ingest");
    }

    #[test]
    fn take_path_prunes_empty_parents() {
        let mut config = json!({ "elasticsearch": { "bulk": { "maxRetries": 20 }, "host": "h" } });

        assert_eq!(take_path(&mut config, "elasticsearch.bulk.maxRetries"), Some(json!(20)));
        assert_eq!(config, json!({ "elasticsearch": { "host": "h" } }));
        assert!(has_path(&config, "elasticsearch.host"));
        assert!(!has_path(&config, "elasticsearch.bulk"));
    }
}
