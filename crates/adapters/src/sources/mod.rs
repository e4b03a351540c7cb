//! Built-in data sources.

mod directory;
mod fake;

pub use directory::{DIRECTORY_SERVICE_TYPE, DirectorySource};
pub use fake::{FAKE_SERVICE_TYPE, FakeSource};

use docsync_domain::{Document, Filter, FilteringValidationError, FilteringValidationResult};
use serde_json::Value;

/// Returns true when every basic rule accepts the document.
///
/// Non-string field values are compared by their JSON rendering.
pub(crate) fn passes_rules(filter: &Filter, document: &Document) -> bool {
    filter.rules.iter().all(|rule| {
        let value = document.get(&rule.field).map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });
        rule.accepts(value.as_deref())
    })
}

/// Validate that rules only name `fields` and that no advanced rules are set.
pub(crate) fn validate_rules(filter: &Filter, fields: &[&str]) -> FilteringValidationResult {
    let mut errors: Vec<FilteringValidationError> = filter
        .rules
        .iter()
        .filter(|rule| !fields.contains(&rule.field.as_str()))
        .map(|rule| FilteringValidationError {
            rule: rule.field.clone(),
            messages: vec![format!(
                "unknown field '{}', expected one of: {}",
                rule.field,
                fields.join(", ")
            )],
        })
        .collect();

    let has_advanced = match &filter.advanced {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    };
    if has_advanced {
        errors.push(FilteringValidationError {
            rule: "advanced".to_owned(),
            messages: vec!["advanced rules are not supported by this source".to_owned()],
        });
    }
    FilteringValidationResult::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_domain::{DocumentId, FilterOperator, FilterPolicy, FilterRule, PrimitiveError};
    use serde_json::json;

    fn rule(field: &str, operator: FilterOperator, value: &str, policy: FilterPolicy) -> FilterRule {
        FilterRule {
            field: field.to_owned(),
            operator,
            value: value.to_owned(),
            policy,
        }
    }

    #[test]
    fn all_rules_must_accept() -> Result<(), PrimitiveError> {
        let document = Document::new(DocumentId::parse("1")?)
            .with_field("extension", json!("md"))
            .with_field("size", json!(42));
        let filter = Filter {
            rules: vec![
                rule("extension", FilterOperator::Equals, "md", FilterPolicy::Include),
                rule("size", FilterOperator::Equals, "42", FilterPolicy::Include),
            ],
            advanced: Value::Null,
        };
        assert!(passes_rules(&filter, &document));

        let excluded = Filter {
            rules: vec![rule("extension", FilterOperator::Equals, "md", FilterPolicy::Exclude)],
            advanced: Value::Null,
        };
        assert!(!passes_rules(&excluded, &document));
        Ok(())
    }

    #[test]
    fn unknown_fields_and_advanced_rules_are_invalid() {
        let filter = Filter {
            rules: vec![rule("owner", FilterOperator::Equals, "me", FilterPolicy::Include)],
            advanced: json!({ "query": "x" }),
        };
        let result = validate_rules(&filter, &["path", "name"]);
        assert!(!result.is_valid());
        let rules: Vec<&str> = result.errors.iter().map(|error| error.rule.as_str()).collect();
        assert_eq!(rules, vec!["owner", "advanced"]);
    }
}
