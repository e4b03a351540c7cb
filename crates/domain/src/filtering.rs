//! Source-side filtering rules and their validation outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied by a basic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Field equals value.
    Equals,
    /// Field contains value (substring).
    Contains,
    /// Field starts with value.
    StartsWith,
    /// Field ends with value.
    EndsWith,
    /// Field (string) matches a glob with `*`.
    Glob,
}

/// Include or exclude matching documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Keep matches.
    #[default]
    Include,
    /// Drop matches.
    Exclude,
}

/// One basic filtering rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    /// Field the rule reads.
    pub field: String,
    /// Comparison.
    pub operator: FilterOperator,
    /// Operand.
    pub value: String,
    /// Include/exclude.
    #[serde(default)]
    pub policy: FilterPolicy,
}

/// Filtering passed to a source with `get_docs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filter {
    /// Basic rules, all of which must accept a document.
    pub rules: Vec<FilterRule>,
    /// Source-specific advanced rules, opaque to the engine.
    pub advanced: Value,
}

impl Filter {
    /// Returns true when nothing is filtered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let advanced_empty = match &self.advanced {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        self.rules.is_empty() && advanced_empty
    }
}

/// Result state of filtering validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilteringValidationState {
    /// Rules can be applied.
    Valid,
    /// At least one rule is rejected.
    Invalid,
}

/// A single rejected rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringValidationError {
    /// Identifier of the offending rule (field name or `advanced`).
    pub rule: String,
    /// Human-readable reasons.
    pub messages: Vec<String>,
}

/// Outcome of `validate_filtering`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringValidationResult {
    /// Aggregate state.
    pub state: FilteringValidationState,
    /// Rejected rules.
    pub errors: Vec<FilteringValidationError>,
}

impl FilteringValidationResult {
    /// A valid outcome.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            state: FilteringValidationState::Valid,
            errors: Vec::new(),
        }
    }

    /// Build from a list of errors; empty means valid.
    #[must_use]
    pub fn from_errors(errors: Vec<FilteringValidationError>) -> Self {
        let state = if errors.is_empty() {
            FilteringValidationState::Valid
        } else {
            FilteringValidationState::Invalid
        };
        Self { state, errors }
    }

    /// Returns true when the state is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state == FilteringValidationState::Valid
    }
}

impl FilterRule {
    /// Apply the comparison to a field value.
    #[must_use]
    pub fn matches(&self, field_value: &str) -> bool {
        match self.operator {
            FilterOperator::Equals => field_value == self.value,
            FilterOperator::Contains => field_value.contains(&self.value),
            FilterOperator::StartsWith => field_value.starts_with(&self.value),
            FilterOperator::EndsWith => field_value.ends_with(&self.value),
            FilterOperator::Glob => glob_matches(&self.value, field_value),
        }
    }

    /// Whether a document with this field value passes the rule.
    #[must_use]
    pub fn accepts(&self, field_value: Option<&str>) -> bool {
        let matched = field_value.is_some_and(|value| self.matches(value));
        match self.policy {
            FilterPolicy::Include => matched,
            FilterPolicy::Exclude => !matched,
        }
    }
}

fn glob_matches(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let remaining: Vec<&str> = parts.collect();
    let Some((last, middle)) = remaining.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(*part) {
            Some(position) => rest = rest.get(position + part.len()..).unwrap_or(""),
            None => return false,
        }
    }
    rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(operator: FilterOperator, value: &str, policy: FilterPolicy) -> FilterRule {
        FilterRule {
            field: "path".to_string(),
            operator,
            value: value.to_string(),
            policy,
        }
    }

    #[test]
    fn operators_match() {
        assert!(rule(FilterOperator::Equals, "a", FilterPolicy::Include).matches("a"));
        assert!(rule(FilterOperator::Contains, "ell", FilterPolicy::Include).matches("hello"));
        assert!(rule(FilterOperator::StartsWith, "he", FilterPolicy::Include).matches("hello"));
        assert!(rule(FilterOperator::EndsWith, ".md", FilterPolicy::Include).matches("a.md"));
        assert!(rule(FilterOperator::Glob, "docs/*.md", FilterPolicy::Include).matches("docs/a.md"));
        assert!(rule(FilterOperator::Glob, "*a*c", FilterPolicy::Include).matches("xabc"));
        assert!(!rule(FilterOperator::Glob, "docs/*.md", FilterPolicy::Include).matches("src/a.md"));
    }

    #[test]
    fn exclude_inverts_and_missing_fields_never_match() {
        let exclude = rule(FilterOperator::EndsWith, ".tmp", FilterPolicy::Exclude);
        assert!(!exclude.accepts(Some("a.tmp")));
        assert!(exclude.accepts(Some("a.txt")));
        assert!(exclude.accepts(None));

        let include = rule(FilterOperator::EndsWith, ".md", FilterPolicy::Include);
        assert!(!include.accepts(None));
    }

    #[test]
    fn validation_state_follows_errors() {
        assert!(FilteringValidationResult::from_errors(Vec::new()).is_valid());
        let invalid = FilteringValidationResult::from_errors(vec![FilteringValidationError {
            rule: "advanced".to_string(),
            messages: vec!["unsupported".to_string()],
        }]);
        assert_eq!(invalid.state, FilteringValidationState::Invalid);
        assert!(Filter::default().is_empty());
    }
}
