//! Filter helpers translating eligibility predicates into Qdrant filter payloads.

use serde_json::{Value, json};

use super::types::EligibilityFilter;

/// Compose the Qdrant filter selecting documents that still need enrichment.
///
/// A document matches when the target field is empty (missing, null, or `[]`) or holds an
/// empty string, and every required field is populated.
pub fn build_eligibility_filter(filter: &EligibilityFilter) -> Value {
    let target = filter.target_field.as_str();
    let mut must = vec![json!({
        "should": [
            { "is_empty": { "key": target } },
            { "key": target, "match": { "value": "" } }
        ]
    })];

    for field in filter
        .required_fields
        .iter()
        .map(|field| field.trim())
        .filter(|field| !field.is_empty())
    {
        must.push(json!({
            "must_not": [
                { "is_empty": { "key": field } },
                { "key": field, "match": { "value": "" } }
            ]
        }));
    }

    json!({ "must": must })
}
