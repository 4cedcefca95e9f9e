// Copyright 2026 the crawler authors.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Payload parsing and `@id` extraction (SPEC_FULL.md §4.5 steps 2-4).

use serde_json::Value;

/// Schema.org types never indexed as standalone search results — site
/// furniture (nav, breadcrumbs, lists) rather than content objects.
pub const SKIP_TYPES: &[&str] = &[
    "ListItem",
    "ItemList",
    "Organization",
    "BreadcrumbList",
    "Breadcrumb",
    "WebSite",
    "SearchAction",
    "SiteNavigationElement",
    "WebPageElement",
    "WebPage",
    "NewsMediaOrganization",
    "MerchantReturnPolicy",
    "ReturnPolicy",
    "CollectionPage",
    "Brand",
    "Corporation",
    "ReadAction",
];

/// True if `obj`'s `@type` equals, or (when `@type` is a list) contains,
/// any member of [`SKIP_TYPES`].
pub fn is_skipped(obj: &Value) -> bool {
    match obj.get("@type") {
        Some(Value::String(s)) => SKIP_TYPES.contains(&s.as_str()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .any(|s| SKIP_TYPES.contains(&s)),
        _ => false,
    }
}

/// Pulls every `@id`-bearing object out of one already-parsed JSON value
/// (a single object or a list), descending one level into a top-level
/// `@graph` array when the parent itself lacks an `@id`. Does not dedup or
/// filter — that happens across the whole payload in [`extract_objects`].
fn objects_from_value(value: Value, out: &mut Vec<Value>) {
    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    for item in items {
        if let Value::Object(map) = &item {
            if map.contains_key("@id") {
                out.push(item);
                continue;
            }
            if let Some(Value::Array(graph)) = map.get("@graph") {
                for entry in graph {
                    if let Value::Object(entry_map) = entry {
                        if entry_map.contains_key("@id") {
                            out.push(entry.clone());
                        }
                    }
                }
            }
        }
    }
}

/// Parses a JSON payload (single object or array) and returns every
/// `@id`-bearing object, deduplicated by first-seen `@id`.
pub fn extract_from_json(body: &str) -> errors::Result<Vec<Value>> {
    let value: Value = serde_json::from_str(body)?;
    let mut raw = Vec::new();
    objects_from_value(value, &mut raw);
    Ok(dedup_by_id(raw))
}

/// Parses a TSV payload: one record per non-empty line, `<url>\t<json>`,
/// where the JSON half is a single object or a list of objects. The URL
/// column itself is not used as the `@id` — it is only a per-line
/// separator; the object's own `@id` field is authoritative.
pub fn extract_from_tsv(body: &str) -> errors::Result<Vec<Value>> {
    let mut raw = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((_url, json_part)) = line.split_once('\t') else {
            continue;
        };
        let value: Value = serde_json::from_str(json_part)?;
        objects_from_value(value, &mut raw);
    }
    Ok(dedup_by_id(raw))
}

/// Dispatches on `content_type` (the job's `contentType` attribute, not
/// the HTTP response header): a `tsv` substring selects the TSV decoder,
/// anything else is treated as JSON.
pub fn extract_objects(body: &str, content_type: Option<&str>) -> errors::Result<Vec<Value>> {
    let is_tsv = content_type
        .map(|ct| ct.to_lowercase().contains("tsv"))
        .unwrap_or(false);
    if is_tsv {
        extract_from_tsv(body)
    } else {
        extract_from_json(body)
    }
}

fn dedup_by_id(objects: Vec<Value>) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(objects.len());
    for obj in objects {
        let id = obj.get("@id").and_then(Value::as_str).map(str::to_string);
        if let Some(id) = id {
            if seen.insert(id) {
                out.push(obj);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_top_level_id_bearing_objects() {
        let body = r#"[{"@id":"a","@type":"Recipe"},{"@id":"b","@type":"ListItem"}]"#;
        let objs = extract_from_json(body).unwrap();
        assert_eq!(objs.len(), 2);
    }

    #[test]
    fn wraps_a_singleton_object_into_a_list() {
        let body = r#"{"@id":"a","@type":"Recipe"}"#;
        let objs = extract_from_json(body).unwrap();
        assert_eq!(objs.len(), 1);
    }

    #[test]
    fn descends_into_graph_only_when_parent_has_no_id() {
        let body = r#"{"@graph":[{"@id":"a","@type":"Recipe"},{"@id":"b"}]}"#;
        let objs = extract_from_json(body).unwrap();
        assert_eq!(objs.len(), 2);
    }

    #[test]
    fn does_not_descend_into_graph_when_parent_has_an_id() {
        let body = r#"{"@id":"parent","@graph":[{"@id":"a"}]}"#;
        let objs = extract_from_json(body).unwrap();
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0]["@id"], "parent");
    }

    #[test]
    fn dedups_by_first_seen_id() {
        let body = r#"[{"@id":"a","@type":"Recipe"},{"@id":"a","@type":"Product"}]"#;
        let objs = extract_from_json(body).unwrap();
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0]["@type"], "Recipe");
    }

    #[test]
    fn objects_without_id_are_dropped() {
        let body = r#"[{"@type":"Recipe"}]"#;
        assert!(extract_from_json(body).unwrap().is_empty());
    }

    #[test]
    fn tsv_decodes_the_json_half_of_each_line() {
        let body = "https://e.com/a\t{\"@id\":\"a\",\"@type\":\"Recipe\"}\n\nhttps://e.com/b\t{\"@id\":\"b\"}\n";
        let objs = extract_from_tsv(body).unwrap();
        assert_eq!(objs.len(), 2);
    }

    #[test]
    fn extract_objects_dispatches_on_content_type_substring() {
        let tsv_body = "u\t{\"@id\":\"a\"}";
        assert_eq!(extract_objects(tsv_body, Some("text/tsv")).unwrap().len(), 1);
        assert_eq!(extract_objects(tsv_body, Some("TSV")).unwrap().len(), 1);
        let json_body = r#"{"@id":"a"}"#;
        assert_eq!(extract_objects(json_body, None).unwrap().len(), 1);
        assert_eq!(extract_objects(json_body, Some("schema.org")).unwrap().len(), 1);
    }

    #[test]
    fn is_skipped_matches_string_type_exactly() {
        assert!(is_skipped(&serde_json::json!({"@type": "BreadcrumbList"})));
        assert!(!is_skipped(&serde_json::json!({"@type": "BreadcrumbListOfThings"})));
    }

    #[test]
    fn is_skipped_matches_any_element_of_a_list_type() {
        assert!(is_skipped(&serde_json::json!({"@type": ["Product", "Organization"]})));
        assert!(!is_skipped(&serde_json::json!({"@type": ["Product", "Offer"]})));
    }

    #[test]
    fn is_skipped_false_when_no_type() {
        assert!(!is_skipped(&serde_json::json!({"name": "x"})));
    }
}
