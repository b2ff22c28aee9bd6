// src/services/extract/api.rs

//! Structured (JSON) catalog responses.

use serde_json::Value;

use super::{ExtractedPage, FeatureEntry, Item, PlatformEntry, ReleaseEntry};
use crate::error::ExtractionError;
use crate::models::SourceKind;
use crate::utils::normalize_whitespace;

type Locate = fn(&Value) -> Option<&Vec<Value>>;

fn bare_array(value: &Value) -> Option<&Vec<Value>> {
    value.as_array()
}

fn data_envelope(value: &Value) -> Option<&Vec<Value>> {
    value.get("data")?.as_array()
}

fn items_envelope(value: &Value) -> Option<&Vec<Value>> {
    value.get("items")?.as_array()
}

const ENVELOPES: &[(&str, Locate)] = &[
    ("bare_array", bare_array),
    ("data_envelope", data_envelope),
    ("items_envelope", items_envelope),
];

pub(super) fn variant_names() -> Vec<&'static str> {
    ENVELOPES.iter().map(|(name, _)| *name).collect()
}

pub(super) fn extract(raw: &str, kind: SourceKind) -> Result<ExtractedPage, ExtractionError> {
    let no_match = ExtractionError::NoStructuralMatch { kind };
    let value: Value = serde_json::from_str(raw).map_err(|_| no_match.clone())?;

    let (variant, entries) = ENVELOPES
        .iter()
        .find_map(|(name, locate)| locate(&value).map(|entries| (*name, entries)))
        .ok_or(no_match)?;

    let items = entries
        .iter()
        .filter_map(|entry| entry_item(entry, kind))
        .collect();

    Ok(ExtractedPage {
        variant,
        items,
        details: Vec::new(),
        has_next: None,
    })
}

/// Map one JSON entry, dropping it when its identifying fields are missing.
fn entry_item(entry: &Value, kind: SourceKind) -> Option<Item> {
    match kind {
        SourceKind::PlatformList => Some(Item::Platform(PlatformEntry {
            id: field(entry, &["platform_id", "id"])?,
            name: field(entry, &["platform_name", "name", "pid"])?,
        })),
        SourceKind::ReleaseList => Some(Item::Release(ReleaseEntry {
            id: field(entry, &["release_id", "id"])?,
            version: field(entry, &["release_name", "release_number", "version"])?,
        })),
        SourceKind::FeatureList => Some(Item::Feature(FeatureEntry {
            name: field(entry, &["feature_name", "name"])?,
            description: field(entry, &["feature_desc", "description"]),
            feature_set: field(entry, &["feature_set_desc", "feature_set"]),
        })),
        _ => None,
    }
}

/// First non-empty alias value; numbers are accepted as ids.
fn field(entry: &Value, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| match entry.get(*alias)? {
        Value::String(s) => Some(normalize_whitespace(s)).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array_with_numeric_ids() {
        let raw = r#"[{"platform_id": 101, "platform_name": "Catalyst 9300"},
                      {"platform_id": "102", "name": " Catalyst  9500 "}]"#;
        let page = extract(raw, SourceKind::PlatformList).unwrap();

        assert_eq!(page.variant, "bare_array");
        assert_eq!(page.has_next, None);
        assert_eq!(
            page.items,
            vec![
                Item::Platform(PlatformEntry {
                    id: "101".into(),
                    name: "Catalyst 9300".into()
                }),
                Item::Platform(PlatformEntry {
                    id: "102".into(),
                    name: "Catalyst 9500".into()
                }),
            ]
        );
    }

    #[test]
    fn test_data_envelope_release_aliases() {
        let raw = r#"{"data": [{"release_id": 7, "release_number": "17.9.4"},
                               {"id": 8, "version": "17.12.1"}], "total": 2}"#;
        let page = extract(raw, SourceKind::ReleaseList).unwrap();

        assert_eq!(page.variant, "data_envelope");
        assert_eq!(page.items.len(), 2);
        assert_eq!(
            page.items[1],
            Item::Release(ReleaseEntry {
                id: "8".into(),
                version: "17.12.1".into()
            })
        );
    }

    #[test]
    fn test_items_envelope_features_with_optional_fields() {
        let raw = r#"{"items": [
            {"feature_name": "QoS", "feature_desc": "Quality of Service", "feature_set_desc": "IP Base"},
            {"feature_name": "VLAN"}
        ]}"#;
        let page = extract(raw, SourceKind::FeatureList).unwrap();

        assert_eq!(page.variant, "items_envelope");
        assert_eq!(
            page.items[1],
            Item::Feature(FeatureEntry {
                name: "VLAN".into(),
                description: None,
                feature_set: None
            })
        );
    }

    #[test]
    fn test_entries_without_identity_are_dropped() {
        let raw = r#"[{"feature_desc": "no name"}, {"feature_name": "  "}, "junk", {"feature_name": "SNMP"}]"#;
        let page = extract(raw, SourceKind::FeatureList).unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn test_empty_page_still_matches() {
        let page = extract("[]", SourceKind::ReleaseList).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_unknown_shapes_fail() {
        for raw in [r#"{"results": []}"#, "not json", r#"{"data": {"nested": true}}"#] {
            assert_eq!(
                extract(raw, SourceKind::PlatformList).unwrap_err(),
                ExtractionError::NoStructuralMatch {
                    kind: SourceKind::PlatformList
                }
            );
        }
    }
}
