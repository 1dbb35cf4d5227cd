//! Subscription filters: JSON decoding and in-memory matching.

use std::collections::HashMap;

use serde_json::Value;

use crate::event::Event;

/// Limit applied to historical queries when a filter names none.
pub const DEFAULT_QUERY_LIMIT: usize = 500;

/// Semantic filter over events.
///
/// Every specified field must match; a filter with no fields matches every
/// event. Used both for live dispatch and as the oracle for stored-event
/// queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Prefix-match set over event ids.
    pub ids: Option<Vec<String>>,
    /// Prefix-match set over author pubkeys.
    pub authors: Option<Vec<String>>,
    /// Exact-match set over kinds.
    pub kinds: Option<Vec<i32>>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<i64>,
    /// Inclusive upper bound on `created_at`.
    pub until: Option<i64>,
    /// Cap on historical results for this filter.
    pub limit: Option<usize>,
    /// Tag-name to value-set constraints, keys stored without the `#` prefix.
    pub tags: HashMap<String, Vec<String>>,
}

impl Filter {
    /// Decode a filter from its JSON object form. Returns `None` when the
    /// value is not an object.
    pub fn from_value(val: &Value) -> Option<Self> {
        let obj = val.as_object()?;
        let ids = obj.get("ids").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        });
        let authors = obj.get("authors").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        });
        let kinds = obj.get("kinds").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_i64().map(|k| k as i32))
                .collect()
        });
        let since = obj.get("since").and_then(Value::as_i64);
        let until = obj.get("until").and_then(Value::as_i64);
        let limit = obj
            .get("limit")
            .and_then(Value::as_u64)
            .map(|v| v as usize);
        let mut tags = HashMap::new();
        for (k, v) in obj {
            let Some(name) = k.strip_prefix('#') else {
                continue;
            };
            let values = v
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            tags.insert(name.to_string(), values);
        }
        Some(Self {
            ids,
            authors,
            kinds,
            since,
            until,
            limit,
            tags,
        })
    }

    /// Whether the event satisfies every specified field.
    pub fn matches(&self, ev: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|p| ev.id.starts_with(p.as_str())) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|p| ev.pubkey.starts_with(p.as_str())) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&ev.kind) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if ev.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ev.created_at > until {
                return false;
            }
        }
        for (name, values) in &self.tags {
            let hit = ev
                .tags
                .iter()
                .any(|t| t.name() == name && t.value().map_or(false, |v| values.iter().any(|x| x == v)));
            if !hit {
                return false;
            }
        }
        true
    }
}
