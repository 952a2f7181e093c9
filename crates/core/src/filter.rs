use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanscopeError};
use crate::model::tag::TagValue;

/// One `key=value` term of a tag expression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

impl TagFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let (key, value) = input
            .split_once('=')
            .ok_or_else(|| SpanscopeError::Validation(format!("invalid tag filter: {input}")))?;

        if key.trim().is_empty() || value.trim().is_empty() {
            return Err(SpanscopeError::Validation(format!(
                "invalid tag filter: {input}"
            )));
        }

        Ok(Self {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        })
    }

    /// Parses a comma separated expression such as `error=true,http.status_code=500`.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        input
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn matches(&self, tags: &BTreeMap<String, TagValue>) -> bool {
        tags.get(&self.key)
            .is_some_and(|value| value.to_string() == self.value)
    }
}

/// Renders filters as the JSON object Jaeger's search endpoint expects in its `tags` parameter.
pub fn tags_to_json(filters: &[TagFilter]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = filters
        .iter()
        .map(|f| (f.key.clone(), serde_json::Value::String(f.value.clone())))
        .collect();
    serde_json::Value::Object(map).to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self {
            since: None,
            until: None,
        }
    }

    pub fn last(duration: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            since: Some(now - duration),
            until: Some(now),
        }
    }

    pub fn last_hours(hours: u32) -> Self {
        Self::last(chrono::Duration::hours(i64::from(hours)))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(since) = self.since
            && ts < since
        {
            return false;
        }
        if let Some(until) = self.until
            && ts > until
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn tag_filter_parse_and_match() {
        let f = TagFilter::parse(" http.status_code = 500 ").unwrap();
        assert_eq!(f.key, "http.status_code");
        assert_eq!(f.value, "500");

        let mut tags = BTreeMap::new();
        tags.insert("http.status_code".to_string(), TagValue::Int(500));
        assert!(f.matches(&tags));
        tags.insert("http.status_code".to_string(), TagValue::Int(200));
        assert!(!f.matches(&tags));
    }

    #[test]
    fn tag_list_skips_empty_terms() {
        let filters = TagFilter::parse_list("error=true,, peer.service=redis").unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].key, "peer.service");
        assert!(TagFilter::parse_list("error").is_err());
        assert!(TagFilter::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn tags_render_as_json_object() {
        let filters = TagFilter::parse_list("error=true").unwrap();
        assert_eq!(tags_to_json(&filters), r#"{"error":"true"}"#);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let since = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2026, 2, 1, 1, 0, 0).unwrap();
        let window = TimeWindow {
            since: Some(since),
            until: Some(until),
        };
        assert!(window.contains(since));
        assert!(window.contains(until));
        assert!(!window.contains(until + chrono::Duration::seconds(1)));
        assert!(TimeWindow::all().contains(since));
    }
}
