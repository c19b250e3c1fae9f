//! Trigger matching.
//!
//! A trigger matches an event when every non-empty filter equals the
//! corresponding event field. Empty or absent filters match anything.

use database::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event-matching condition of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Compared against the event category.
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub filters: TriggerFilters,
}

/// Optional exact-match filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerFilters {
    pub event_name: Option<String>,
    pub filter_item_name: Option<String>,
    pub filter_item_category: Option<String>,
    pub filter_item_id: Option<String>,
    /// Number or string; compared numerically when both sides are numbers.
    pub filter_value: Option<Value>,
}

impl Trigger {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            filters: TriggerFilters::default(),
        }
    }

    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.filters.event_name = Some(name.into());
        self
    }

    /// Whether this trigger fires for `event`.
    pub fn matches(&self, event: &Event) -> bool {
        let filters = &self.filters;

        text_matches(Some(&self.event_type), Some(&event.category))
            && text_matches(filters.event_name.as_ref(), Some(&event.name))
            && text_matches(filters.filter_item_name.as_ref(), event.item_name.as_ref())
            && text_matches(filters.filter_item_category.as_ref(), event.item_category.as_ref())
            && text_matches(filters.filter_item_id.as_ref(), event.item_id.as_ref())
            && value_matches(filters.filter_value.as_ref(), event.value)
    }
}

fn text_matches(filter: Option<&String>, actual: Option<&String>) -> bool {
    match filter {
        Some(expected) if !expected.trim().is_empty() => actual == Some(expected),
        _ => true,
    }
}

fn value_matches(filter: Option<&Value>, actual: Option<f64>) -> bool {
    let expected = match filter {
        None | Some(Value::Null) => return true,
        Some(Value::String(s)) if s.trim().is_empty() => return true,
        Some(value) => value,
    };
    let Some(actual) = actual else {
        return false;
    };

    match expected {
        Value::Number(n) => n.as_f64() == Some(actual),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => n == actual,
            Err(_) => *s == actual.to_string(),
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::types::Json;

    fn event(name: &str, category: &str) -> Event {
        Event {
            id: "evt-1".to_string(),
            name: name.to_string(),
            category: category.to_string(),
            properties: Json(json!({})),
            user_id: Some("visitor-1".to_string()),
            organization_id: None,
            timestamp: "2026-03-01 10:00:00".to_string(),
            path: Some("/pricing".to_string()),
            action: None,
            value: Some(49.0),
            item_name: Some("Pro plan".to_string()),
            item_id: Some("sku-9".to_string()),
            item_category: Some("plans".to_string()),
        }
    }

    fn trigger(value: Value) -> Trigger {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_event_type_and_name() {
        let t = trigger(json!({ "eventType": "engagement", "filters": { "eventName": "page_view" } }));
        assert!(t.matches(&event("page_view", "engagement")));
        assert!(!t.matches(&event("click", "engagement")));
        assert!(!t.matches(&event("page_view", "conversion")));

        assert_eq!(Trigger::new("engagement").with_event_name("page_view"), t);
    }

    #[test]
    fn test_empty_filters_are_wildcards() {
        let t = trigger(json!({
            "eventType": "engagement",
            "filters": { "eventName": "", "filterItemName": null, "filterValue": "" }
        }));
        assert!(t.matches(&event("anything", "engagement")));

        let any = trigger(json!({ "eventType": "" }));
        assert!(any.matches(&event("x", "conversion")));
    }

    #[test]
    fn test_item_filters() {
        let t = trigger(json!({
            "eventType": "conversion",
            "filters": { "filterItemName": "Pro plan", "filterItemCategory": "plans", "filterItemId": "sku-9" }
        }));
        assert!(t.matches(&event("purchase", "conversion")));

        let other = trigger(json!({ "eventType": "conversion", "filters": { "filterItemId": "sku-1" } }));
        assert!(!other.matches(&event("purchase", "conversion")));
    }

    #[test]
    fn test_value_filter_numeric_or_string() {
        let e = event("purchase", "conversion");
        assert!(trigger(json!({ "eventType": "conversion", "filters": { "filterValue": 49 } })).matches(&e));
        assert!(trigger(json!({ "eventType": "conversion", "filters": { "filterValue": "49.0" } })).matches(&e));
        assert!(!trigger(json!({ "eventType": "conversion", "filters": { "filterValue": 50 } })).matches(&e));

        let mut no_value = e.clone();
        no_value.value = None;
        assert!(!trigger(json!({ "eventType": "conversion", "filters": { "filterValue": 49 } })).matches(&no_value));
    }

    #[test]
    fn test_exact_match_only() {
        let t = trigger(json!({ "eventType": "engagement", "filters": { "eventName": "page" } }));
        assert!(!t.matches(&event("page_view", "engagement")));
    }
}
