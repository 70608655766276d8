use std::collections::HashMap;

use crate::models::Event;

/// Category assigned to events without any `type` tag.
pub const NO_CATEGORY: &str = "_none";

/// Per-category maximums applied to an already ranked list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapPolicy {
    caps: HashMap<String, usize>,
    default_cap: Option<usize>,
}

impl CapPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cap(mut self, category: impl Into<String>, limit: usize) -> Self {
        self.caps.insert(category.into(), limit);
        self
    }

    /// Limit for every category without an explicit cap.
    pub fn default_cap(mut self, limit: usize) -> Self {
        self.default_cap = Some(limit);
        self
    }

    /// `None` means the category is unlimited.
    pub fn limit_for(&self, category: &str) -> Option<usize> {
        self.caps.get(category).copied().or(self.default_cap)
    }

    /// Featured rail: one match at most, two of anything else.
    pub fn featured() -> Self {
        Self::new().cap("sport_match", 1).default_cap(2)
    }

    /// Upcoming list: keeps football from crowding everything out.
    pub fn upcoming() -> Self {
        Self::new().cap("sport_match", 3).default_cap(100)
    }
}

/// First `type` tag, or [`NO_CATEGORY`].
pub fn primary_type(event: &Event) -> &str {
    event
        .tags_type
        .first()
        .map(String::as_str)
        .unwrap_or(NO_CATEGORY)
}

/// Drops events whose category already reached its cap, in one pass.
///
/// The input is expected to be sorted by relevance already; survivors keep
/// their relative order.
pub fn cap<F>(ranked: &[Event], category_of: F, policy: &CapPolicy) -> Vec<Event>
where
    F: Fn(&Event) -> &str,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(ranked.len());
    for event in ranked {
        let category = category_of(event);
        let Some(limit) = policy.limit_for(category) else {
            kept.push(event.clone());
            continue;
        };
        let count = counts.entry(category).or_insert(0);
        if *count < limit {
            *count += 1;
            kept.push(event.clone());
        }
    }
    kept
}

/// [`cap`] keyed on the primary type tag.
pub fn diversify(ranked: &[Event], policy: &CapPolicy) -> Vec<Event> {
    cap(ranked, primary_type, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, kind: Option<&str>) -> Event {
        Event {
            id: id.to_string(),
            tags_type: kind.map(|k| vec![k.to_string()]).unwrap_or_default(),
            ..Default::default()
        }
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn caps_one_category_and_keeps_order() {
        let ranked = vec![
            event("A", Some("sport")),
            event("B", Some("sport")),
            event("C", Some("music")),
            event("D", Some("sport")),
        ];
        let policy = CapPolicy::new().cap("sport", 2);
        assert_eq!(ids(&diversify(&ranked, &policy)), vec!["A", "B", "C"]);
    }

    #[test]
    fn uncapped_categories_are_never_dropped() {
        let ranked: Vec<Event> = (0..50)
            .map(|i| event(&format!("m{i}"), Some("music")))
            .collect();
        let out = diversify(&ranked, &CapPolicy::new().cap("sport", 0));
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn untagged_events_share_the_none_bucket() {
        let ranked = vec![event("a", None), event("b", None), event("c", None)];
        let policy = CapPolicy::new().cap(NO_CATEGORY, 1);
        assert_eq!(ids(&diversify(&ranked, &policy)), vec!["a"]);
    }

    #[test]
    fn featured_policy_applies_default_cap() {
        let ranked = vec![
            event("m1", Some("sport_match")),
            event("c1", Some("concert")),
            event("m2", Some("sport_match")),
            event("c2", Some("concert")),
            event("c3", Some("concert")),
            event("p1", Some("party")),
        ];
        let out = diversify(&ranked, &CapPolicy::featured());
        assert_eq!(ids(&out), vec!["m1", "c1", "c2", "p1"]);
    }

    #[test]
    fn custom_category_function() {
        let mut a = event("a", Some("concert"));
        a.location_city = "Nice".into();
        let mut b = event("b", Some("party"));
        b.location_city = "Nice".into();
        let mut c = event("c", Some("show"));
        c.location_city = "Cannes".into();
        let policy = CapPolicy::new().default_cap(1);
        let out = cap(&[a, b, c], |e| e.location_city.as_str(), &policy);
        assert_eq!(ids(&out), vec!["a", "c"]);
    }

    #[test]
    fn no_category_exceeds_its_cap() {
        let kinds = ["sport_match", "concert", "sport_match", "food", "sport_match", "sport_match"];
        let ranked: Vec<Event> = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| event(&i.to_string(), Some(k)))
            .collect();
        let out = diversify(&ranked, &CapPolicy::upcoming());
        let matches = out.iter().filter(|e| primary_type(e) == "sport_match").count();
        assert_eq!(matches, 3);
        assert_eq!(out.len(), 5);
    }
}
