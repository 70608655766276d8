use serde::{Deserialize, Serialize};

use crate::models::{Event, TagCategory};

/// Optional, AND-combined constraints chosen in the filter bar.
///
/// A field that is `None` (or blank) places no constraint on its dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub city: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub vibe: Option<String>,
    pub budget: Option<String>,
    pub search: Option<String>,
}

impl Filters {
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_vibe(mut self, vibe: impl Into<String>) -> Self {
        self.vibe = Some(vibe.into());
        self
    }

    pub fn with_budget(mut self, budget: impl Into<String>) -> Self {
        self.budget = Some(budget.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Number of dimensions that actually constrain the result.
    pub fn active_count(&self) -> usize {
        [
            &self.city,
            &self.kind,
            &self.vibe,
            &self.budget,
            &self.search,
        ]
        .into_iter()
        .filter(|value| active(value).is_some())
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(city) = active(&self.city) {
            if !contains_ignore_case(&event.location_city, city) {
                return false;
            }
        }
        if let Some(kind) = active(&self.kind) {
            if !event.has_tag(TagCategory::Type, kind) {
                return false;
            }
        }
        if let Some(vibe) = active(&self.vibe) {
            if !event.has_tag(TagCategory::Vibe, vibe) {
                return false;
            }
        }
        if let Some(budget) = active(&self.budget) {
            if !event.has_tag(TagCategory::Budget, budget) {
                return false;
            }
        }
        if let Some(query) = active(&self.search) {
            let hit = contains_ignore_case(&event.title, query)
                || contains_ignore_case(&event.description, query)
                || contains_ignore_case(&event.location_name, query);
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Keeps the events matching every active filter, in input order.
pub fn apply(events: &[Event], filters: &Filters) -> Vec<Event> {
    if filters.is_empty() {
        return events.to_vec();
    }
    events
        .iter()
        .filter(|event| filters.matches(event))
        .cloned()
        .collect()
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, city: &str, kind: &str, title: &str) -> Event {
        Event {
            id: id.to_string(),
            title: title.to_string(),
            location_city: city.to_string(),
            tags_type: vec![kind.to_string()],
            ..Default::default()
        }
    }

    fn sample() -> Vec<Event> {
        let mut jazz = event("a", "Nice", "concert", "Nice Jazz Festival");
        jazz.tags_vibe = vec!["festive".into()];
        jazz.tags_budget = vec!["premium".into()];
        let mut match_day = event("b", "Monaco", "sport_match", "AS Monaco - OGC Nice");
        match_day.location_name = "Stade Louis II".into();
        let mut market = event("c", "Cannes", "food", "Marche Forville");
        market.description = "Produits frais tous les matins".into();
        market.tags_budget = vec!["free".into()];
        let rooftop = event("d", "Nice", "bar_rooftop", "Sunset au rooftop");
        vec![jazz, match_day, market, rooftop]
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn no_filters_is_identity() {
        let events = sample();
        assert_eq!(apply(&events, &Filters::default()), events);
    }

    #[test]
    fn blank_fields_do_not_constrain() {
        let events = sample();
        let filters = Filters::default().with_city("").with_search("");
        assert!(filters.is_empty());
        assert_eq!(apply(&events, &filters), events);
    }

    #[test]
    fn whitespace_only_fields_do_not_constrain() {
        let events = sample();
        let filters = Filters::default().with_city("  ").with_search("\t ");
        assert_eq!(filters.active_count(), 0);
        assert_eq!(apply(&events, &filters), events);

        let padded = Filters::default().with_city(" cannes ");
        assert_eq!(ids(&apply(&events, &padded)), vec!["c"]);
    }

    #[test]
    fn city_is_case_insensitive_substring() {
        let events = sample();
        let out = apply(&events, &Filters::default().with_city("nic"));
        assert_eq!(ids(&out), vec!["a", "d"]);
    }

    #[test]
    fn tag_filters_need_exact_codes() {
        let events = sample();
        assert_eq!(ids(&apply(&events, &Filters::default().with_type("concert"))), vec!["a"]);
        assert!(apply(&events, &Filters::default().with_type("conc")).is_empty());
        assert_eq!(ids(&apply(&events, &Filters::default().with_budget("free"))), vec!["c"]);
        assert_eq!(ids(&apply(&events, &Filters::default().with_vibe("festive"))), vec!["a"]);
    }

    #[test]
    fn search_looks_at_title_description_and_venue() {
        let events = sample();
        assert_eq!(ids(&apply(&events, &Filters::default().with_search("LOUIS"))), vec!["b"]);
        assert_eq!(ids(&apply(&events, &Filters::default().with_search("frais"))), vec!["c"]);
        assert_eq!(ids(&apply(&events, &Filters::default().with_search("nice"))), vec!["a", "b"]);
    }

    #[test]
    fn dimensions_are_and_combined() {
        let events = sample();
        let filters = Filters::default().with_city("Nice").with_search("nice");
        assert_eq!(filters.active_count(), 2);
        assert_eq!(ids(&apply(&events, &filters)), vec!["a"]);
    }

    #[test]
    fn output_is_an_ordered_subset() {
        let events = sample();
        let combos = [
            Filters::default().with_city("n"),
            Filters::default().with_search("o"),
            Filters::default().with_type("food").with_city("cannes"),
            Filters::default().with_vibe("chill"),
        ];
        for filters in combos {
            let out = apply(&events, &filters);
            let mut cursor = 0;
            for kept in &out {
                let pos = events[cursor..]
                    .iter()
                    .position(|e| e.id == kept.id)
                    .expect("output event comes from the input, in order");
                cursor += pos + 1;
            }
        }
    }
}
