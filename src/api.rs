use std::sync::Arc;

use chrono_tz::Tz;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::{
    CrawlStatusResponse, CrawlTriggerResponse, DashboardDigest, DashboardStats, Event, EventPage,
    EventRecord, TagCatalog, TagCategory, TagVocabulary, UserPreferences,
};
use crate::offline::{HttpResponse, OfflineCacheProxy, ProxyError, Request};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid endpoint {endpoint}: {message}")]
    Url { endpoint: String, message: String },
    #[error("API error {status} on {endpoint}: {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },
    #[error("unexpected payload on {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Pre-computed event windows exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Today,
    Week,
    Weekend,
    Month,
    Featured,
    Upcoming,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Today => "today",
            TimeWindow::Week => "week",
            TimeWindow::Weekend => "weekend",
            TimeWindow::Month => "month",
            TimeWindow::Featured => "featured",
            TimeWindow::Upcoming => "upcoming",
        }
    }
}

/// Server-side query for `/api/events`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort: Option<String>,
    pub city: Option<String>,
    pub tag_type: Option<String>,
    pub tag_vibe: Option<String>,
    pub min_score: Option<u8>,
    pub search: Option<String>,
}

impl EventQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        let text_params = [
            ("sort", &self.sort),
            ("city", &self.city),
            ("tag_type", &self.tag_type),
            ("tag_vibe", &self.tag_vibe),
        ];
        for (name, value) in text_params {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((name, value.to_string()));
            }
        }
        if let Some(min_score) = self.min_score.filter(|score| *score > 0) {
            pairs.push(("min_score", min_score.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
struct EventPagePayload {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    per_page: u32,
}

#[derive(Debug, Deserialize)]
struct DigestPayload {
    #[serde(default)]
    today_count: u64,
    #[serde(default)]
    week_count: u64,
    #[serde(default)]
    featured: Vec<Value>,
    #[serde(default)]
    top_upcoming: Vec<Value>,
    #[serde(default)]
    deals: Vec<Value>,
}

/// Decodes event records one by one, skipping the ones that do not parse.
pub fn decode_events(values: Vec<Value>, tz: Tz) -> Vec<Event> {
    let mut events = Vec::with_capacity(values.len());
    for value in values {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<no id>")
            .to_string();
        let record = match serde_json::from_value::<EventRecord>(value) {
            Ok(record) => record,
            Err(err) => {
                warn!(event = %id, "skipping malformed event record: {err}");
                continue;
            }
        };
        match Event::from_record(record, tz) {
            Ok(event) => events.push(event),
            Err(err) => warn!(event = %id, "skipping event: {err}"),
        }
    }
    events
}

/// Typed access to the backend API. Every call goes through the proxy.
pub struct BackendClient {
    base_url: Url,
    proxy: Arc<OfflineCacheProxy>,
    tz: Tz,
}

impl BackendClient {
    pub fn new(base_url: &str, proxy: Arc<OfflineCacheProxy>, tz: Tz) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim()).map_err(|err| ApiError::Url {
            endpoint: base_url.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            base_url,
            proxy,
            tz,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        self.base_url.join(endpoint).map_err(|err| ApiError::Url {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        })
    }

    async fn send(&self, request: Request, endpoint: &str) -> Result<HttpResponse, ApiError> {
        let response = self.proxy.fetch(&request).await?.response;
        if !response.is_success() {
            let body = response.text();
            return Err(ApiError::Status {
                status: response.status,
                endpoint: endpoint.to_string(),
                body: if body.is_empty() {
                    "Unknown error".to_string()
                } else {
                    body
                },
            });
        }
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse, endpoint: &str) -> Result<T, ApiError> {
        response.json().map_err(|err| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        let request = Request::get(url).with_header("accept", "application/json");
        let response = self.send(request, endpoint).await?;
        Self::decode(&response, endpoint)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        let mut request = Request::new(method, url).with_header("accept", "application/json");
        if let Some(body) = body {
            request = request
                .with_json(body)
                .map_err(|err| ApiError::Proxy(err.into()))?;
        }
        let response = self.send(request, endpoint).await?;
        Self::decode(&response, endpoint)
    }

    pub async fn events(&self, query: &EventQuery) -> Result<EventPage, ApiError> {
        let endpoint = "/api/events";
        let mut url = self.endpoint_url(endpoint)?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            let mut serializer = url.query_pairs_mut();
            for (name, value) in &pairs {
                serializer.append_pair(name, value);
            }
        }
        let request = Request::get(url).with_header("accept", "application/json");
        let response = self.send(request, endpoint).await?;
        let payload: EventPagePayload = Self::decode(&response, endpoint)?;
        Ok(EventPage {
            items: decode_events(payload.items, self.tz),
            total: payload.total,
            page: payload.page,
            per_page: payload.per_page,
        })
    }

    pub async fn event(&self, id: &str) -> Result<Event, ApiError> {
        let endpoint = format!("/api/events/{id}");
        let record: EventRecord = self.get_json(&endpoint).await?;
        Event::from_record(record, self.tz).map_err(|err| ApiError::Decode {
            endpoint,
            message: err.to_string(),
        })
    }

    pub async fn events_in(&self, window: TimeWindow) -> Result<Vec<Event>, ApiError> {
        let endpoint = format!("/api/events/{}", window.as_str());
        let values: Vec<Value> = self.get_json(&endpoint).await?;
        Ok(decode_events(values, self.tz))
    }

    pub async fn digest(&self) -> Result<DashboardDigest, ApiError> {
        let payload: DigestPayload = self.get_json("/api/dashboard/digest").await?;
        Ok(DashboardDigest {
            today_count: payload.today_count,
            week_count: payload.week_count,
            featured: decode_events(payload.featured, self.tz),
            top_upcoming: decode_events(payload.top_upcoming, self.tz),
            deals: decode_events(payload.deals, self.tz),
        })
    }

    pub async fn stats(&self) -> Result<DashboardStats, ApiError> {
        self.get_json("/api/dashboard/stats").await
    }

    pub async fn tags(&self) -> Result<TagCatalog, ApiError> {
        self.get_json("/api/tags").await
    }

    pub async fn tags_for(&self, category: TagCategory) -> Result<TagVocabulary, ApiError> {
        self.get_json(&format!("/api/tags/{}", category.as_str()))
            .await
    }

    pub async fn preferences(&self) -> Result<UserPreferences, ApiError> {
        self.get_json("/api/preferences").await
    }

    pub async fn update_preferences(
        &self,
        preferences: &UserPreferences,
    ) -> Result<UserPreferences, ApiError> {
        self.send_json(Method::PUT, "/api/preferences", Some(preferences))
            .await
    }

    pub async fn trigger_crawl(&self) -> Result<CrawlTriggerResponse, ApiError> {
        self.send_json::<(), _>(Method::POST, "/api/crawl/trigger", None)
            .await
    }

    pub async fn crawl_status(&self) -> Result<CrawlStatusResponse, ApiError> {
        self.get_json("/api/crawl/status").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CacheStore;
    use crate::offline::{FetchError, Network, ProxyConfig};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const PARIS: Tz = chrono_tz::Europe::Paris;

    #[derive(Default)]
    struct ScriptedBackend {
        seen: Mutex<Vec<(Method, String, Option<Vec<u8>>)>>,
    }

    #[async_trait]
    impl Network for ScriptedBackend {
        async fn fetch(&self, request: &Request) -> Result<HttpResponse, FetchError> {
            self.seen.lock().unwrap().push((
                request.method.clone(),
                request.url.to_string(),
                request.body.clone(),
            ));
            let (status, body) = match (request.method.as_str(), request.url.path()) {
                ("GET", "/api/events/week") => (
                    200,
                    json!([
                        {"id": "ok", "title": "Concert", "date_start": "2025-03-14 20:00:00.000Z"},
                        {"id": "bad", "title": "Broken", "date_start": "soon"},
                        {"title": "No id"}
                    ]),
                ),
                ("GET", "/api/events") => (
                    200,
                    json!({"items": [{"id": "p1", "date_start": "2025-03-14 20:00:00.000Z"}],
                           "total": 41, "page": 2, "per_page": 1}),
                ),
                ("GET", "/api/dashboard/stats") => (
                    200,
                    json!({"total_events": 12, "total_sources": 3, "last_crawl": null,
                           "events_today": 2, "events_this_week": 7}),
                ),
                ("GET", "/api/tags/vibe") => (
                    200,
                    json!({"chill": "Détente", "festif": "Festif"}),
                ),
                ("PUT", "/api/preferences") => {
                    let body = request.body.clone().unwrap_or_default();
                    (200, serde_json::from_slice(&body).unwrap_or(Value::Null))
                }
                ("POST", "/api/crawl/trigger") => {
                    (200, json!({"message": "Crawl started", "job_id": "j1"}))
                }
                _ => (404, json!({"detail": "Not Found"})),
            };
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: serde_json::to_vec(&body).unwrap(),
            })
        }
    }

    fn client(backend: Arc<ScriptedBackend>) -> BackendClient {
        let cache = Arc::new(CacheStore::open_in_memory().unwrap());
        let mut proxy = OfflineCacheProxy::new(ProxyConfig::default(), backend, cache);
        proxy.install().unwrap();
        proxy.activate().unwrap();
        BackendClient::new("http://localhost:8000", Arc::new(proxy), PARIS).unwrap()
    }

    #[tokio::test]
    async fn window_listing_skips_malformed_records() {
        let client = client(Arc::new(ScriptedBackend::default()));
        let events = client.events_in(TimeWindow::Week).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "ok");
    }

    #[tokio::test]
    async fn query_parameters_are_encoded() {
        let backend = Arc::new(ScriptedBackend::default());
        let client = client(backend.clone());
        let query = EventQuery {
            page: Some(2),
            per_page: Some(1),
            city: Some("Nice".into()),
            search: Some("jazz club".into()),
            min_score: Some(0),
            ..Default::default()
        };
        let page = client.events(&query).await.unwrap();
        assert_eq!(page.total, 41);
        assert_eq!(page.items.len(), 1);

        let seen = backend.seen.lock().unwrap();
        let url = &seen[0].1;
        assert!(url.contains("page=2"));
        assert!(url.contains("city=Nice"));
        assert!(url.contains("search=jazz+club"));
        assert!(!url.contains("min_score"));
    }

    #[tokio::test]
    async fn status_errors_are_human_readable() {
        let client = client(Arc::new(ScriptedBackend::default()));
        let err = client.crawl_status().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"API error 404 on /api/crawl/status: {"detail":"Not Found"}"#
        );
    }

    #[tokio::test]
    async fn writes_send_json_bodies() {
        let backend = Arc::new(ScriptedBackend::default());
        let client = client(backend.clone());
        let prefs = UserPreferences {
            favorite_tags: vec!["concert".into()],
            max_budget: 50.0,
            ..Default::default()
        };
        assert_eq!(client.update_preferences(&prefs).await.unwrap(), prefs);
        let crawl = client.trigger_crawl().await.unwrap();
        assert_eq!(crawl.job_id.as_deref(), Some("j1"));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, Method::PUT);
        assert!(seen[0].2.is_some());
        assert_eq!(seen[1].0, Method::POST);
        assert!(seen[1].2.is_none());
    }

    #[tokio::test]
    async fn stats_pass_through() {
        let client = client(Arc::new(ScriptedBackend::default()));
        let stats = client.stats().await.unwrap();
        assert_eq!(stats.total_events, 12);
        assert_eq!(stats.last_crawl, None);
    }

    #[tokio::test]
    async fn tag_vocabulary_is_fetched_per_category() {
        let backend = Arc::new(ScriptedBackend::default());
        let client = client(backend.clone());
        let vibes = client.tags_for(TagCategory::Vibe).await.unwrap();
        assert_eq!(vibes.get("chill").map(String::as_str), Some("Détente"));
        assert_eq!(vibes.len(), 2);

        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].1.ends_with("/api/tags/vibe"));
    }
}
