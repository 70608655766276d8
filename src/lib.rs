pub mod api;
pub mod config;
pub mod db;
pub mod digest;
pub mod filters;
pub mod grouping;
pub mod models;
pub mod offline;
pub mod ranking;
pub mod season;
mod utils;

use std::sync::Arc;

use serde::Serialize;

pub use api::{ApiError, BackendClient, EventQuery, TimeWindow};
pub use config::{AppConfig, ConfigStore};
pub use db::CacheStore;
pub use digest::{AnimatedCounter, DigestCounts};
pub use filters::Filters;
pub use grouping::{EventGroup, LocalClock};
pub use models::{DashboardDigest, DashboardStats, Event, Price, TagCatalog, TagCategory};
pub use offline::{Network, OfflineCacheProxy, ProxyResponse, ResponseSource};
pub use ranking::CapPolicy;
pub use season::{SeasonPartition, TimelessActivity};

/// How a listing is bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
}

/// A filtered, bucketed listing plus the counts shown above it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedView {
    /// Counts over the whole window, before filtering.
    pub counts: DigestCounts,
    pub matched: usize,
    pub groups: Vec<EventGroup>,
}

/// Filters `events`, then buckets what is left.
pub fn build_grouped_view(
    events: &[Event],
    filters: &Filters,
    clock: &LocalClock,
    granularity: Granularity,
) -> GroupedView {
    let counts = DigestCounts::from_events(events);
    let filtered = filters::apply(events, filters);
    let groups = match granularity {
        Granularity::Day => grouping::group_by_day(&filtered, clock),
        Granularity::Week => grouping::group_by_week(&filtered, clock),
    };
    GroupedView {
        counts,
        matched: filtered.len(),
        groups,
    }
}

/// Everything the views need: resolved config and an activated proxy.
pub struct AppContext {
    pub config: AppConfig,
    pub client: BackendClient,
}

impl AppContext {
    /// Installs and activates a reqwest-backed offline proxy over `cache`,
    /// then builds the backend client on top of it.
    pub fn bootstrap(config: AppConfig, cache: Arc<CacheStore>) -> Result<Self, String> {
        let proxy_config = config.proxy_config().map_err(|e| e.to_string())?;
        let proxy =
            OfflineCacheProxy::with_reqwest(proxy_config, cache).map_err(|e| e.to_string())?;
        Self::from_proxy(config, proxy)
    }

    pub fn with_network(
        config: AppConfig,
        network: Arc<dyn Network>,
        cache: Arc<CacheStore>,
    ) -> Result<Self, String> {
        let proxy_config = config.proxy_config().map_err(|e| e.to_string())?;
        Self::from_proxy(config, OfflineCacheProxy::new(proxy_config, network, cache))
    }

    fn from_proxy(config: AppConfig, mut proxy: OfflineCacheProxy) -> Result<Self, String> {
        let tz = config.tz().map_err(|e| e.to_string())?;
        proxy.install().map_err(|e| e.to_string())?;
        proxy.activate().map_err(|e| e.to_string())?;

        let client = BackendClient::new(&config.api_base_url, Arc::new(proxy), tz)
            .map_err(|e| e.to_string())?;
        Ok(Self { config, client })
    }

    pub fn clock(&self) -> LocalClock {
        LocalClock::system(self.client.timezone())
    }

    pub fn counter(&self) -> AnimatedCounter {
        AnimatedCounter::new(
            self.config.animation_duration(),
            self.config.animation_frame(),
        )
    }
}

async fn window_view(
    ctx: &AppContext,
    window: TimeWindow,
    filters: &Filters,
    clock: &LocalClock,
    granularity: Granularity,
) -> Result<GroupedView, String> {
    let events = ctx
        .client
        .events_in(window)
        .await
        .map_err(|e| e.to_string())?;
    Ok(build_grouped_view(&events, filters, clock, granularity))
}

pub async fn today_view(
    ctx: &AppContext,
    filters: &Filters,
    clock: &LocalClock,
) -> Result<GroupedView, String> {
    window_view(ctx, TimeWindow::Today, filters, clock, Granularity::Day).await
}

pub async fn week_view(
    ctx: &AppContext,
    filters: &Filters,
    clock: &LocalClock,
) -> Result<GroupedView, String> {
    window_view(ctx, TimeWindow::Week, filters, clock, Granularity::Day).await
}

pub async fn weekend_view(
    ctx: &AppContext,
    filters: &Filters,
    clock: &LocalClock,
) -> Result<GroupedView, String> {
    window_view(ctx, TimeWindow::Weekend, filters, clock, Granularity::Day).await
}

pub async fn month_view(
    ctx: &AppContext,
    filters: &Filters,
    clock: &LocalClock,
) -> Result<GroupedView, String> {
    window_view(ctx, TimeWindow::Month, filters, clock, Granularity::Week).await
}

/// Featured events, at most one match and two of any other type.
pub async fn featured_view(ctx: &AppContext) -> Result<Vec<Event>, String> {
    let events = ctx
        .client
        .events_in(TimeWindow::Featured)
        .await
        .map_err(|e| e.to_string())?;
    Ok(ranking::diversify(&events, &CapPolicy::featured()))
}

pub async fn upcoming_view(ctx: &AppContext, filters: &Filters) -> Result<Vec<Event>, String> {
    let events = ctx
        .client
        .events_in(TimeWindow::Upcoming)
        .await
        .map_err(|e| e.to_string())?;
    let filtered = filters::apply(&events, filters);
    Ok(ranking::diversify(&filtered, &CapPolicy::upcoming()))
}

pub fn season_view(clock: &LocalClock) -> SeasonPartition {
    season::partition_by_current_season(&season::default_catalog(), clock)
}

pub async fn digest_view(ctx: &AppContext) -> Result<DashboardDigest, String> {
    ctx.client.digest().await.map_err(|e| e.to_string())
}

pub async fn stats_view(ctx: &AppContext) -> Result<DashboardStats, String> {
    ctx.client.stats().await.map_err(|e| e.to_string())
}

/// Tag vocabulary of one category, or the whole catalog when `category` is
/// `None`.
pub async fn tags_view(ctx: &AppContext, category: Option<&str>) -> Result<TagCatalog, String> {
    let Some(raw) = category else {
        return ctx.client.tags().await.map_err(|e| e.to_string());
    };
    let category =
        TagCategory::parse(raw).ok_or_else(|| format!("unknown tag category: {raw}"))?;
    let vocabulary = ctx
        .client
        .tags_for(category)
        .await
        .map_err(|e| e.to_string())?;
    Ok(TagCatalog::from([(category.as_str().to_string(), vocabulary)]))
}
