use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{CacheError, CacheKey, CacheStore};

pub const DEFAULT_CACHE_VERSION: &str = "nice-outside-v1";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("cannot {action} while {state:?}")]
    Lifecycle {
        action: &'static str,
        state: LifecycleState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, FetchError> {
        let bytes =
            serde_json::to_vec(body).map_err(|err| FetchError::InvalidRequest(err.to_string()))?;
        self.body = Some(bytes);
        Ok(self.with_header("content-type", "application/json"))
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.method.as_str(), &self.url)
    }
}

/// Whatever actually talks to the network.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<HttpResponse, FetchError>;
}

pub struct ReqwestNetwork {
    client: Client,
}

impl ReqwestNetwork {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("nice-outside/0.1")
            .build()
            .map_err(|err| FetchError::InvalidRequest(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &Request) -> Result<HttpResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::Unreachable(err.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Name of the only cache namespace that survives activation.
    pub version: String,
    /// Requests under this path always go to the network.
    pub api_prefix: String,
    /// When set, requests to other origins are not intercepted.
    pub origin: Option<Url>,
    pub fetch_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CACHE_VERSION.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            origin: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Live response, copied into the cache when successful.
    Network,
    /// Network failed; served from the versioned cache.
    Cache,
    /// Not intercepted: straight network round trip, cache untouched.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub response: HttpResponse,
    pub source: ResponseSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub clients_claimed: bool,
}

/// Network-first request interceptor with a versioned offline cache.
///
/// Lifecycle: `install` -> `activate` -> serve. Before activation completes
/// the proxy controls nothing and every request is a plain round trip.
pub struct OfflineCacheProxy {
    config: ProxyConfig,
    network: Arc<dyn Network>,
    cache: Arc<CacheStore>,
    state: LifecycleState,
    skip_waiting: bool,
    clients_claimed: bool,
}

impl OfflineCacheProxy {
    pub fn new(config: ProxyConfig, network: Arc<dyn Network>, cache: Arc<CacheStore>) -> Self {
        Self {
            config,
            network,
            cache,
            state: LifecycleState::Parsed,
            skip_waiting: false,
            clients_claimed: false,
        }
    }

    pub fn with_reqwest(config: ProxyConfig, cache: Arc<CacheStore>) -> Result<Self, ProxyError> {
        let network = ReqwestNetwork::new()?;
        Ok(Self::new(config, Arc::new(network), cache))
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Installs without waiting for a previous instance to drain.
    pub fn install(&mut self) -> Result<(), ProxyError> {
        if self.state != LifecycleState::Parsed {
            return Err(ProxyError::Lifecycle {
                action: "install",
                state: self.state,
            });
        }
        self.state = LifecycleState::Installing;
        self.skip_waiting = true;
        self.state = LifecycleState::Installed;
        info!(version = %self.config.version, "offline proxy installed");
        Ok(())
    }

    /// Drops every cache namespace except the current version, then claims
    /// already-open clients. Returns once cleanup has finished.
    pub fn activate(&mut self) -> Result<ActivationReport, ProxyError> {
        if self.state != LifecycleState::Installed || !self.skip_waiting {
            return Err(ProxyError::Lifecycle {
                action: "activate",
                state: self.state,
            });
        }
        self.state = LifecycleState::Activating;

        let deleted = match self.drop_stale_namespaces() {
            Ok(deleted) => deleted,
            Err(err) => {
                self.state = LifecycleState::Installed;
                return Err(err.into());
            }
        };

        self.clients_claimed = true;
        self.state = LifecycleState::Activated;
        info!(
            version = %self.config.version,
            deleted = deleted.len(),
            "offline proxy activated"
        );
        Ok(ActivationReport {
            deleted,
            clients_claimed: self.clients_claimed,
        })
    }

    fn drop_stale_namespaces(&self) -> Result<Vec<String>, CacheError> {
        let mut deleted = Vec::new();
        for name in self.cache.namespaces()? {
            if name == self.config.version {
                continue;
            }
            if self.cache.delete_namespace(&name)? {
                debug!(cache = %name, "deleted stale cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Whether an active proxy would intercept this request.
    pub fn intercepts(&self, request: &Request) -> bool {
        if request.method != Method::GET {
            return false;
        }
        if request.url.path().starts_with(&self.config.api_prefix) {
            return false;
        }
        match &self.config.origin {
            Some(origin) => origin.origin() == request.url.origin(),
            None => true,
        }
    }

    pub async fn fetch(&self, request: &Request) -> Result<ProxyResponse, ProxyError> {
        if self.state != LifecycleState::Activated || !self.intercepts(request) {
            let response = self.fetch_network(request).await?;
            return Ok(ProxyResponse {
                response,
                source: ResponseSource::Passthrough,
            });
        }

        let key = request.cache_key();
        match self.fetch_network(request).await {
            Ok(response) => {
                if response.is_success() {
                    if let Err(err) = self.cache.put(&self.config.version, &key, &response) {
                        warn!(url = %key.url, "failed to cache response: {err}");
                    }
                }
                Ok(ProxyResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(fetch_err) => {
                warn!(url = %key.url, "network failed, trying cache: {fetch_err}");
                match self.cache.lookup(&self.config.version, &key) {
                    Ok(Some(entry)) => {
                        debug!(url = %key.url, "served from cache");
                        Ok(ProxyResponse {
                            response: entry.response,
                            source: ResponseSource::Cache,
                        })
                    }
                    Ok(None) => {
                        debug!(url = %key.url, "cache miss");
                        Err(fetch_err.into())
                    }
                    Err(cache_err) => {
                        warn!(url = %key.url, "cache lookup failed: {cache_err}");
                        Err(fetch_err.into())
                    }
                }
            }
        }
    }

    async fn fetch_network(&self, request: &Request) -> Result<HttpResponse, FetchError> {
        let timeout = self.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.network.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}
