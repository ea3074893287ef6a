//! Outbound proxy acquisition
//!
//! A `ProxySource` hands out the cached proxy until a caller forces a new
//! one. Failing to get a proxy is never fatal: callers simply go direct.

use crate::config::ProxySettings;
use crate::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One proxy endpoint, `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    address: String,
}

impl ProxyConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Proxy URL used for both http and https traffic
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Upstream supplier of proxy endpoints
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    async fn fetch(&self) -> Result<ProxyConfig, ApiError>;
}

/// Provider backed by an HTTP endpoint
///
/// The endpoint may answer with plain text (one `host:port` per line) or a
/// JSON array of strings, optionally wrapped as `{"data": {"proxy_list": [...]}}`.
pub struct HttpProxyProvider {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpProxyProvider {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(12))
            .connect_timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ProxyProvider for HttpProxyProvider {
    async fn fetch(&self) -> Result<ProxyConfig, ApiError> {
        let mut request = self.client.get(&self.url).query(&[("num", "1")]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ApiError::TransientNetwork(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::TransientNetwork(e.to_string()))?;

        parse_proxy_list(&body)
            .into_iter()
            .next()
            .map(ProxyConfig::new)
            .ok_or_else(|| ApiError::Malformed("provider returned no proxies".to_string()))
    }
}

/// Extracts proxy addresses from a provider response
pub fn parse_proxy_list(body: &str) -> Vec<String> {
    let trimmed = body.trim();

    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        let list = json
            .pointer("/data/proxy_list")
            .or_else(|| json.get("proxies"))
            .unwrap_or(&json);
        if let Some(items) = list.as_array() {
            return items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        return Vec::new();
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains(':'))
        .map(str::to_string)
        .collect()
}

/// Hands out proxies, caching the last one acquired
pub struct ProxySource {
    provider: Option<Arc<dyn ProxyProvider>>,
    current: Option<ProxyConfig>,
}

impl ProxySource {
    /// A source that never returns a proxy
    pub fn disabled() -> Self {
        Self {
            provider: None,
            current: None,
        }
    }

    pub fn new(provider: Arc<dyn ProxyProvider>) -> Self {
        Self {
            provider: Some(provider),
            current: None,
        }
    }

    /// Builds the source described by the configuration
    pub fn from_settings(settings: &ProxySettings) -> Result<Self, reqwest::Error> {
        match (&settings.provider_url, settings.enabled) {
            (Some(url), true) => {
                let provider = HttpProxyProvider::new(url.clone(), settings.api_key.clone())?;
                tracing::info!("Proxy rotation enabled via {}", url);
                Ok(Self::new(Arc::new(provider)))
            }
            _ => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Returns the proxy to use for the next attempt
    ///
    /// The cached proxy is reused unless `force_new` is set or none is cached.
    /// On provider failure the cache is cleared and `None` is returned.
    pub async fn acquire(&mut self, force_new: bool) -> Option<ProxyConfig> {
        let provider = self.provider.as_ref()?;

        if force_new || self.current.is_none() {
            match provider.fetch().await {
                Ok(proxy) => {
                    tracing::info!(proxy = %proxy, "Acquired new proxy");
                    self.current = Some(proxy);
                }
                Err(e) => {
                    if force_new {
                        tracing::warn!(error = %e, "Failed to acquire proxy, continuing without one");
                    }
                    self.current = None;
                }
            }
        }

        self.current.clone()
    }

    pub fn current(&self) -> Option<&ProxyConfig> {
        self.current.as_ref()
    }
}
