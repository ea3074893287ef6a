//! HTTP transport holding one outbound identity
//!
//! This module handles:
//! - Building HTTP clients with a user agent drawn from a fixed pool
//! - Per-attempt proxy selection
//! - Rotating the identity after a configured number of operations
//! - Carrying the rolling continuation token between requests
//! - Error classification for reqwest failures

use crate::crawler::proxy::ProxyConfig;
use crate::ApiError;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Header carrying the continuation token
pub const TOKEN_HEADER: &str = "Q-Token";

/// Browser user agents an identity picks from
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Request body variants used by the API
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// One request to dispatch through the transport
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub payload: Payload,
    pub timeout: Duration,
    /// Attach the current continuation token
    pub with_token: bool,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            payload: Payload::None,
            timeout,
            with_token: false,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            payload: Payload::Json(body),
            timeout,
            with_token: true,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            payload: Payload::Form(form),
            timeout,
            with_token: false,
        }
    }
}

/// An HTTP identity: header set, user agent and the clients built from them
///
/// Not shared between runs; every piece of rolling state lives here.
pub struct Transport {
    site_origin: String,
    user_agent: String,
    client: Client,
    /// Client bound to the last proxy used, rebuilt when the proxy changes
    proxied: Mutex<Option<(ProxyConfig, Client)>>,
    continuation_token: Mutex<String>,
    request_count: u32,
    rotate_interval: u32,
    rotations: u32,
}

impl Transport {
    /// Creates a transport with a fresh identity
    ///
    /// # Arguments
    ///
    /// * `site_origin` - Origin sent as `Origin`/`Referer` (scheme and host of the API)
    /// * `rotate_interval` - Operations served before the identity is replaced
    pub fn new(site_origin: &str, rotate_interval: u32) -> Result<Self, reqwest::Error> {
        let user_agent = pick_user_agent();
        let client = build_http_client(site_origin, &user_agent, None)?;

        Ok(Self {
            site_origin: site_origin.to_string(),
            user_agent,
            client,
            proxied: Mutex::new(None),
            continuation_token: Mutex::new(String::new()),
            request_count: 0,
            rotate_interval: rotate_interval.max(1),
            rotations: 0,
        })
    }

    /// Pre-operation hook: counts the operation and rotates the identity when due
    ///
    /// Called once at the start of every logical operation, never while a
    /// request is in flight.
    pub fn begin_operation(&mut self) -> Result<(), reqwest::Error> {
        self.request_count += 1;
        if self.request_count >= self.rotate_interval {
            self.rotate()?;
        }
        Ok(())
    }

    /// Discards the current identity and builds a new one
    pub fn rotate(&mut self) -> Result<(), reqwest::Error> {
        let user_agent = pick_user_agent();
        self.client = build_http_client(&self.site_origin, &user_agent, None)?;
        self.user_agent = user_agent;
        self.request_count = 0;
        self.rotations += 1;
        if let Ok(mut proxied) = self.proxied.lock() {
            *proxied = None;
        }
        tracing::debug!(rotations = self.rotations, "Rotated transport identity");
        Ok(())
    }

    /// Dispatches one request, optionally through a proxy
    pub async fn execute(
        &self,
        request: ApiRequest,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Response, ApiError> {
        let client = self.client_for(proxy)?;

        let mut builder = client
            .request(request.method, &request.url)
            .timeout(request.timeout);

        if request.with_token {
            builder = builder.header(TOKEN_HEADER, self.continuation_token());
        }

        builder = match request.payload {
            Payload::None => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Form(form) => builder.form(&form),
        };

        builder.send().await.map_err(classify_reqwest_error)
    }

    /// Returns the token to echo on the next request
    pub fn continuation_token(&self) -> String {
        self.continuation_token
            .lock()
            .map(|token| token.clone())
            .unwrap_or_default()
    }

    /// Replaces the continuation token with the one from the latest response
    pub fn set_continuation_token(&self, token: &str) {
        if let Ok(mut current) = self.continuation_token.lock() {
            *current = token.to_string();
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Operations served by the current identity
    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    /// Number of identities discarded so far
    pub fn rotations(&self) -> u32 {
        self.rotations
    }

    fn client_for(&self, proxy: Option<&ProxyConfig>) -> Result<Client, ApiError> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };

        let mut proxied = self
            .proxied
            .lock()
            .map_err(|_| ApiError::TransientNetwork("proxy client cache poisoned".to_string()))?;

        if let Some((cached, client)) = proxied.as_ref() {
            if cached == proxy {
                return Ok(client.clone());
            }
        }

        let client = build_http_client(&self.site_origin, &self.user_agent, Some(proxy))
            .map_err(|e| ApiError::TransientNetwork(format!("invalid proxy {}: {}", proxy, e)))?;
        *proxied = Some((proxy.clone(), client.clone()));
        Ok(client)
    }
}

/// Picks a user agent from the pool
pub fn pick_user_agent() -> String {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

/// Builds an HTTP client presenting the given identity
///
/// # Arguments
///
/// * `site_origin` - Value for the `Origin` header; `Referer` is the origin with a trailing slash
/// * `user_agent` - User agent string for every request
/// * `proxy` - Optional outbound proxy for all schemes
pub fn build_http_client(
    site_origin: &str,
    user_agent: &str,
    proxy: Option<&ProxyConfig>,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    if let Ok(origin) = HeaderValue::from_str(site_origin) {
        headers.insert(ORIGIN, origin);
    }
    if let Ok(referer) = HeaderValue::from_str(&format!("{}/", site_origin)) {
        headers.insert(REFERER, referer);
    }

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.url())?);
    }

    builder.build()
}

/// Maps a reqwest failure onto the API error taxonomy
///
/// | Condition | Classification |
/// |-----------|----------------|
/// | Malformed or unparsable header/framing | `Protocol` |
/// | Body could not be decoded | `Malformed` |
/// | HTTP error status | `HttpStatus` |
/// | Timeout, connect, anything else | `TransientNetwork` |
pub fn classify_reqwest_error(error: reqwest::Error) -> ApiError {
    let chain = error_chain_text(&error);

    if is_header_quirk(&chain) {
        ApiError::Protocol(chain)
    } else if let Some(status) = error.status() {
        ApiError::HttpStatus(status.as_u16())
    } else if error.is_decode() {
        ApiError::Malformed(chain)
    } else if error.is_timeout() {
        ApiError::TransientNetwork(format!("request timeout: {}", chain))
    } else if error.is_connect() {
        ApiError::TransientNetwork(format!("connection failed: {}", chain))
    } else {
        ApiError::TransientNetwork(chain)
    }
}

/// Recognizes the non-standard header framing some servers send
pub fn is_header_quirk(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("invalid http header")
        || lower.contains("invalid header")
        || lower.contains("header parse")
        || lower.contains("missing boundary")
}

fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
