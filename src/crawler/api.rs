//! Remote policy API: search, detail and download operations
//!
//! `ApiClient` wires each operation through the transport's rotation hook,
//! the retry policy and the proxy source. The `PolicyApi` trait is the seam
//! the pager and coordinator are written against.

use crate::config::Config;
use crate::crawler::proxy::ProxySource;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::transport::{classify_reqwest_error, ApiRequest, Transport};
use crate::model::Category;
use crate::{ApiError, ApiResult, CrawlerError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Search endpoint, relative to the API base URL
pub const SEARCH_PATH: &str = "/nfrr/law-rule!noSession_es_regulation_search.gx";

/// Detail endpoint, relative to the API base URL
pub const DETAIL_PATH: &str = "/nfrr/law-rule!noSession_getById.gx";

/// Attachment download endpoint, relative to the API base URL
pub const DOWNLOAD_PATH: &str = "/downloadFile";

/// Business status code of a successful search
const SUCCESS_CODE: i64 = 200;

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Raw rows, mapped into policies by the pager
    pub rows: Vec<Value>,
    /// Total number of rows the server reports for the category
    pub total: usize,
}

/// Operations the crawler needs from the remote service
#[async_trait]
pub trait PolicyApi: Send {
    /// Fetches page `page` (1-based) of a category's listing
    async fn search(&mut self, category: Category, page: u32, page_size: u32)
        -> ApiResult<SearchPage>;

    /// Fetches the detail payload (`lawRule` and `list`) of one policy
    async fn detail(&mut self, policy_id: &str) -> ApiResult<Value>;

    /// Downloads a server-side file to `dest`, returning the byte count
    async fn download(&mut self, file_path: &str, dest: &Path) -> ApiResult<u64>;
}

/// HTTP implementation of [`PolicyApi`]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    download_timeout: Duration,
    transport: Transport,
    proxies: ProxySource,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Builds a client from the configuration
    pub fn new(config: &Config) -> Result<Self, CrawlerError> {
        let proxies = ProxySource::from_settings(&config.proxy)?;
        Self::with_proxy_source(config, proxies)
    }

    /// Builds a client using the given proxy source
    pub fn with_proxy_source(config: &Config, proxies: ProxySource) -> Result<Self, CrawlerError> {
        let base_url = config.api.base_url.trim_end_matches('/').to_string();
        let transport = Transport::new(
            &site_origin(&base_url),
            config.request.session_rotate_interval,
        )?;

        Ok(Self {
            base_url,
            timeout: config.api.timeout(),
            download_timeout: config.api.download_timeout(),
            transport,
            proxies,
            retry: RetryPolicy::from_config(&config.request),
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Full download URL for a server-side file path
    pub fn download_url(&self, file_path: &str) -> String {
        format!(
            "{}{}?fileFolder={}",
            self.base_url,
            DOWNLOAD_PATH,
            urlencoding::encode(&escape_file_path(file_path))
        )
    }

    fn begin_operation(&mut self) -> ApiResult<()> {
        self.transport
            .begin_operation()
            .map_err(|e| ApiError::TransientNetwork(format!("identity rotation failed: {}", e)))
    }
}

#[async_trait]
impl PolicyApi for ApiClient {
    async fn search(
        &mut self,
        category: Category,
        page: u32,
        page_size: u32,
    ) -> ApiResult<SearchPage> {
        self.begin_operation()?;

        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        let body = json!({
            "pageNum": page,
            "pageSize": page_size,
            "lawRuleType": category.code(),
            "orderByColumn": "passDate",
        });
        let timeout = self.timeout;
        let transport = &self.transport;

        self.retry
            .execute("search", &mut self.proxies, move |proxy| {
                let request = ApiRequest::post_json(url.clone(), body.clone(), timeout);
                async move {
                    let response = transport.execute(request, proxy.as_ref()).await?;
                    let result = read_json(response).await?;

                    // The server hands out the next token in `msg`
                    if let Some(token) = result.get("msg").and_then(Value::as_str) {
                        transport.set_continuation_token(token);
                    }

                    check_business_code(&result)?;
                    parse_search_page(&result)
                }
            })
            .await
    }

    async fn detail(&mut self, policy_id: &str) -> ApiResult<Value> {
        self.begin_operation()?;

        let url = format!("{}{}", self.base_url, DETAIL_PATH);
        let form = vec![("id".to_string(), policy_id.to_string())];
        let timeout = self.timeout;
        let transport = &self.transport;

        self.retry
            .execute("detail", &mut self.proxies, move |proxy| {
                let request = ApiRequest::post_form(url.clone(), form.clone(), timeout);
                async move {
                    let response = transport.execute(request, proxy.as_ref()).await?;
                    let result = read_json(response).await?;

                    if result.get("lawRule").is_some() || result.get("list").is_some() {
                        return Ok(result);
                    }
                    // Without a payload only a rate limit keeps its own class;
                    // any other code is retried like a malformed body
                    match check_business_code(&result) {
                        Err(ApiError::RateLimited(message)) => Err(ApiError::RateLimited(message)),
                        Err(ApiError::Rejected(message)) => Err(ApiError::Malformed(format!(
                            "detail response without lawRule or list: {}",
                            message
                        ))),
                        _ => Err(ApiError::Malformed(
                            "detail response has neither lawRule nor list".to_string(),
                        )),
                    }
                }
            })
            .await
    }

    async fn download(&mut self, file_path: &str, dest: &Path) -> ApiResult<u64> {
        self.begin_operation()?;

        let url = self.download_url(file_path);
        let timeout = self.download_timeout;
        let transport = &self.transport;

        self.retry
            .execute_download("download", &mut self.proxies, dest, move |proxy| {
                let request = ApiRequest::get(url.clone(), timeout);
                async move {
                    let response = transport.execute(request, proxy.as_ref()).await?;
                    stream_to_file(response, dest).await
                }
            })
            .await
    }
}

/// Replaces characters the download endpoint cannot take, before URL encoding
///
/// ASCII and full-width parentheses and square brackets are spelled out the
/// way the server expects them.
pub fn escape_file_path(file_path: &str) -> String {
    file_path
        .replace('(', "left")
        .replace(')', "right")
        .replace('（', "zLeft")
        .replace('）', "zRight")
        .replace('[', "lBracket")
        .replace(']', "rBracket")
}

/// Returns true if a server message signals rate limiting
pub fn is_rate_limit_message(message: &str) -> bool {
    message.contains("Too many requests") || message.to_lowercase().contains("rate limit")
}

/// Classifies the `code`/`msg` envelope of a response
///
/// A missing code or code 200 is success; rate-limit messages are retried;
/// anything else is a business rejection.
fn check_business_code(result: &Value) -> ApiResult<()> {
    let Some(code) = result.get("code") else {
        return Ok(());
    };
    let code = code
        .as_i64()
        .or_else(|| code.as_str().and_then(|s| s.trim().parse().ok()));
    if code == Some(SUCCESS_CODE) {
        return Ok(());
    }

    let message = result
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    if is_rate_limit_message(&message) {
        Err(ApiError::RateLimited(message))
    } else {
        Err(ApiError::Rejected(message))
    }
}

fn parse_search_page(result: &Value) -> ApiResult<SearchPage> {
    let data = match result.get("data") {
        Some(Value::Null) | None => return Ok(SearchPage::default()),
        Some(data) => data,
    };

    let rows = match data.get("rows") {
        Some(Value::Array(rows)) => rows.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(ApiError::Malformed("data.rows is not a list".to_string())),
    };

    let total = data
        .get("total")
        .and_then(|t| t.as_u64().or_else(|| t.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0) as usize;

    Ok(SearchPage { rows, total })
}

async fn read_json(response: reqwest::Response) -> ApiResult<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::HttpStatus(status.as_u16()));
    }
    let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Streams a response body into `dest`
///
/// A body that leaves nothing on disk is a failure even with a 2xx status.
async fn stream_to_file(mut response: reqwest::Response, dest: &Path) -> ApiResult<u64> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::HttpStatus(status.as_u16()));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    while let Some(chunk) = response.chunk().await.map_err(classify_reqwest_error)? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let written = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(ApiError::EmptyDownload);
    }
    Ok(written)
}

/// Scheme and authority of the API, used as Origin/Referer
fn site_origin(base_url: &str) -> String {
    Url::parse(base_url)
        .map(|url| url.origin().ascii_serialization())
        .unwrap_or_else(|_| base_url.to_string())
}
