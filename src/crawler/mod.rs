//! Crawler module for the remote policy service
//!
//! This module contains the core crawling logic, including:
//! - HTTP transport with identity rotation and a continuation token
//! - Retry with linear backoff and optional proxy rotation
//! - Search, detail and download operations
//! - Pagination and overall crawl coordination

mod api;
mod coordinator;
mod pager;
mod proxy;
mod retry;
mod transport;

pub use api::{
    escape_file_path, ApiClient, PolicyApi, SearchPage, DETAIL_PATH, DOWNLOAD_PATH, SEARCH_PATH,
};
pub use coordinator::{run_crawl, Coordinator};
pub use pager::Pager;
pub use proxy::{HttpProxyProvider, ProxyConfig, ProxyProvider, ProxySource};
pub use retry::RetryPolicy;
pub use transport::{ApiRequest, Transport, TOKEN_HEADER, USER_AGENTS};

use crate::config::Config;
use crate::state::Progress;
use crate::CrawlerError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the API client and output layout
/// 2. List every configured category
/// 3. Fetch, download and persist each listed policy
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Progress)` - Final progress of the run
/// * `Err(CrawlerError)` - Crawl could not start, or local storage failed
pub async fn crawl(config: Config) -> Result<Progress, CrawlerError> {
    run_crawl(config).await
}
