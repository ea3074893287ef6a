use crate::model::Category;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Policy-Crawler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub request: RequestConfig,
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
    pub download: FilterMode,
    pub proxy: ProxySettings,
}

/// Remote API endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,

    /// Timeout for search and detail calls (seconds)
    pub timeout_secs: u64,

    /// Timeout for attachment downloads (seconds)
    pub download_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.gdpc.gov.cn:443/bascdata".to_string(),
            timeout_secs: 30,
            download_timeout_secs: 60,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Request pacing, retry and identity rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RequestConfig {
    /// Delay between pages and between records (milliseconds)
    pub request_delay_ms: u64,

    /// Base backoff for transient failures, multiplied by the attempt number
    pub retry_delay_ms: u64,

    /// Attempts per logical operation
    pub max_retries: u32,

    /// Base backoff when the server reports rate limiting
    pub rate_limit_delay_ms: u64,

    /// Logical operations served by one identity before it is replaced
    pub session_rotate_interval: u32,

    /// Delay between consecutive attachment downloads of one record
    pub attachment_delay_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 2_000,
            retry_delay_ms: 5_000,
            max_retries: 3,
            rate_limit_delay_ms: 30_000,
            session_rotate_interval: 50,
            attachment_delay_ms: 300,
        }
    }
}

impl RequestConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn attachment_delay(&self) -> Duration {
        Duration::from_millis(self.attachment_delay_ms)
    }
}

/// What to crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Rows requested per search page
    pub page_size: u32,

    /// Categories to list, in crawl order
    pub categories: Vec<Category>,

    /// Keep only the first N records of each category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_records_per_category: Option<usize>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            categories: Category::ALL.to_vec(),
            max_records_per_category: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory for json/, files/ and markdown/
    pub output_dir: PathBuf,

    /// Write the structured detail of every record
    pub save_json: bool,

    /// Write the derived markdown document of every record
    pub save_markdown: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("crawled_data"),
            save_json: true,
            save_markdown: true,
        }
    }
}

/// Which attachments get downloaded
///
/// Downloading everything and picking individual extensions are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum FilterMode {
    /// Download every attachment regardless of type
    All,

    /// Download only the enabled extensions
    Selected {
        #[serde(default)]
        docx: bool,
        #[serde(default)]
        doc: bool,
        #[serde(default)]
        pdf: bool,
    },
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::Selected {
            docx: true,
            doc: true,
            pdf: false,
        }
    }
}

impl FilterMode {
    /// Returns true if an attachment with the given extension should be downloaded
    ///
    /// Matching is by substring, so `.DOCX` and `docx` are both accepted, and
    /// `doc` never matches a `docx` file.
    pub fn accepts(&self, file_ext: &str) -> bool {
        match *self {
            Self::All => true,
            Self::Selected { docx, doc, pdf } => {
                let ext = file_ext.to_lowercase();
                (docx && ext.contains("docx"))
                    || (doc && ext.contains("doc") && !ext.contains("docx"))
                    || (pdf && ext.contains("pdf"))
            }
        }
    }
}

/// Outbound proxy acquisition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxySettings {
    pub enabled: bool,

    /// Provider endpoint returning `host:port` entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_url: Option<String>,

    /// Credential sent to the provider as the `key` query parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}
