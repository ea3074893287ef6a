use crate::config::types::{
    ApiConfig, Config, CrawlConfig, FilterMode, OutputConfig, ProxySettings, RequestConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_request_config(&config.request)?;
    validate_crawl_config(&config.crawl)?;
    validate_output_config(&config.output)?;
    validate_filter_mode(&config.download)?;
    validate_proxy_settings(&config.proxy)?;
    Ok(())
}

/// Validates API endpoint configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.timeout_secs == 0 || config.download_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeouts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry and pacing configuration
fn validate_request_config(config: &RequestConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.session_rotate_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "session-rotate-interval must be >= 1, got {}",
            config.session_rotate_interval
        )));
    }

    Ok(())
}

/// Validates crawl scope
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one category must be configured".to_string(),
        ));
    }

    if config.max_records_per_category == Some(0) {
        return Err(ConfigError::Validation(
            "max-records-per-category must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// A selected filter with nothing selected would silently skip every attachment
fn validate_filter_mode(mode: &FilterMode) -> Result<(), ConfigError> {
    if let FilterMode::Selected {
        docx: false,
        doc: false,
        pdf: false,
    } = mode
    {
        return Err(ConfigError::Validation(
            "download mode 'selected' needs at least one of docx, doc, pdf".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy settings
fn validate_proxy_settings(settings: &ProxySettings) -> Result<(), ConfigError> {
    if !settings.enabled {
        return Ok(());
    }

    let provider = settings.provider_url.as_deref().unwrap_or("");
    if provider.is_empty() {
        return Err(ConfigError::Validation(
            "proxy is enabled but provider-url is not set".to_string(),
        ));
    }

    Url::parse(provider)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid provider-url: {}", e)))?;

    Ok(())
}
