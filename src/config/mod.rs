//! Configuration module for Policy-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use policy_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Retry budget per call: {}", config.request.max_retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlConfig, FilterMode, OutputConfig, ProxySettings, RequestConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, load_or_default, parse_config,
    to_toml_string,
};
pub use validation::validate;
