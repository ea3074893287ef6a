//! Output module for crawl results
//!
//! This module handles:
//! - Persisting policy details, rendered documents and the progress ledger
//! - Extracting text from downloaded attachments
//! - Printing run summaries

mod convert;
mod docx;
mod fs;
mod markdown;
pub mod stats;
mod traits;

pub use convert::{DocumentConverter, TextConverter};
pub use docx::DocxConverter;
pub use fs::FsPersistence;
pub use markdown::{render_document, source_url};
pub use stats::{format_summary, print_summary};
pub use traits::{is_storage_fatal, Converter, OutputError, OutputResult, Persistence};
