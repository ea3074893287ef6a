//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: the phase a crawl run is in (listing, crawling, finished)
//! - `Progress`: counters and ledgers of one run, published as snapshots
//! - `StopHandle`: cooperative cancellation flag shared with observers

mod progress;
mod run_state;
mod stop;

// Re-export main types
pub use progress::{FailedRecord, Progress, ProgressObserver};
pub use run_state::CrawlState;
pub use stop::StopHandle;
