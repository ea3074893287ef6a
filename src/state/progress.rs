//! Progress ledger of a crawl run
//!
//! The coordinator is the only writer. Readers get whole snapshots, either
//! from the coordinator's watch channel or through a `ProgressObserver`.

use crate::state::CrawlState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// A record whose detail could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    pub id: String,
    pub title: String,
    pub reason: String,
}

/// Counters, timestamps and ledgers of one crawl run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Progress {
    pub state: CrawlState,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub current_id: String,
    pub current_title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed_ids: Vec<String>,
    pub failures: Vec<FailedRecord>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of the run and enters the listing phase
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.start_time = Some(now);
        self.state = CrawlState::Listing;
    }

    /// Fixes the number of records to crawl once listing is done
    pub fn begin_crawl(&mut self, total: usize) {
        debug_assert!(total >= self.total, "total must never decrease");
        self.total = total;
    }

    /// Records which policy is being processed
    pub fn set_current(&mut self, index: usize, id: &str, title: &str) {
        self.state = CrawlState::Crawling {
            index,
            total: self.total,
        };
        self.current_id = id.to_string();
        self.current_title = title.to_string();
    }

    pub fn record_success(&mut self, id: &str) {
        debug_assert!(self.processed() < self.total);
        self.completed += 1;
        self.completed_ids.push(id.to_string());
    }

    pub fn record_failure(&mut self, id: &str, title: &str, reason: impl Into<String>) {
        debug_assert!(self.processed() < self.total);
        self.failed += 1;
        self.failures.push(FailedRecord {
            id: id.to_string(),
            title: title.to_string(),
            reason: reason.into(),
        });
    }

    /// Freezes the counters in a terminal state
    pub fn finish(&mut self, state: CrawlState, now: DateTime<Utc>) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.end_time = Some(now);
    }

    /// Records that reached a final outcome, successful or not
    pub fn processed(&self) -> usize {
        self.completed + self.failed
    }

    /// Share of records with a final outcome, 0 when nothing was listed
    pub fn progress_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed() as f64 / self.total as f64 * 100.0
    }

    /// Share of listed records that completed, 0 when nothing was listed
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }

    /// Wall-clock time from start to end, or to now while running
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed_at(Utc::now())
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or(now);
        Some((end - start).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Receives a progress snapshot after every change
///
/// Called on the crawl worker. Implementations that drive a UI should hand
/// the snapshot over to their own context instead of touching UI state here.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_percentages_with_zero_total() {
        let progress = Progress::new();
        assert_eq!(progress.progress_percentage(), 0.0);
        assert_eq!(progress.success_rate(), 0.0);
    }

    #[test]
    fn test_percentages() {
        let mut progress = Progress::new();
        progress.begin_crawl(4);
        progress.record_success("a");
        progress.record_failure("b", "B", "fetch failed");
        assert_eq!(progress.processed(), 2);
        assert_eq!(progress.progress_percentage(), 50.0);
        assert_eq!(progress.success_rate(), 25.0);
        assert_eq!(progress.completed_ids, vec!["a"]);
        assert_eq!(progress.failures[0].reason, "fetch failed");
    }

    #[test]
    fn test_elapsed() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 30).unwrap();

        let mut progress = Progress::new();
        assert!(progress.elapsed_at(later).is_none());

        progress.start(start);
        assert_eq!(progress.elapsed_at(later), Some(Duration::from_secs(30)));

        progress.finish(CrawlState::Completed, start + chrono::Duration::seconds(10));
        assert_eq!(progress.elapsed_at(later), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_set_current_tracks_position() {
        let mut progress = Progress::new();
        progress.begin_crawl(3);
        progress.set_current(2, "id-2", "Second");
        assert_eq!(progress.state, CrawlState::Crawling { index: 2, total: 3 });
        assert_eq!(progress.current_title, "Second");
    }

    #[test]
    fn test_closure_observer() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let seen = AtomicUsize::new(0);
        let observer = |p: &Progress| {
            seen.store(p.total, Ordering::SeqCst);
        };
        let mut progress = Progress::new();
        progress.begin_crawl(7);
        observer.on_progress(&progress);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
