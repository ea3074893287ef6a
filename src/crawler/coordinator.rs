//! Crawl coordinator - main crawl orchestration logic
//!
//! A run has two phases:
//! - Listing: every configured category is paginated into one ordered list
//! - Crawling: each listed policy gets its detail fetched, its matching
//!   attachments downloaded and converted, and its output persisted
//!
//! The coordinator owns the only mutable `Progress`. After every change it
//! replaces the snapshot in a watch channel and notifies the registered
//! observers. Failures are contained per record; only a storage failure that
//! leaves the output directory unusable aborts the run.

use crate::config::Config;
use crate::crawler::api::{ApiClient, PolicyApi};
use crate::crawler::pager::Pager;
use crate::model::{Category, Policy, PolicyDetail};
use crate::output::{Converter, DocumentConverter, FsPersistence, Persistence};
use crate::state::{CrawlState, Progress, ProgressObserver, StopHandle};
use crate::{CrawlerError, RecordError};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    api: Box<dyn PolicyApi>,
    persistence: Arc<dyn Persistence>,
    converter: Arc<dyn Converter>,
    pager: Pager,
    stop: StopHandle,
    progress: Progress,
    progress_tx: watch::Sender<Progress>,
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl Coordinator {
    /// Creates a coordinator talking to the configured API
    ///
    /// Output goes to the configured directory; attachments are converted
    /// with [`DocumentConverter`].
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlerError)` - The HTTP client or proxy provider could not be built
    pub fn new(config: Config) -> Result<Self, CrawlerError> {
        let api = ApiClient::new(&config)?;
        let persistence = FsPersistence::from_config(&config);
        Ok(Self::with_parts(
            config,
            Box::new(api),
            Arc::new(persistence),
            Arc::new(DocumentConverter::new()),
        ))
    }

    /// Creates a coordinator from explicit collaborators
    pub fn with_parts(
        config: Config,
        api: Box<dyn PolicyApi>,
        persistence: Arc<dyn Persistence>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        let stop = StopHandle::new();
        let pager = Pager::new(
            config.crawl.page_size,
            config.request.request_delay(),
            stop.clone(),
        );
        let (progress_tx, _) = watch::channel(Progress::new());

        Self {
            config: Arc::new(config),
            api,
            persistence,
            converter,
            pager,
            stop,
            progress: Progress::new(),
            progress_tx,
            observers: Vec::new(),
        }
    }

    /// Handle for requesting a cooperative stop from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Receiver of progress snapshots
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    /// Registers an observer called after every progress change
    pub fn add_observer(&mut self, observer: Arc<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Crawls every configured category
    pub async fn run(&mut self) -> Result<Progress, CrawlerError> {
        let categories = self.config.crawl.categories.clone();
        self.run_categories(&categories).await
    }

    /// Crawls the given categories, in order
    ///
    /// Returns the final progress. A run ends `Completed` when every listed
    /// policy was processed, `Stopped` when a stop was requested first, and
    /// with `Err(CrawlerError::Storage)` (state `Aborted`) when the output
    /// directory became unusable.
    pub async fn run_categories(
        &mut self,
        categories: &[Category],
    ) -> Result<Progress, CrawlerError> {
        self.begin_run()?;

        let mut policies = Vec::new();
        for &category in categories {
            if self.stop.is_stop_requested() {
                break;
            }
            let mut listed = self.pager.fetch_all(self.api.as_mut(), category).await;
            if let Some(max) = self.config.crawl.max_records_per_category {
                listed.truncate(max);
            }
            policies.extend(listed);
        }

        if self.stop.is_stop_requested() {
            return Ok(self.stop_during_listing());
        }
        self.crawl_policies(policies).await
    }

    /// Crawls only the first policy of the first page of `category`
    pub async fn run_single(&mut self, category: Category) -> Result<Progress, CrawlerError> {
        self.begin_run()?;

        let policies = self
            .pager
            .first_page(self.api.as_mut(), category)
            .await
            .into_iter()
            .take(1)
            .collect();

        if self.stop.is_stop_requested() {
            return Ok(self.stop_during_listing());
        }
        self.crawl_policies(policies).await
    }

    /// Starts a fresh run
    ///
    /// A stop requested during the previous run is cleared once that run has
    /// finished; a stop requested before the first run still applies.
    fn begin_run(&mut self) -> Result<(), CrawlerError> {
        if self.progress.state.is_terminal() {
            self.stop.reset();
        }
        self.progress = Progress::new();
        self.progress.start(Utc::now());
        self.publish();

        tracing::info!(
            output_dir = %self.config.output.output_dir.display(),
            "Starting crawl run"
        );

        if let Err(e) = self.persistence.prepare() {
            return Err(self.abort(RecordError::PersistenceFailed(e).into()));
        }
        Ok(())
    }

    /// Ends a run stopped before any policy was crawled
    fn stop_during_listing(&mut self) -> Progress {
        tracing::info!("Stop requested during listing, nothing crawled");
        self.finish(CrawlState::Stopped);
        self.progress.clone()
    }

    async fn crawl_policies(&mut self, policies: Vec<Policy>) -> Result<Progress, CrawlerError> {
        self.progress.begin_crawl(policies.len());
        self.publish();
        tracing::info!("Crawling {} policies", policies.len());

        let total = policies.len();
        let mut stopped = false;
        for (index, policy) in policies.iter().enumerate() {
            if self.stop.is_stop_requested() {
                stopped = true;
                break;
            }

            self.progress.set_current(index + 1, &policy.id, &policy.title);
            self.publish();
            tracing::info!(policy_id = %policy.id, "[{}/{}] {}", index + 1, total, policy.title);

            match self.process_policy(policy).await {
                Ok(()) => self.progress.record_success(&policy.id),
                Err(e) if e.is_fatal() => {
                    tracing::error!(policy_id = %policy.id, error = %e, "Storage failure, aborting run");
                    return Err(self.abort(e.into()));
                }
                Err(e) => {
                    tracing::warn!(policy_id = %policy.id, error = %e, "Policy failed");
                    self.progress.record_failure(&policy.id, &policy.title, e.reason());
                }
            }
            self.publish();

            if index + 1 < total && !self.stop.is_stop_requested() {
                tokio::time::sleep(self.config.request.request_delay()).await;
            }
        }

        self.finish(if stopped {
            CrawlState::Stopped
        } else {
            CrawlState::Completed
        });

        tracing::info!(
            completed = self.progress.completed,
            failed = self.progress.failed,
            total = self.progress.total,
            "Crawl {}",
            self.progress.state
        );
        Ok(self.progress.clone())
    }

    /// Processes one policy
    ///
    /// Only a failed detail fetch or a fatal storage error is returned; every
    /// other problem is logged and the policy still counts as completed.
    async fn process_policy(&mut self, policy: &Policy) -> Result<(), RecordError> {
        let payload = self
            .api
            .detail(&policy.id)
            .await
            .map_err(RecordError::DetailFetchFailed)?;
        let detail = PolicyDetail::from_payload(policy.clone(), &payload);

        if let Err(e) = self.persistence.save_detail(&detail) {
            absorb(&policy.id, RecordError::PersistenceFailed(e))?;
        }

        let content = self.download_and_convert(&detail).await?;

        if let Err(e) = self.persistence.save_document(&detail, content.as_deref()) {
            absorb(&policy.id, RecordError::PersistenceFailed(e))?;
        }
        Ok(())
    }

    /// Downloads and converts the attachments accepted by the filter
    ///
    /// Returns the converted texts joined under one heading per file, or
    /// `None` when nothing could be extracted.
    async fn download_and_convert(
        &mut self,
        detail: &PolicyDetail,
    ) -> Result<Option<String>, RecordError> {
        let policy_id = &detail.policy.id;
        let selected: Vec<_> = detail
            .attachments
            .iter()
            .filter(|a| self.config.download.accepts(&a.extension()))
            .collect();

        if selected.is_empty() {
            tracing::debug!(
                policy_id = %policy_id,
                attachments = detail.attachments.len(),
                "No attachments matched the download filter"
            );
            return Ok(None);
        }

        let mut parts = Vec::new();
        for (i, attachment) in selected.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.request.attachment_delay()).await;
            }

            let dest = self.persistence.attachment_path(&detail.policy, attachment);
            match self.api.download(&attachment.file_path, &dest).await {
                Ok(bytes) => {
                    tracing::debug!(policy_id = %policy_id, file = %attachment.file_name, bytes, "Downloaded");
                }
                Err(source) => {
                    absorb(
                        policy_id,
                        RecordError::DownloadFailed {
                            file: dest.display().to_string(),
                            source,
                        },
                    )?;
                    continue;
                }
            }

            match self.converter.convert(&dest) {
                Ok(text) if !text.trim().is_empty() => {
                    parts.push(format!("## {}\n\n{}", attachment.file_name, text.trim()));
                }
                Ok(_) => {
                    tracing::debug!(policy_id = %policy_id, file = %attachment.file_name, "No text extracted");
                }
                Err(source) => absorb(
                    policy_id,
                    RecordError::ConversionFailed {
                        file: attachment.file_name.clone(),
                        source,
                    },
                )?,
            }
        }

        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        })
    }

    /// Ends the run as `Aborted` and returns the error to surface
    fn abort(&mut self, error: CrawlerError) -> CrawlerError {
        self.finish(CrawlState::Aborted);
        error
    }

    fn finish(&mut self, state: CrawlState) {
        self.progress.finish(state, Utc::now());
        self.publish();

        match self.persistence.save_progress(&self.progress) {
            Ok(path) => tracing::debug!(path = %path.display(), "Saved progress"),
            Err(e) => tracing::warn!(error = %e, "Failed to save progress"),
        }
    }

    fn publish(&self) {
        self.progress_tx.send_replace(self.progress.clone());
        for observer in &self.observers {
            observer.on_progress(&self.progress);
        }
    }
}

/// Logs a non-fatal record error; fatal ones are handed back
fn absorb(policy_id: &str, error: RecordError) -> Result<(), RecordError> {
    if error.is_fatal() {
        return Err(error);
    }
    tracing::warn!(policy_id = %policy_id, error = %error, "Continuing without this output");
    Ok(())
}

/// Runs a complete crawl with the given configuration
///
/// # Returns
///
/// * `Ok(Progress)` - Final progress of the run
/// * `Err(CrawlerError)` - The run could not start, or storage failed
pub async fn run_crawl(config: Config) -> Result<Progress, CrawlerError> {
    let mut coordinator = Coordinator::new(config)?;
    coordinator.run().await
}
