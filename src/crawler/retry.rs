//! Bounded retry with linear backoff and rate-limit escalation
//!
//! The policy knows nothing about what an operation does; it only looks at
//! how the operation failed.
//!
//! | Outcome | Action |
//! |---------|--------|
//! | Success | Return immediately |
//! | `Rejected` (business error) | Return immediately, never retried |
//! | `RateLimited` | Wait `rate_limit_delay * attempt`, retry |
//! | Network / status / malformed | Wait `retry_delay * attempt`, retry |
//! | Failure on the last attempt | Surface `Exhausted` |
//!
//! Every attempt after the first asks the proxy source for a fresh proxy.

use crate::config::RequestConfig;
use crate::crawler::proxy::{ProxyConfig, ProxySource};
use crate::{ApiError, ApiResult};
use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Retry settings for one logical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RequestConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RequestConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            rate_limit_delay: config.rate_limit_delay(),
        }
    }

    /// Backoff after a failed attempt (`attempt` is 0-based)
    pub fn backoff(&self, attempt: u32, error: &ApiError) -> Duration {
        let base = if error.is_rate_limited() {
            self.rate_limit_delay
        } else {
            self.retry_delay
        };
        base * (attempt + 1)
    }

    /// Runs `attempt_fn` until it succeeds, is rejected, or the budget is spent
    ///
    /// `attempt_fn` receives the proxy to use for this attempt (if any).
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        proxies: &mut ProxySource,
        attempt_fn: F,
    ) -> ApiResult<T>
    where
        F: FnMut(Option<ProxyConfig>) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.run(label, proxies, attempt_fn, |_| None).await
    }

    /// Download variant of [`RetryPolicy::execute`]
    ///
    /// Any file at `dest` is removed before each attempt. A header-parsing
    /// error is then not a failure when the attempt left a non-empty file:
    /// the body arrived, only the framing was odd. In that case the file size
    /// is returned and no retry happens.
    pub async fn execute_download<F, Fut>(
        &self,
        label: &str,
        proxies: &mut ProxySource,
        dest: &Path,
        mut attempt_fn: F,
    ) -> ApiResult<u64>
    where
        F: FnMut(Option<ProxyConfig>) -> Fut,
        Fut: Future<Output = ApiResult<u64>>,
    {
        let fresh_attempt = move |proxy: Option<ProxyConfig>| {
            let attempt = attempt_fn(proxy);
            async move {
                remove_leftover(dest).await?;
                attempt.await
            }
        };

        self.run(label, proxies, fresh_attempt, |error| {
            if !matches!(error, ApiError::Protocol(_)) {
                return None;
            }
            let size = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
            if size > 0 {
                tracing::debug!(
                    path = %dest.display(),
                    bytes = size,
                    "Ignoring header parsing error, file was fully written"
                );
                Some(size)
            } else {
                None
            }
        })
        .await
    }

    async fn run<T, F, Fut, R>(
        &self,
        label: &str,
        proxies: &mut ProxySource,
        mut attempt_fn: F,
        recover: R,
    ) -> ApiResult<T>
    where
        F: FnMut(Option<ProxyConfig>) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
        R: Fn(&ApiError) -> Option<T>,
    {
        let max_retries = self.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_retries {
            let proxy = proxies.acquire(attempt > 0).await;

            let error = match attempt_fn(proxy).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "{} succeeded after retry", label);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if let Some(value) = recover(&error) {
                return Ok(value);
            }

            if !error.is_retryable() && !error.is_rate_limited() {
                tracing::warn!(error = %error, "{} failed without retry", label);
                return Err(error);
            }

            if attempt + 1 >= max_retries {
                tracing::error!(
                    error = %error,
                    attempts = max_retries,
                    "{} failed after all retry attempts",
                    label
                );
                last_error = Some(error);
                break;
            }

            let delay = self.backoff(attempt, &error);
            if error.is_rate_limited() {
                tracing::warn!(
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "{} rate limited, backing off",
                    label
                );
            } else {
                tracing::warn!(
                    error = %error,
                    attempt = attempt + 1,
                    max_attempts = max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "{} failed, retrying",
                    label
                );
            }
            tokio::time::sleep(delay).await;
        }

        let last = last_error
            .unwrap_or_else(|| ApiError::TransientNetwork("no attempt was made".to_string()));
        Err(ApiError::Exhausted {
            attempts: max_retries,
            last: Box::new(last),
        })
    }
}

/// Deletes a file left by an earlier attempt or run
async fn remove_leftover(dest: &Path) -> ApiResult<()> {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => {
            tracing::debug!(path = %dest.display(), "Removed leftover download");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ApiError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::proxy::tests::CountingProvider;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_backoff_is_linear_and_escalates_for_rate_limits() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            rate_limit_delay: Duration::from_secs(30),
        };
        let transient = ApiError::TransientNetwork("reset".to_string());
        let limited = ApiError::RateLimited("Too many requests".to_string());

        assert_eq!(policy.backoff(0, &transient), Duration::from_secs(5));
        assert_eq!(policy.backoff(1, &transient), Duration::from_secs(10));
        assert_eq!(policy.backoff(0, &limited), Duration::from_secs(30));
        assert_eq!(policy.backoff(2, &limited), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let mut proxies = ProxySource::disabled();
        let result = fast_policy(3)
            .execute("op", &mut proxies, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ApiError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_is_never_retried() {
        let calls = AtomicU32::new(0);
        let mut proxies = ProxySource::disabled();
        let result: ApiResult<()> = fast_policy(3)
            .execute("op", &mut proxies, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::Rejected("no such record".to_string())) }
            })
            .await;
        assert!(matches!(result, Err(ApiError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_budget() {
        let calls = AtomicU32::new(0);
        let mut proxies = ProxySource::disabled();
        let result: ApiResult<()> = fast_policy(3)
            .execute("op", &mut proxies, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::TransientNetwork("timeout".to_string())) }
            })
            .await;
        match result {
            Err(ApiError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ApiError::TransientNetwork(_)));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_shares_the_budget() {
        let calls = AtomicU32::new(0);
        let mut proxies = ProxySource::disabled();
        let result = fast_policy(3)
            .execute("op", &mut proxies, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err(ApiError::RateLimited("Too many requests".to_string())),
                        1 => Err(ApiError::HttpStatus(502)),
                        _ => Ok("page"),
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limited_on_last_attempt_is_exhausted() {
        let mut proxies = ProxySource::disabled();
        let result: ApiResult<()> = fast_policy(2)
            .execute("op", &mut proxies, |_| async {
                Err(ApiError::RateLimited("rate limit".to_string()))
            })
            .await;
        assert!(matches!(result, Err(ApiError::Exhausted { attempts: 2, .. })));
    }

    #[tokio::test]
    async fn test_retries_force_new_proxy() {
        let provider = CountingProvider::new(false);
        let mut proxies = ProxySource::new(provider.clone());
        let seen = std::sync::Mutex::new(Vec::new());

        let _: ApiResult<()> = fast_policy(3)
            .execute("op", &mut proxies, |proxy| {
                seen.lock().unwrap().push(proxy);
                async { Err(ApiError::Malformed("bad json".to_string())) }
            })
            .await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].as_ref().map(|p| p.address()), Some("10.0.0.1:8080"));
        assert_eq!(seen[1].as_ref().map(|p| p.address()), Some("10.0.0.2:8080"));
        assert_eq!(seen[2].as_ref().map(|p| p.address()), Some("10.0.0.3:8080"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_proxy_failure_does_not_block_attempts() {
        let provider = CountingProvider::new(true);
        let mut proxies = ProxySource::new(provider);
        let result = fast_policy(2)
            .execute("op", &mut proxies, |proxy| async move {
                assert!(proxy.is_none());
                Ok::<_, ApiError>(())
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_download_tolerates_header_quirk_with_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("attachment.docx");
        let calls = Arc::new(AtomicU32::new(0));
        let mut proxies = ProxySource::disabled();

        let result = fast_policy(3)
            .execute_download("download", &mut proxies, &dest, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                let dest = dest.clone();
                async move {
                    std::fs::write(&dest, b"PK\x03\x04 body").map_err(ApiError::Io)?;
                    Err(ApiError::Protocol("invalid HTTP header parsed".to_string()))
                }
            })
            .await;

        assert_eq!(result.unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_header_quirk_without_file_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.docx");
        let calls = AtomicU32::new(0);
        let mut proxies = ProxySource::disabled();

        let result = fast_policy(2)
            .execute_download("download", &mut proxies, &dest, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::Protocol("invalid HTTP header parsed".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Exhausted { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_partial_file_from_failed_attempt_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.pdf");
        let calls = Arc::new(AtomicU32::new(0));
        let mut proxies = ProxySource::disabled();

        let result = fast_policy(2)
            .execute_download("download", &mut proxies, &dest, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let dest = dest.clone();
                async move {
                    if n == 0 {
                        std::fs::write(&dest, b"%PD").map_err(ApiError::Io)?;
                        return Err(ApiError::TransientNetwork("connection reset".to_string()));
                    }
                    Err(ApiError::Protocol("invalid HTTP header parsed".to_string()))
                }
            })
            .await;

        match result {
            Err(ApiError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, ApiError::Protocol(_)));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_file_from_previous_run_is_not_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("stale.docx");
        std::fs::write(&dest, b"old contents").unwrap();
        let mut proxies = ProxySource::disabled();

        let result = fast_policy(1)
            .execute_download("download", &mut proxies, &dest, |_| async {
                Err(ApiError::Protocol("invalid HTTP header parsed".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Exhausted { attempts: 1, .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_empty_download_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("empty.pdf");
        let calls = AtomicU32::new(0);
        let mut proxies = ProxySource::disabled();

        let result = fast_policy(3)
            .execute_download("download", &mut proxies, &dest, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::EmptyDownload) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::EmptyDownload)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
