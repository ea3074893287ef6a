//! Pagination over one category's listing
//!
//! The pager requests pages 1, 2, 3, ... until one of these holds, checked
//! in order:
//! 1. a stop was requested
//! 2. the search failed after its retries
//! 3. the page came back empty
//! 4. the reported total is reached, or the page was short

use crate::crawler::api::{PolicyApi, SearchPage};
use crate::model::{Category, Policy};
use crate::state::StopHandle;
use std::time::Duration;

/// Drives repeated search calls for a category
#[derive(Debug, Clone)]
pub struct Pager {
    page_size: u32,
    request_delay: Duration,
    stop: StopHandle,
}

impl Pager {
    /// Creates a new pager
    ///
    /// # Arguments
    ///
    /// * `page_size` - Rows requested per page
    /// * `request_delay` - Pause between successful pages
    /// * `stop` - Cooperative stop flag, checked before every page
    pub fn new(page_size: u32, request_delay: Duration, stop: StopHandle) -> Self {
        Self {
            page_size: page_size.max(1),
            request_delay,
            stop,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches every policy of `category`
    ///
    /// Returns whatever was accumulated when pagination ends, including on
    /// stop or failure.
    pub async fn fetch_all<A>(&self, api: &mut A, category: Category) -> Vec<Policy>
    where
        A: PolicyApi + ?Sized,
    {
        let mut policies = Vec::new();
        let mut page = 1u32;

        tracing::info!(category = category.code(), "Listing {}", category.name());

        loop {
            if self.stop.is_stop_requested() {
                tracing::info!(
                    category = category.code(),
                    "Stop requested, ending listing with {} policies",
                    policies.len()
                );
                break;
            }

            let SearchPage { rows, total } = match api.search(category, page, self.page_size).await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        category = category.code(),
                        page,
                        error = %e,
                        "Search failed, ending listing"
                    );
                    break;
                }
            };

            if rows.is_empty() {
                break;
            }

            let page_len = rows.len();
            policies.extend(rows.iter().map(|row| Policy::from_row(row, category)));

            tracing::info!(
                category = category.code(),
                "Page {}: {} rows, {}/{} listed",
                page,
                page_len,
                policies.len(),
                total
            );

            if page_len < self.page_size as usize || policies.len() >= total {
                break;
            }

            page += 1;
            tokio::time::sleep(self.request_delay).await;
        }

        tracing::info!(
            category = category.code(),
            "Listed {} policies for {}",
            policies.len(),
            category.name()
        );
        policies
    }

    /// Fetches only the first page of `category`
    pub async fn first_page<A>(&self, api: &mut A, category: Category) -> Vec<Policy>
    where
        A: PolicyApi + ?Sized,
    {
        if self.stop.is_stop_requested() {
            return Vec::new();
        }

        match api.search(category, 1, self.page_size).await {
            Ok(page) => page
                .rows
                .iter()
                .map(|row| Policy::from_row(row, category))
                .collect(),
            Err(e) => {
                tracing::warn!(category = category.code(), error = %e, "Search failed");
                Vec::new()
            }
        }
    }
}
