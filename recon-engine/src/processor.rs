//! External payment processor client interface

use crate::models::{ExternalPaymentRecord, SessionWindow};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// One page of a cursor-based transaction listing
#[derive(Debug, Clone)]
pub struct TransactionPage {
    pub records: Vec<ExternalPaymentRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Processor API client
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// List transactions created in a window, one page per call
    async fn list_transactions(
        &self,
        window: &SessionWindow,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TransactionPage>;

    /// Client name for logs
    fn name(&self) -> &str;
}

/// Paginated fetch settings
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Page size per API call
    pub page_size: usize,
    /// Fixed delay between pages (processor rate limits)
    pub page_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: crate::DEFAULT_FETCH_PAGE_SIZE,
            page_delay_ms: crate::DEFAULT_FETCH_PAGE_DELAY_MS,
        }
    }
}

/// Drive the cursor loop until `has_more` clears, pausing between pages
pub async fn fetch_all_pages(
    client: &dyn ProcessorClient,
    window: &SessionWindow,
    config: &FetchConfig,
) -> Result<Vec<ExternalPaymentRecord>> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = client
            .list_transactions(window, cursor.as_deref(), config.page_size)
            .await?;

        debug!(
            processor = client.name(),
            page_records = page.records.len(),
            has_more = page.has_more,
            "fetched processor page"
        );

        records.extend(page.records);

        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;

        tokio::time::sleep(Duration::from_millis(config.page_delay_ms)).await;
    }

    Ok(records)
}
