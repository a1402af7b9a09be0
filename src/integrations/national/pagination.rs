//! Cursor walk over the national distribution feed.
//!
//! Pages are fetched strictly one after another: the cursor for a page is
//! the NSU of the previous page's last document. A page shorter than
//! [`PAGE_SIZE`] (including an empty one) is the last page.

use super::document::RawDocument;
use crate::error::Result;
use crate::models::{dedupe_by_access_key, InvoiceRecord};
use async_trait::async_trait;
use shared::Period;
use tracing::{debug, info, warn};

/// Documents per full page of the distribution protocol.
pub const PAGE_SIZE: usize = 50;

/// Cursor value that starts the feed from its first document.
pub const INITIAL_CURSOR: u64 = 0;

/// Anything that can serve distribution pages by cursor.
#[async_trait]
pub trait DistributionFeed: Send + Sync {
    async fn fetch_page(&self, interested_party: &str, cursor: u64) -> Result<Vec<RawDocument>>;
}

#[derive(Debug)]
enum PageState {
    Fetching { cursor: u64 },
    Filtering { cursor: u64, page: Vec<RawDocument> },
    Exhausted,
}

fn is_last_page(len: usize) -> bool {
    len < PAGE_SIZE
}

/// Walk the feed from the initial cursor until exhaustion, keeping the
/// invoices whose issue date falls inside `period`.
///
/// Records are filtered per page in delivery order; nothing is sorted.
/// Dropping the returned future stops any further page fetches.
pub async fn collect_period<F>(feed: &F, interested_party: &str, period: Period) -> Result<Vec<InvoiceRecord>>
where
    F: DistributionFeed + ?Sized,
{
    let mut records = Vec::new();
    let mut pages = 0usize;
    let mut state = PageState::Fetching {
        cursor: INITIAL_CURSOR,
    };

    loop {
        state = match state {
            PageState::Fetching { cursor } => {
                let page = feed.fetch_page(interested_party, cursor).await?;
                pages += 1;
                debug!("📄 Page {} at cursor {} returned {} documents", pages, cursor, page.len());
                if page.is_empty() {
                    PageState::Exhausted
                } else {
                    PageState::Filtering { cursor, page }
                }
            }
            PageState::Filtering { cursor, page } => {
                records.extend(filter_page(&page, &period));

                if is_last_page(page.len()) {
                    PageState::Exhausted
                } else {
                    match page.last().and_then(|document| document.nsu) {
                        Some(next) if next > cursor => PageState::Fetching { cursor: next },
                        other => {
                            warn!(
                                "⚠️ Distribution cursor did not advance past {} (last NSU {:?}); stopping",
                                cursor, other
                            );
                            PageState::Exhausted
                        }
                    }
                }
            }
            PageState::Exhausted => break,
        };
    }

    info!(
        "✅ Distribution feed exhausted after {} page(s), {} invoice(s) in period",
        pages,
        records.len()
    );
    Ok(dedupe_by_access_key(records))
}

fn filter_page(page: &[RawDocument], period: &Period) -> Vec<InvoiceRecord> {
    page.iter()
        .filter(|document| document.is_invoice())
        .filter_map(|document| match document.decode() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("⚠️ Skipping undecodable document {}: {}", document.access_key, e);
                None
            }
        })
        .filter(|record| record.issue_date.map(|date| period.contains(date)).unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::document::test_support::{encode, nfse_xml};
    use super::*;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedFeed {
        pages: Mutex<VecDeque<Vec<RawDocument>>>,
        cursors: Mutex<Vec<u64>>,
    }

    impl ScriptedFeed {
        fn new(pages: Vec<Vec<RawDocument>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                cursors: Mutex::new(Vec::new()),
            }
        }

        fn cursors(&self) -> Vec<u64> {
            self.cursors.lock().clone()
        }
    }

    #[async_trait]
    impl DistributionFeed for ScriptedFeed {
        async fn fetch_page(&self, _interested_party: &str, cursor: u64) -> Result<Vec<RawDocument>> {
            self.cursors.lock().push(cursor);
            Ok(self.pages.lock().pop_front().unwrap_or_default())
        }
    }

    fn document(nsu: u64, issued: &str) -> RawDocument {
        let key = format!("KEY{:05}", nsu);
        RawDocument {
            nsu: Some(nsu),
            access_key: key.clone(),
            document_type: "NFSE".to_string(),
            payload: encode(&nfse_xml(&key, &nsu.to_string(), issued, Some("10.00"), "98765432000155")),
            generated_at: None,
        }
    }

    fn full_page(first_nsu: u64, issued: &str) -> Vec<RawDocument> {
        (first_nsu..first_nsu + PAGE_SIZE as u64)
            .map(|nsu| document(nsu, issued))
            .collect()
    }

    fn january() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_short_first_page_stops_immediately() {
        let feed = ScriptedFeed::new(vec![vec![document(1, "2025-01-10"), document(2, "2025-01-11")]]);
        let records = collect_period(&feed, "12345678000199", january()).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(feed.cursors(), vec![INITIAL_CURSOR]);
    }

    #[tokio::test]
    async fn test_empty_first_page_stops_immediately() {
        let feed = ScriptedFeed::new(vec![]);
        let records = collect_period(&feed, "12345678000199", january()).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(feed.cursors(), vec![INITIAL_CURSOR]);
    }

    #[tokio::test]
    async fn test_cursor_advances_from_last_document() {
        let feed = ScriptedFeed::new(vec![
            full_page(1, "2025-01-05"),
            full_page(51, "2025-01-06"),
            vec![document(101, "2025-01-07")],
        ]);
        let records = collect_period(&feed, "12345678000199", january()).await.unwrap();

        assert_eq!(feed.cursors(), vec![0, 50, 100]);
        assert_eq!(records.len(), 2 * PAGE_SIZE + 1);
    }

    #[tokio::test]
    async fn test_full_page_followed_by_empty_page() {
        let feed = ScriptedFeed::new(vec![full_page(1, "2025-01-05"), vec![]]);
        let records = collect_period(&feed, "12345678000199", january()).await.unwrap();

        assert_eq!(feed.cursors(), vec![0, 50]);
        assert_eq!(records.len(), PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_out_of_period_documents_are_filtered_not_sorted() {
        let feed = ScriptedFeed::new(vec![vec![
            document(3, "2025-01-20"),
            document(1, "2024-12-31"),
            document(2, "2025-01-02"),
            document(4, "2025-02-01"),
        ]]);
        let records = collect_period(&feed, "12345678000199", january()).await.unwrap();

        let keys: Vec<_> = records.iter().map(|r| r.access_key.as_str()).collect();
        assert_eq!(keys, vec!["KEY00003", "KEY00002"]);
    }

    #[tokio::test]
    async fn test_stalled_cursor_terminates() {
        let mut stalled = full_page(1, "2025-01-05");
        for document in stalled.iter_mut() {
            document.nsu = Some(0);
        }
        let feed = ScriptedFeed::new(vec![stalled.clone(), stalled]);
        collect_period(&feed, "12345678000199", january()).await.unwrap();

        assert_eq!(feed.cursors(), vec![0]);
    }

    #[tokio::test]
    async fn test_undecodable_documents_are_skipped() {
        let mut broken = document(2, "2025-01-05");
        broken.payload = "%%%".to_string();
        let feed = ScriptedFeed::new(vec![vec![document(1, "2025-01-05"), broken]]);
        let records = collect_period(&feed, "12345678000199", january()).await.unwrap();

        assert_eq!(records.len(), 1);
    }
}
