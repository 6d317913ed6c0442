//! Pagination fetcher.
//!
//! Connectors expose each remote collection as a [`PageSource`]; a
//! [`Paginator`] walks it page by page. The walk is lazy (one request per
//! [`Paginator::next_page`] call), restartable (build a new paginator), and
//! finite:
//!
//! - an empty page always ends the walk
//! - `NextPage::Done` ends it
//! - `NextPage::Cursor` continues with the returned cursor
//! - `NextPage::Infer` continues while the running count is below the most
//!   recently reported total, or, with no total, while pages come back full
//!
//! A failed request never truncates silently: it surfaces as a
//! [`FetchError`] carrying how much was fetched before the failure.

use std::future::Future;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{ConnectorError, ConnectorErrorKind};

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Upper bound on pages per walk, guarding against servers that never
/// report an end.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Parameters for one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page number.
    pub index: usize,
    /// Requested page size.
    pub size: usize,
    /// Number of records fetched before this page.
    pub offset: usize,
    /// Continuation token from the previous page, for cursor APIs.
    pub cursor: Option<String>,
}

impl PageRequest {
    #[must_use]
    pub const fn first(size: usize) -> Self {
        Self {
            index: 0,
            size,
            offset: 0,
            cursor: None,
        }
    }

    /// One-based page number, for APIs that count from 1.
    #[must_use]
    pub const fn page_number(&self) -> usize {
        self.index + 1
    }

    fn advance(&self, fetched: usize, cursor: Option<String>) -> Self {
        Self {
            index: self.index + 1,
            size: self.size,
            offset: self.offset + fetched,
            cursor,
        }
    }
}

/// How a page says the walk continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// Continue with this continuation token.
    Cursor(String),
    /// No explicit signal: decide from page fill and reported total.
    Infer,
    /// Last page.
    Done,
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total record count reported by the server for this response.
    pub total: Option<usize>,
    pub next: NextPage,
}

impl<T> Page<T> {
    /// A page with no explicit continuation signal.
    #[must_use]
    pub const fn inferred(items: Vec<T>, total: Option<usize>) -> Self {
        Self {
            items,
            total,
            next: NextPage::Infer,
        }
    }

    /// A page from a cursor API; `None` marks the last page.
    #[must_use]
    pub fn with_cursor(items: Vec<T>, cursor: Option<String>) -> Self {
        Self {
            items,
            total: None,
            next: cursor.map_or(NextPage::Done, NextPage::Cursor),
        }
    }
}

/// A remote collection that can be fetched one page at a time.
pub trait PageSource: Sync {
    type Item: Send;

    /// Short name used in logs and errors ("jira issues", "bookstack pages").
    fn label(&self) -> &str;

    /// Fetch one page.
    fn fetch_page(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<Self::Item>, ConnectorError>> + Send;
}

/// Why a paginated walk stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FetchCause {
    /// A page request failed.
    Connector { kind: ConnectorErrorKind, message: String },
    /// The walk hit the page cap without reaching an end.
    PageLimit { max_pages: usize },
}

impl std::fmt::Display for FetchCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connector { kind, message } => write!(f, "{kind} error: {message}"),
            Self::PageLimit { max_pages } => write!(f, "exceeded {max_pages} pages without reaching the end"),
        }
    }
}

/// A paginated walk that could not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("fetching {collection} failed after {fetched} record(s) in {pages} page(s): {cause}")]
pub struct FetchError {
    pub collection: String,
    /// Records received before the failure.
    pub fetched: usize,
    /// Pages completed before the failure.
    pub pages: usize,
    pub cause: FetchCause,
}

impl FetchError {
    /// Connector failure kind, when the walk failed on a request.
    #[must_use]
    pub const fn connector_kind(&self) -> Option<ConnectorErrorKind> {
        match &self.cause {
            FetchCause::Connector { kind, .. } => Some(*kind),
            FetchCause::PageLimit { .. } => None,
        }
    }

    /// Build a fetch error for a failure outside the paginated walk
    /// (lookups a connector performs before listing).
    #[must_use]
    pub fn before_listing(collection: &str, err: ConnectorError) -> Self {
        Self {
            collection: collection.to_string(),
            fetched: 0,
            pages: 0,
            cause: FetchCause::Connector {
                kind: err.kind,
                message: err.message,
            },
        }
    }
}

/// Lazy page-by-page walk over a [`PageSource`].
pub struct Paginator<'a, S: PageSource> {
    source: &'a S,
    page_size: usize,
    max_pages: usize,
    next: Option<PageRequest>,
    fetched: usize,
    pages: usize,
    total: Option<usize>,
}

impl<'a, S: PageSource> Paginator<'a, S> {
    /// Start a walk at the first page.
    ///
    /// A zero page size is treated as 1.
    #[must_use]
    pub fn new(source: &'a S, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            source,
            page_size,
            max_pages: DEFAULT_MAX_PAGES,
            next: Some(PageRequest::first(page_size)),
            fetched: 0,
            pages: 0,
            total: None,
        }
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Records received so far.
    #[must_use]
    pub const fn fetched(&self) -> usize {
        self.fetched
    }

    /// Whether the walk has reached its end.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.next.is_none()
    }

    /// Fetch the next page. `Ok(None)` once the walk is finished.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the request fails or the page cap is hit.
    /// The walk is finished after an error.
    pub async fn next_page(&mut self) -> Result<Option<Vec<S::Item>>, FetchError> {
        let Some(request) = self.next.take() else {
            return Ok(None);
        };

        if self.pages >= self.max_pages {
            return Err(self.error(FetchCause::PageLimit {
                max_pages: self.max_pages,
            }));
        }

        trace!(collection = self.source.label(), page = request.index, "Fetching page");
        let page = self.source.fetch_page(&request).await.map_err(|e| {
            self.error(FetchCause::Connector {
                kind: e.kind,
                message: e.message,
            })
        })?;

        let count = page.items.len();
        self.pages += 1;
        self.fetched += count;
        if page.total.is_some() {
            self.total = page.total;
        }

        let continuation = if count == 0 {
            None
        } else {
            match page.next {
                NextPage::Done => None,
                NextPage::Cursor(cursor) => Some(Some(cursor)),
                NextPage::Infer => {
                    let more = match self.total {
                        Some(total) => self.fetched < total,
                        None => count >= self.page_size,
                    };
                    more.then_some(None)
                }
            }
        };
        self.next = continuation.map(|cursor| request.advance(count, cursor));

        debug!(
            collection = self.source.label(),
            page = request.index,
            count,
            fetched = self.fetched,
            total = ?self.total,
            "Fetched page"
        );

        Ok(Some(page.items))
    }

    /// Walk every remaining page and collect the records.
    ///
    /// # Errors
    ///
    /// Returns the first [`FetchError`]; partial results are discarded so a
    /// caller never mistakes a truncated collection for a complete one.
    pub async fn collect_all(mut self) -> Result<Vec<S::Item>, FetchError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    fn error(&self, cause: FetchCause) -> FetchError {
        FetchError {
            collection: self.source.label().to_string(),
            fetched: self.fetched,
            pages: self.pages,
            cause,
        }
    }
}

/// Fetch a whole collection with the default page size.
///
/// # Errors
///
/// See [`Paginator::collect_all`].
pub async fn fetch_all<S: PageSource>(source: &S, page_size: usize) -> Result<Vec<S::Item>, FetchError> {
    Paginator::new(source, page_size).collect_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted page source: returns the queued responses in order and
    /// records the requests it saw.
    struct Scripted {
        responses: Mutex<Vec<Result<Page<u32>, ConnectorError>>>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<Page<u32>, ConnectorError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl PageSource for Scripted {
        type Item = u32;

        fn label(&self) -> &str {
            "scripted"
        }

        async fn fetch_page(&self, request: &PageRequest) -> Result<Page<u32>, ConnectorError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Page::inferred(Vec::new(), None)))
        }
    }

    fn items(range: std::ops::Range<u32>) -> Vec<u32> {
        range.collect()
    }

    #[tokio::test]
    async fn test_short_page_ends_walk_without_total() {
        let source = Scripted::new(vec![
            Ok(Page::inferred(items(0..3), None)),
            Ok(Page::inferred(items(3..5), None)),
        ]);
        let all = fetch_all(&source, 3).await.unwrap();
        assert_eq!(all, items(0..5));
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_page_ends_walk() {
        let source = Scripted::new(vec![
            Ok(Page::inferred(items(0..2), None)),
            Ok(Page::inferred(Vec::new(), None)),
        ]);
        let all = fetch_all(&source, 2).await.unwrap();
        assert_eq!(all, items(0..2));
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_total_keeps_walking_past_short_pages() {
        // Server caps the page at 2 although 5 were requested.
        let source = Scripted::new(vec![
            Ok(Page::inferred(items(0..2), Some(5))),
            Ok(Page::inferred(items(2..4), Some(5))),
            Ok(Page::inferred(items(4..5), Some(5))),
        ]);
        let all = fetch_all(&source, 5).await.unwrap();
        assert_eq!(all, items(0..5));
        let requests = source.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].offset, 4);
        assert_eq!(requests[2].page_number(), 3);
    }

    #[tokio::test]
    async fn test_latest_total_wins() {
        // Total grows between pages; the running count is re-checked.
        let source = Scripted::new(vec![
            Ok(Page::inferred(items(0..2), Some(2))),
            Ok(Page::inferred(items(2..3), Some(3))),
        ]);
        let mut paginator = Paginator::new(&source, 2);
        let first = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        // Reported total reached: walk ends even though total later grows.
        assert!(paginator.is_done());

        let source = Scripted::new(vec![
            Ok(Page::inferred(items(0..2), Some(4))),
            Ok(Page::inferred(items(2..4), Some(6))),
            Ok(Page::inferred(items(4..6), Some(6))),
        ]);
        let all = fetch_all(&source, 2).await.unwrap();
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn test_cursor_pages() {
        let source = Scripted::new(vec![
            Ok(Page::with_cursor(items(0..2), Some("t1".into()))),
            Ok(Page::with_cursor(items(2..4), Some("t2".into()))),
            Ok(Page::with_cursor(items(4..5), None)),
        ]);
        let all = fetch_all(&source, 2).await.unwrap();
        assert_eq!(all, items(0..5));
        let requests = source.requests();
        assert_eq!(requests[0].cursor, None);
        assert_eq!(requests[1].cursor.as_deref(), Some("t1"));
        assert_eq!(requests[2].cursor.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_error_after_partial_fetch_reports_counts() {
        let source = Scripted::new(vec![
            Ok(Page::inferred(items(0..2), Some(6))),
            Ok(Page::inferred(items(2..4), Some(6))),
            Err(ConnectorError::transient("connection reset")),
        ]);
        let err = fetch_all(&source, 2).await.unwrap_err();
        assert_eq!(err.fetched, 4);
        assert_eq!(err.pages, 2);
        assert_eq!(err.connector_kind(), Some(ConnectorErrorKind::Transient));
        assert!(err.to_string().contains("after 4 record(s)"));
    }

    #[tokio::test]
    async fn test_page_cap() {
        let source = Scripted::new(vec![
            Ok(Page::with_cursor(items(0..1), Some("a".into()))),
            Ok(Page::with_cursor(items(1..2), Some("b".into()))),
            Ok(Page::with_cursor(items(2..3), Some("c".into()))),
        ]);
        let err = Paginator::new(&source, 1)
            .with_max_pages(2)
            .collect_all()
            .await
            .unwrap_err();
        assert_eq!(err.cause, FetchCause::PageLimit { max_pages: 2 });
        assert_eq!(err.fetched, 2);
    }

    #[tokio::test]
    async fn test_restartable() {
        let source = Scripted::new(vec![
            Ok(Page::inferred(items(0..1), None)),
            Ok(Page::inferred(items(0..1), None)),
        ]);
        let first = fetch_all(&source, 5).await.unwrap();
        let second = fetch_all(&source, 5).await.unwrap();
        assert_eq!(first, second);
        assert!(source.requests().iter().all(|r| r.index == 0));
    }
}
