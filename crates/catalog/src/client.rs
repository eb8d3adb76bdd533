//! STAC API client.
//!
//! Searches are lazy: [`StacClient::search`] validates the query and returns
//! an [`ItemStream`] that issues the first `POST /search` only when polled
//! and follows `next` links as pages are drained. Every item the server
//! returns is re-checked against the query; non-matching items are dropped
//! with a warning.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use stac_protocol::{
    Collection, CollectionList, ItemCollection, ItemPredicate, ItemSearch, Link, SearchParams, StacItem,
};

use crate::error::{CatalogError, CatalogResult};

/// Upper bound on `next` links followed while listing collections.
const MAX_COLLECTION_PAGES: usize = 100;

/// Tunables for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Default `limit` sent with searches that do not set one.
    pub page_size: u32,
    /// Stop a search after this many matching items.
    pub max_items: Option<usize>,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(15),
            page_size: 100,
            max_items: None,
        }
    }
}

/// Client bound to a single STAC API root.
#[derive(Debug, Clone)]
pub struct StacClient {
    root: String,
    client: Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(root: impl Into<String>, options: StacClientOptions) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| CatalogError::Client(e.to_string()))?;

        Ok(Self {
            root: root.into().trim_end_matches('/').to_string(),
            client,
            options,
        })
    }

    /// API root without a trailing slash.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    pub fn collections_url(&self) -> String {
        format!("{}/collections", self.root)
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.root)
    }

    /// List every collection, following `next` links.
    #[instrument(skip(self), fields(root = %self.root))]
    pub async fn list_collections(&self) -> CatalogResult<Vec<Collection>> {
        let mut collections = Vec::new();
        let mut url = self.collections_url();

        for page in 0..MAX_COLLECTION_PAGES {
            let list: CollectionList = get_json(&self.client, &url).await?;
            debug!(page = page, count = list.collections.len(), "Fetched collections page");

            let next = list.next_link().map(|l| l.href.clone());
            collections.extend(list.collections);

            match next {
                Some(href) if href != url => url = href,
                _ => break,
            }
        }

        info!(count = collections.len(), "Listed collections");
        Ok(collections)
    }

    /// Start a lazy search.
    ///
    /// The query is validated here; transport errors surface while the
    /// returned stream is polled.
    pub fn search(&self, search: ItemSearch) -> CatalogResult<ItemStream> {
        let mut params = search.to_params()?;
        let predicate = search.predicate()?;
        if params.limit.is_none() {
            params.limit = Some(self.options.page_size);
        }

        info!(
            root = %self.root,
            query = %search.describe(),
            "Starting item search"
        );

        let cursor = PageCursor {
            client: self.client.clone(),
            predicate,
            pending: VecDeque::new(),
            next: Some(PageRequest::Post {
                url: self.search_url(),
                body: params.clone(),
            }),
            original: params,
            max_items: self.options.max_items,
            yielded: 0,
            pages: 0,
            dropped: 0,
        };

        let inner = stream::try_unfold(cursor, advance);
        Ok(ItemStream {
            inner: Box::pin(inner),
        })
    }
}

/// Lazily paginated sequence of items that satisfy a search.
pub struct ItemStream {
    inner: Pin<Box<dyn Stream<Item = CatalogResult<StacItem>> + Send>>,
}

impl ItemStream {
    /// Drain the stream into a vector, stopping at the first error.
    pub async fn collect_all(self) -> CatalogResult<Vec<StacItem>> {
        self.try_collect().await
    }
}

impl Stream for ItemStream {
    type Item = CatalogResult<StacItem>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for ItemStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStream").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PageRequest {
    Get { url: String },
    Post { url: String, body: SearchParams },
}

impl PageRequest {
    fn url(&self) -> &str {
        match self {
            PageRequest::Get { url } | PageRequest::Post { url, .. } => url,
        }
    }
}

struct PageCursor {
    client: Client,
    predicate: ItemPredicate,
    pending: VecDeque<StacItem>,
    next: Option<PageRequest>,
    /// Body of the first request, the base for POST links after a GET page.
    original: SearchParams,
    max_items: Option<usize>,
    yielded: usize,
    pages: usize,
    dropped: usize,
}

async fn advance(mut cursor: PageCursor) -> CatalogResult<Option<(StacItem, PageCursor)>> {
    loop {
        if cursor.max_items.map_or(false, |max| cursor.yielded >= max) {
            debug!(yielded = cursor.yielded, "Reached max_items, ending search");
            return Ok(None);
        }

        if let Some(item) = cursor.pending.pop_front() {
            match cursor.predicate.check(&item) {
                Ok(()) => {
                    cursor.yielded += 1;
                    return Ok(Some((item, cursor)));
                }
                Err(reason) => {
                    cursor.dropped += 1;
                    warn!(
                        item = %item.id,
                        reason = %reason,
                        "Dropping item that does not satisfy the search"
                    );
                    continue;
                }
            }
        }

        let Some(request) = cursor.next.take() else {
            info!(
                pages = cursor.pages,
                yielded = cursor.yielded,
                dropped = cursor.dropped,
                "Search complete"
            );
            return Ok(None);
        };

        let page = fetch_page(&cursor.client, &request).await?;
        cursor.pages += 1;
        debug!(
            page = cursor.pages,
            returned = page.features.len(),
            matched = ?page.number_matched,
            "Fetched search page"
        );

        if page.features.is_empty() {
            cursor.next = None;
            continue;
        }

        cursor.next = match page.next_link() {
            Some(link) => {
                let next = next_request(link, &request, &cursor.original)?;
                if next == request {
                    warn!(url = %link.href, "Next link repeats the current request, stopping");
                    None
                } else {
                    Some(next)
                }
            }
            None => None,
        };
        cursor.pending.extend(page.features);
    }
}

/// Build the follow-up request described by a `next` link.
fn next_request(
    link: &Link,
    current: &PageRequest,
    original: &SearchParams,
) -> CatalogResult<PageRequest> {
    if !link.is_post() {
        return Ok(PageRequest::Get {
            url: link.href.clone(),
        });
    }

    let base = match current {
        PageRequest::Post { body, .. } => body,
        PageRequest::Get { .. } => original,
    };
    let body = match &link.body {
        Some(link_body) => base
            .apply_link_body(link_body, link.merge.unwrap_or(false))
            .map_err(|e| CatalogError::Decode {
                url: link.href.clone(),
                message: format!("invalid next link body: {}", e),
            })?,
        None => base.clone(),
    };

    Ok(PageRequest::Post {
        url: link.href.clone(),
        body,
    })
}

async fn fetch_page(client: &Client, request: &PageRequest) -> CatalogResult<ItemCollection> {
    match request {
        PageRequest::Get { url } => get_json(client, url).await,
        PageRequest::Post { url, body } => {
            let response = client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(|e| CatalogError::from_reqwest(url, e))?;
            decode_response(url, response).await
        }
    }
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> CatalogResult<T> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CatalogError::from_reqwest(url, e))?;
    decode_response(url, response).await
}

async fn decode_response<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> CatalogResult<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| CatalogError::from_reqwest(url, e))?;

    if !status.is_success() {
        return Err(CatalogError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: truncate(&text, 300),
        });
    }

    serde_json::from_str(&text).map_err(|e| CatalogError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
