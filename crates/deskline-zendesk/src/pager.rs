//! Paginated fetcher over Zendesk list and incremental export endpoints
//!
//! A fetcher holds one page of decoded records plus the cursor of the next
//! page. `has_next` refills the buffer (skipping empty pages) until a record
//! is available or the cursor is exhausted; `next_item` pops one record.

use std::collections::VecDeque;
use std::time::Duration;

use deskline_core::{FetchError, JsonClient, RetryPolicy, retry_with_backoff};
use serde_json::Value;

use crate::config::FetchConfig;
use crate::object::{ObjectDescriptor, ObjectKind};
use crate::request::first_page_url;

/// Incremental exports return at most this many records per page; a shorter
/// page means the export has caught up.
pub const INCREMENTAL_EXPORT_MAX_COUNT: i64 = 1000;

/// Incremental pages whose `end_time` falls within this window of now are
/// treated as the last page.
pub const CATCH_UP_WINDOW: Duration = Duration::from_secs(5 * 60);

const NEXT_PAGE: &str = "next_page";
const END_TIME: &str = "end_time";
const COUNT: &str = "count";

/// Source of raw JSON pages
pub trait PageSource {
    fn fetch_page(&mut self, url: &str) -> Result<Value, FetchError>;

    /// Release held connections. Must be idempotent.
    fn close(&mut self) {}
}

/// Authenticated HTTP page source
#[derive(Debug)]
pub struct HttpPageSource {
    client: Option<JsonClient>,
}

impl HttpPageSource {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = JsonClient::new(config.timeouts, Some(config.credentials()))?;
        Ok(Self {
            client: Some(client),
        })
    }
}

/// Zendesk rejects `%2B` in cursors it hands out; send a literal `+`.
pub fn restore_plus(url: &str) -> String {
    url.replace("%2B", "+")
}

impl PageSource for HttpPageSource {
    fn fetch_page(&mut self, url: &str) -> Result<Value, FetchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::Transport("page source is closed".into()))?;
        client.get_json(&restore_plus(url))
    }

    fn close(&mut self) {
        self.client = None;
    }
}

/// Record stream consumed by the reader
pub trait RecordStream {
    fn has_next(&mut self) -> Result<bool, FetchError>;
    fn next_item(&mut self) -> Result<Value, FetchError>;
    fn close(&mut self);
}

/// Lazily paginated record stream for one object kind on one subdomain.
pub struct PagedFetcher<S: PageSource = HttpPageSource> {
    kind: ObjectKind,
    source: S,
    retry: RetryPolicy,
    sleep: fn(Duration),
    next_page: Option<String>,
    buffer: VecDeque<Value>,
    pages_fetched: usize,
}

impl<S: PageSource> std::fmt::Debug for PagedFetcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFetcher")
            .field("kind", &self.kind)
            .field("next_page", &self.next_page)
            .field("buffered", &self.buffer.len())
            .field("pages_fetched", &self.pages_fetched)
            .finish_non_exhaustive()
    }
}

impl PagedFetcher<HttpPageSource> {
    /// Fetcher starting at the first page of `kind` on `subdomain`
    pub fn new(config: &FetchConfig, kind: ObjectKind, subdomain: &str) -> Result<Self, FetchError> {
        let url = first_page_url(config, kind, subdomain)?;
        let source = HttpPageSource::new(config)?;
        Ok(Self::with_source(kind, source, url, config.retry))
    }
}

impl<S: PageSource> PagedFetcher<S> {
    pub fn with_source(kind: ObjectKind, source: S, first_page: String, retry: RetryPolicy) -> Self {
        Self {
            kind,
            source,
            retry,
            sleep: std::thread::sleep,
            next_page: Some(first_page),
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    /// Replace the wait between rate-limited attempts
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// True when a record is buffered, fetching further pages as needed.
    ///
    /// A failed fetch drops the cursor, so later calls report exhaustion.
    pub fn has_next(&mut self) -> Result<bool, FetchError> {
        while self.buffer.is_empty() {
            let Some(url) = self.next_page.take() else {
                return Ok(false);
            };
            let page = self.fetch_with_retry(&url)?;
            self.pages_fetched += 1;
            let next = self.next_page(&page);
            let items = self.json_values_from_response(page)?;
            log::debug!(
                "{}: page {} with {} records, next: {}",
                self.kind,
                self.pages_fetched,
                items.len(),
                next.as_deref().unwrap_or("none")
            );
            self.buffer = items;
            self.next_page = next;
        }
        Ok(true)
    }

    /// Pop the next buffered record
    pub fn next_item(&mut self) -> Result<Value, FetchError> {
        self.buffer.pop_front().ok_or(FetchError::NoSuchElement)
    }

    /// Drop buffered state and release the connection; safe to call twice.
    pub fn close(&mut self) {
        self.next_page = None;
        self.buffer.clear();
        self.source.close();
    }

    /// Records carried by a page envelope
    pub fn json_values_from_response(&self, page: Value) -> Result<VecDeque<Value>, FetchError> {
        json_values_from_response(self.kind.descriptor(), page)
    }

    /// Cursor of the page after `page`, evaluated against the current time
    pub fn next_page(&self, page: &Value) -> Option<String> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        next_page_at(self.kind.descriptor(), page, now_ms)
    }

    fn fetch_with_retry(&mut self, url: &str) -> Result<Value, FetchError> {
        let source = &mut self.source;
        retry_with_backoff(self.kind.name(), &self.retry, self.sleep, || {
            log::debug!("GET {url}");
            source.fetch_page(url)
        })
    }
}

impl<S: PageSource> RecordStream for PagedFetcher<S> {
    fn has_next(&mut self) -> Result<bool, FetchError> {
        PagedFetcher::has_next(self)
    }

    fn next_item(&mut self) -> Result<Value, FetchError> {
        PagedFetcher::next_item(self)
    }

    fn close(&mut self) {
        PagedFetcher::close(self)
    }
}

impl<S: PageSource> Iterator for PagedFetcher<S> {
    type Item = Result<Value, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_item()),
            Ok(false) => None,
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

/// Extract the records of one page.
///
/// With a child key, each entry's nested array is flattened out and entries
/// without one contribute nothing.
pub fn json_values_from_response(
    descriptor: &ObjectDescriptor,
    page: Value,
) -> Result<VecDeque<Value>, FetchError> {
    let key = descriptor.response_key;
    let entries = match page {
        Value::Object(mut envelope) => envelope.remove(key),
        _ => None,
    };
    let Some(Value::Array(entries)) = entries else {
        return Err(FetchError::Decode(format!(
            "{}: response has no '{key}' array",
            descriptor.name
        )));
    };

    let Some(child_key) = descriptor.child_key else {
        return Ok(entries.into());
    };
    let mut out = VecDeque::new();
    for mut entry in entries {
        match entry.get_mut(child_key).map(Value::take) {
            None | Some(Value::Null) => {}
            Some(Value::Array(children)) => out.extend(children),
            Some(other) => {
                return Err(FetchError::Decode(format!(
                    "{}: '{child_key}' is not an array: {other}",
                    descriptor.name
                )));
            }
        }
    }
    Ok(out)
}

fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Cursor rule at wall-clock `now_ms`.
///
/// List endpoints follow `next_page` until it is null. Incremental exports
/// also stop once `end_time` is missing, zero, or within [`CATCH_UP_WINDOW`]
/// of now, or once a page holds fewer than [`INCREMENTAL_EXPORT_MAX_COUNT`]
/// records.
pub fn next_page_at(descriptor: &ObjectDescriptor, page: &Value, now_ms: i64) -> Option<String> {
    let next = page
        .get(NEXT_PAGE)
        .and_then(Value::as_str)
        .filter(|s| !s.eq_ignore_ascii_case("null"))?;
    if !descriptor.incremental {
        return Some(next.to_string());
    }

    let end_time = page.get(END_TIME).and_then(as_i64)?;
    let window_ms = CATCH_UP_WINDOW.as_millis() as i64;
    if end_time == 0 || end_time.saturating_mul(1000) > now_ms - window_ms {
        return None;
    }
    let count = page.get(COUNT).and_then(as_i64)?;
    if count < INCREMENTAL_EXPORT_MAX_COUNT {
        return None;
    }
    Some(next.to_string())
}
