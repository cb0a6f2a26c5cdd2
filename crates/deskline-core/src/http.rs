//! Blocking JSON-over-HTTP client.
//!
//! Uses async reqwest internally with tokio::time::timeout for read stalls,
//! but presents a sync interface so fetchers can be pulled from rayon workers.

use std::sync::LazyLock;
use std::time::Duration;

use serde_json::Value;

use crate::error::FetchError;

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// HTTP Basic credentials
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Per-call timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(300),
            read: Duration::from_secs(300),
        }
    }
}

/// GET-only JSON client owning its connection pool.
///
/// Dropping the client closes its pooled connections.
pub struct JsonClient {
    client: reqwest::Client,
    auth: Option<BasicAuth>,
    read_timeout: Duration,
}

impl std::fmt::Debug for JsonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonClient")
            .field("auth", &self.auth)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl JsonClient {
    pub fn new(timeouts: Timeouts, auth: Option<BasicAuth>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(FetchError::from_reqwest)?;
        Ok(Self {
            client,
            auth,
            read_timeout: timeouts.read,
        })
    }

    /// GET `url` and parse the body as JSON.
    ///
    /// 2xx → parsed body, 429 → [`FetchError::RateLimited`],
    /// other statuses → [`FetchError::Http`] with a body snippet.
    pub fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let (status, body) = SHARED_RUNTIME.handle().block_on(self.get_text(url))?;
        match status {
            200..=299 => Ok(serde_json::from_str(&body)?),
            429 => Err(FetchError::RateLimited),
            _ => Err(FetchError::http(status, &body)),
        }
    }

    async fn get_text(&self, url: &str) -> Result<(u16, String), FetchError> {
        let mut request = self.client.get(url);
        if let Some(ref auth) = self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = tokio::time::timeout(self.read_timeout, request.send())
            .await
            .map_err(|_| self.timed_out("waiting for response headers"))?
            .map_err(FetchError::from_reqwest)?;
        let status = response.status().as_u16();

        let body = tokio::time::timeout(self.read_timeout, response.text())
            .await
            .map_err(|_| self.timed_out("reading response body"))?
            .map_err(FetchError::from_reqwest)?;
        Ok((status, body))
    }

    fn timed_out(&self, what: &str) -> FetchError {
        FetchError::Timeout(format!(
            "{what} ({}s with no data)",
            self.read_timeout.as_secs()
        ))
    }
}
