//! Error type for paginated REST fetches

/// Maximum number of response body bytes kept in an HTTP error.
const BODY_SNIPPET_LEN: usize = 512;

/// Error from fetching or decoding a single page.
///
/// Only [`FetchError::RateLimited`] is transient; everything else aborts the
/// object-kind fetch it happened in.
#[derive(Debug)]
pub enum FetchError {
    /// Server answered 429
    RateLimited,
    /// Any other non-2xx status
    Http { status: u16, body: String },
    /// Connection-level failure (DNS, TLS, reset, ...)
    Transport(String),
    /// Connect or read timeout elapsed
    Timeout(String),
    /// Response body is not the expected JSON envelope
    Decode(String),
    /// Rate limiting persisted for the whole retry budget
    RetriesExhausted { label: String, attempts: u32 },
    /// `next_item` called with nothing buffered
    NoSuchElement,
    /// A configured date filter is not ISO-8601 with a zone offset
    InvalidDateFilter { value: String, message: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "HTTP 429: rate limited"),
            Self::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Transport(msg) => write!(f, "HTTP error: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Decode(msg) => write!(f, "invalid response: {msg}"),
            Self::RetriesExhausted { label, attempts } => write!(
                f,
                "Cannot create Zendesk connection for object: '{label}' \
                 (rate limited after {attempts} attempts)"
            ),
            Self::NoSuchElement => write!(f, "no buffered element, call has_next() first"),
            Self::InvalidDateFilter { value, message } => {
                write!(f, "invalid date filter '{value}': {message}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl FetchError {
    /// Build an HTTP error from a status and a (possibly long) body.
    pub fn http(status: u16, body: &str) -> Self {
        Self::Http {
            status,
            body: snippet(body),
        }
    }

    /// Create error from reqwest error, without echoing the request URL.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                return Self::RateLimited;
            }
            return Self::http(status.as_u16(), "");
        }
        let e = e.without_url();
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    if body.len() <= BODY_SNIPPET_LEN {
        return body.to_string();
    }
    let mut end = BODY_SNIPPET_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
