//! Deskline Core - Common infrastructure for REST extraction pipelines
//!
//! This crate provides reusable components for fetching paginated JSON
//! APIs: a blocking HTTP client, rate-limit-aware retry, logging,
//! progress reporting, and JSONL output.

pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use error::FetchError;
pub use http::{BasicAuth, JsonClient, SHARED_RUNTIME, Timeouts};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{RetryOutcome, RetryPolicy, backoff_duration, classify, retry_with_backoff};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag};
pub use sink::{JsonlSink, cleanup_tmp_files};
