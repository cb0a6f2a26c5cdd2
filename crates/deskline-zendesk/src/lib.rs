//! Zendesk extraction engine
//!
//! Pulls paginated list and incremental-export endpoints for a set of
//! subdomains and object kinds, optionally enriches records from a second
//! stream, projects them onto an output schema and writes JSONL.
//!
//! ```text
//! request (first page URL) -> pager (pages, retry) -> join -> reader (schema) -> runner (JSONL)
//! ```

pub mod config;
pub mod join;
pub mod object;
pub mod pager;
pub mod reader;
pub mod request;
pub mod runner;
pub mod schema;

pub use config::{FetchConfig, SourceConfig, ValidationErrors, ValidationFailure};
pub use join::JoinFetcher;
pub use object::{JoinSpec, ObjectDescriptor, ObjectKind, UnknownObjectKind};
pub use pager::{
    CATCH_UP_WINDOW, HttpPageSource, INCREMENTAL_EXPORT_MAX_COUNT, PageSource, PagedFetcher,
    RecordStream,
};
pub use reader::{Record, RecordReader};
pub use request::{DEFAULT_BASE_URL, first_page_url, zendesk_base_url};
pub use runner::{Assignment, AssignmentStats, RunConfig, RunSummary, run};
pub use schema::{Field, FieldType, RecordSchema, SchemaError};
