//! Source configuration: raw user-facing properties, batched validation,
//! and the resolved [`FetchConfig`] handed to fetchers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use deskline_core::{BasicAuth, RetryPolicy, Timeouts};
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::object::ObjectKind;
use crate::request::{self, DEFAULT_BASE_URL};
use crate::schema::{self, RecordSchema};

pub const PROPERTY_ADMIN_EMAIL: &str = "admin_email";
pub const PROPERTY_API_TOKEN: &str = "api_token";
pub const PROPERTY_SUBDOMAINS: &str = "subdomains";
pub const PROPERTY_OBJECTS_TO_PULL: &str = "objects_to_pull";
pub const PROPERTY_START_DATE: &str = "start_date";
pub const PROPERTY_END_DATE: &str = "end_date";
pub const PROPERTY_MAX_RETRY_COUNT: &str = "max_retry_count";
pub const PROPERTY_SCHEMA: &str = "schema";

/// User-facing source properties, string-typed as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub admin_email: String,
    #[serde(skip_serializing)]
    pub api_token: String,
    /// Comma-separated subdomain list
    pub subdomains: String,
    /// Comma-separated object display names
    pub objects_to_pull: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub satisfaction_ratings_score: Option<String>,
    pub max_retry_count: u32,
    /// Seconds
    pub max_retry_wait: u64,
    /// Milliseconds
    pub max_retry_jitter_wait: u64,
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds
    pub read_timeout: u64,
    pub zendesk_base_url: Option<String>,
    /// Avro-style JSON output schema override
    pub schema: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            admin_email: String::new(),
            api_token: String::new(),
            subdomains: String::new(),
            objects_to_pull: String::new(),
            start_date: None,
            end_date: None,
            satisfaction_ratings_score: None,
            max_retry_count: 20,
            max_retry_wait: 240,
            max_retry_jitter_wait: 100,
            connect_timeout: 300,
            read_timeout: 300,
            zendesk_base_url: None,
            schema: None,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Split a comma list, trimming entries and dropping blanks and duplicates.
fn split_list(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !out.iter().any(|s| s == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Address syntax per `validator`, on a dotted domain whose top-level label
/// is at least two characters and not numeric.
pub fn is_valid_email(email: &str) -> bool {
    if !email.validate_email() {
        return false;
    }
    email
        .rsplit_once('@')
        .and_then(|(_, domain)| domain.rsplit_once('.'))
        .is_some_and(|(_, tld)| tld.len() >= 2 && !tld.chars().all(|c| c.is_ascii_digit()))
}

impl SourceConfig {
    pub fn subdomains(&self) -> Vec<String> {
        split_list(&self.subdomains)
    }

    pub fn objects(&self) -> Vec<String> {
        split_list(&self.objects_to_pull)
    }

    pub fn zendesk_base_url(&self) -> &str {
        request::zendesk_base_url(self.zendesk_base_url.as_deref())
    }

    /// Check every property, collecting all failures.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::default();

        if !is_valid_email(&self.admin_email) {
            errors.push(ValidationFailure::new(
                PROPERTY_ADMIN_EMAIL,
                format!("Email '{}' is invalid.", self.admin_email),
            ));
        }

        if self.api_token.trim().is_empty() {
            errors.push(ValidationFailure::new(
                PROPERTY_API_TOKEN,
                "Property 'API Token' can't be empty.",
            ));
        }

        if self.subdomains().is_empty() {
            errors.push(ValidationFailure::new(
                PROPERTY_SUBDOMAINS,
                "Property 'Subdomains' can't be empty.",
            )
            .with_action("Specify at least one Zendesk subdomain, for example 'acme'."));
        }

        let objects = self.objects();
        if objects.is_empty() {
            errors.push(ValidationFailure::new(
                PROPERTY_OBJECTS_TO_PULL,
                "Property 'Objects to Pull' can't be empty.",
            )
            .with_action("Select at least one object."));
        }
        let mut incremental_selected = false;
        for name in &objects {
            match ObjectKind::from_name(name) {
                Ok(kind) => incremental_selected |= kind.is_incremental(),
                Err(e) => errors.push(ValidationFailure::new(
                    PROPERTY_OBJECTS_TO_PULL,
                    format!("{e}."),
                )),
            }
        }
        if incremental_selected && non_blank(&self.start_date).is_none() {
            let names: Vec<&str> = ObjectKind::all()
                .iter()
                .filter(|k| k.is_incremental())
                .map(|k| k.name())
                .collect();
            errors.push(ValidationFailure::new(
                PROPERTY_START_DATE,
                "Property 'Start Date' can't be empty.",
            )
            .with_action(format!(
                "Ensure 'Start Date' is specified for objects: {}",
                names.join(", ")
            )));
        }

        for (property, value) in [
            (PROPERTY_START_DATE, &self.start_date),
            (PROPERTY_END_DATE, &self.end_date),
        ] {
            if let Some(value) = non_blank(value) {
                if request::parse_date_filter(value).is_err() {
                    errors.push(ValidationFailure::new(
                        property,
                        format!("Invalid '{property}' value: '{value}'."),
                    )
                    .with_action("Value must be in Zendesk Formats. For example, 2019-01-01T23:01:01Z"));
                }
            }
        }

        if self.max_retry_count == 0 {
            errors.push(ValidationFailure::new(
                PROPERTY_MAX_RETRY_COUNT,
                "Property 'Max Retry Count' must be at least 1.",
            ));
        }

        if let Some(text) = non_blank(&self.schema) {
            if let Err(e) = schema::parse_json(text) {
                errors.push(ValidationFailure::new(PROPERTY_SCHEMA, e.to_string()));
            }
            if objects.len() > 1 {
                errors.push(ValidationFailure::new(
                    PROPERTY_SCHEMA,
                    "A custom output schema applies to a single object.",
                )
                .with_action("Remove the schema or select exactly one object."));
            }
        }

        errors
    }

    /// Validate and convert into the resolved fetch configuration.
    pub fn resolve(&self) -> Result<FetchConfig, ValidationErrors> {
        self.validate().into_result()?;
        let parse = |value: &Option<String>| {
            non_blank(value).and_then(|v| request::parse_date_filter(v).ok())
        };
        Ok(FetchConfig {
            admin_email: self.admin_email.clone(),
            api_token: self.api_token.clone(),
            base_url: self.zendesk_base_url().to_string(),
            start_date: parse(&self.start_date),
            end_date: parse(&self.end_date),
            satisfaction_ratings_score: non_blank(&self.satisfaction_ratings_score)
                .map(str::to_string),
            timeouts: Timeouts {
                connect: Duration::from_secs(self.connect_timeout),
                read: Duration::from_secs(self.read_timeout),
            },
            retry: RetryPolicy {
                max_attempts: self.max_retry_count,
                max_wait: Duration::from_secs(self.max_retry_wait),
                max_jitter: Duration::from_millis(self.max_retry_jitter_wait),
            },
        })
    }

    /// Selected kinds in the order given
    pub fn object_kinds(&self) -> Result<Vec<ObjectKind>, ValidationErrors> {
        self.objects()
            .iter()
            .map(|name| {
                ObjectKind::from_name(name).map_err(|e| {
                    ValidationErrors::from(ValidationFailure::new(
                        PROPERTY_OBJECTS_TO_PULL,
                        format!("{e}."),
                    ))
                })
            })
            .collect()
    }

    /// Output schema for `kind`: the custom schema when one is set, else the default.
    pub fn output_schema(&self, kind: ObjectKind) -> Result<Arc<RecordSchema>, ValidationErrors> {
        match non_blank(&self.schema) {
            Some(text) => schema::parse_json(text).map(Arc::new).map_err(|e| {
                ValidationErrors::from(ValidationFailure::new(PROPERTY_SCHEMA, e.to_string()))
            }),
            None => Ok(Arc::clone(kind.schema())),
        }
    }
}

/// Resolved, immutable settings shared by every fetcher of a run.
#[derive(Clone)]
pub struct FetchConfig {
    pub admin_email: String,
    pub api_token: String,
    /// `%s`-template, see [`request::zendesk_base_url`]
    pub base_url: String,
    pub start_date: Option<DateTime<FixedOffset>>,
    pub end_date: Option<DateTime<FixedOffset>>,
    pub satisfaction_ratings_score: Option<String>,
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            admin_email: String::new(),
            api_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            start_date: None,
            end_date: None,
            satisfaction_ratings_score: None,
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("admin_email", &self.admin_email)
            .field("base_url", &self.base_url)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("satisfaction_ratings_score", &self.satisfaction_ratings_score)
            .field("timeouts", &self.timeouts)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FetchConfig {
    /// Zendesk API token auth: `<email>/token` with the token as password
    pub fn credentials(&self) -> BasicAuth {
        BasicAuth {
            username: format!("{}/token", self.admin_email),
            password: self.api_token.clone(),
        }
    }
}

/// One failed property check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub property: &'static str,
    pub message: String,
    pub corrective_action: Option<String>,
}

impl ValidationFailure {
    pub fn new(property: &'static str, message: impl Into<String>) -> Self {
        Self {
            property,
            message: message.into(),
            corrective_action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.corrective_action = Some(action.into());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.message)?;
        if let Some(action) = &self.corrective_action {
            write!(f, " ({action})")?;
        }
        Ok(())
    }
}

/// All failures found in one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationFailure>);

impl ValidationErrors {
    pub fn push(&mut self, failure: ValidationFailure) {
        self.0.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationFailure> {
        self.0.iter()
    }

    /// Failures for one property
    pub fn for_property<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = &'a ValidationFailure> + 'a {
        self.0.iter().filter(move |f| f.property == property)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationFailure> for ValidationErrors {
    fn from(failure: ValidationFailure) -> Self {
        Self(vec![failure])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration error(s)", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
