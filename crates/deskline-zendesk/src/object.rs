//! Zendesk object kinds and their endpoint descriptors

use std::fmt;
use std::sync::Arc;

use crate::schema::{self, RecordSchema};

/// Secondary-stream lookup attached to a primary object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec {
    /// Kind whose records are looked up
    pub secondary: ObjectKind,
    /// Field on the primary record holding the reference
    pub key_field: &'static str,
    /// Field on the secondary record matched against the reference
    pub id_field: &'static str,
    /// Field inserted into the primary record on a match
    pub target_field: &'static str,
}

/// Static description of how one object kind is fetched and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub name: &'static str,
    /// Path appended to the base URL, may carry its own query string
    pub endpoint: &'static str,
    /// Envelope key holding the record array
    pub response_key: &'static str,
    /// When set, each entry's nested array under this key is flattened out
    pub child_key: Option<&'static str>,
    pub incremental: bool,
    pub join: Option<JoinSpec>,
}

/// Zendesk object kinds available for extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    TicketComments,
    Groups,
    Organizations,
    SatisfactionRatings,
    Tags,
    TicketFields,
    TicketMetrics,
    TicketMetricEvents,
    Tickets,
    Users,
    UsersSimple,
    Requests,
    ArticleComments,
    PostComments,
    RequestsComments,
}

const fn plain(
    name: &'static str,
    endpoint: &'static str,
    response_key: &'static str,
) -> ObjectDescriptor {
    ObjectDescriptor {
        name,
        endpoint,
        response_key,
        child_key: None,
        incremental: false,
        join: None,
    }
}

const fn incremental(
    name: &'static str,
    endpoint: &'static str,
    response_key: &'static str,
) -> ObjectDescriptor {
    ObjectDescriptor {
        incremental: true,
        ..plain(name, endpoint, response_key)
    }
}

const fn joined(
    name: &'static str,
    endpoint: &'static str,
    response_key: &'static str,
    join: JoinSpec,
) -> ObjectDescriptor {
    ObjectDescriptor {
        join: Some(join),
        ..plain(name, endpoint, response_key)
    }
}

const AUTHOR_JOIN: JoinSpec = JoinSpec {
    secondary: ObjectKind::UsersSimple,
    key_field: "author_id",
    id_field: "id",
    target_field: "author",
};

const TICKET_COMMENTS: ObjectDescriptor = ObjectDescriptor {
    child_key: Some("child_events"),
    ..incremental(
        "Ticket Comments",
        "incremental/ticket_events.json?include=comment_events",
        "ticket_events",
    )
};
const GROUPS: ObjectDescriptor = plain("Groups", "groups.json", "groups");
const ORGANIZATIONS: ObjectDescriptor = incremental(
    "Organizations",
    "incremental/organizations.json",
    "organizations",
);
const SATISFACTION_RATINGS: ObjectDescriptor = plain(
    "Satisfaction Ratings",
    "satisfaction_ratings.json",
    "satisfaction_ratings",
);
const TAGS: ObjectDescriptor = plain("Tags", "tags.json", "tags");
const TICKET_FIELDS: ObjectDescriptor = plain("Ticket Fields", "ticket_fields.json", "ticket_fields");
const TICKET_METRICS: ObjectDescriptor =
    plain("Ticket Metrics", "ticket_metrics.json", "ticket_metrics");
const TICKET_METRIC_EVENTS: ObjectDescriptor = incremental(
    "Ticket Metric Events",
    "incremental/ticket_metric_events.json",
    "ticket_metric_events",
);
const TICKETS: ObjectDescriptor = incremental("Tickets", "incremental/tickets.json", "tickets");
const USERS: ObjectDescriptor = incremental("Users", "incremental/users.json", "users");
const USERS_SIMPLE: ObjectDescriptor = plain("Users Simple", "users.json", "users");
const REQUESTS: ObjectDescriptor = plain("Requests", "requests.json", "requests");
const ARTICLE_COMMENTS: ObjectDescriptor = joined(
    "Article Comments",
    "help_center/incremental/article_comments.json",
    "comments",
    AUTHOR_JOIN,
);
const POST_COMMENTS: ObjectDescriptor = joined(
    "Post Comments",
    "community/incremental/post_comments.json",
    "comments",
    AUTHOR_JOIN,
);
const REQUESTS_COMMENTS: ObjectDescriptor = joined(
    "Requests Comments",
    "requests/comments.json",
    "comments",
    JoinSpec {
        secondary: ObjectKind::Requests,
        key_field: "request_id",
        id_field: "id",
        target_field: "request",
    },
);

impl ObjectKind {
    /// Exact, case-sensitive lookup by display name ("Ticket Comments").
    pub fn from_name(name: &str) -> Result<Self, UnknownObjectKind> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| UnknownObjectKind(name.to_string()))
    }

    pub fn descriptor(self) -> &'static ObjectDescriptor {
        match self {
            Self::TicketComments => &TICKET_COMMENTS,
            Self::Groups => &GROUPS,
            Self::Organizations => &ORGANIZATIONS,
            Self::SatisfactionRatings => &SATISFACTION_RATINGS,
            Self::Tags => &TAGS,
            Self::TicketFields => &TICKET_FIELDS,
            Self::TicketMetrics => &TICKET_METRICS,
            Self::TicketMetricEvents => &TICKET_METRIC_EVENTS,
            Self::Tickets => &TICKETS,
            Self::Users => &USERS,
            Self::UsersSimple => &USERS_SIMPLE,
            Self::Requests => &REQUESTS,
            Self::ArticleComments => &ARTICLE_COMMENTS,
            Self::PostComments => &POST_COMMENTS,
            Self::RequestsComments => &REQUESTS_COMMENTS,
        }
    }

    /// Display name as accepted by [`ObjectKind::from_name`]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn is_incremental(self) -> bool {
        self.descriptor().incremental
    }

    /// Output directory name: "Ticket Metric Events" -> "ticket_metric_events"
    pub fn snake_name(self) -> String {
        self.name().to_lowercase().replace(' ', "_")
    }

    /// Default output schema
    pub fn schema(self) -> &'static Arc<RecordSchema> {
        match self {
            Self::TicketComments => schema::ticket_comments(),
            Self::Groups => schema::groups(),
            Self::Organizations => schema::organizations(),
            Self::SatisfactionRatings => schema::satisfaction_ratings(),
            Self::Tags => schema::tags(),
            Self::TicketFields => schema::ticket_fields(),
            Self::TicketMetrics => schema::ticket_metrics(),
            Self::TicketMetricEvents => schema::ticket_metric_events(),
            Self::Tickets => schema::tickets(),
            Self::Users => schema::users(),
            Self::UsersSimple => schema::users_simple(),
            Self::Requests => schema::requests(),
            Self::ArticleComments => schema::article_comments(),
            Self::PostComments => schema::post_comments(),
            Self::RequestsComments => schema::requests_comments(),
        }
    }

    /// All kinds in registry order
    pub fn all() -> &'static [ObjectKind] {
        &[
            Self::TicketComments,
            Self::Groups,
            Self::Organizations,
            Self::SatisfactionRatings,
            Self::Tags,
            Self::TicketFields,
            Self::TicketMetrics,
            Self::TicketMetricEvents,
            Self::Tickets,
            Self::Users,
            Self::UsersSimple,
            Self::Requests,
            Self::ArticleComments,
            Self::PostComments,
            Self::RequestsComments,
        ]
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Object name not present in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownObjectKind(pub String);

impl fmt::Display for UnknownObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported object '{}'", self.0)
    }
}

impl std::error::Error for UnknownObjectKind {}
