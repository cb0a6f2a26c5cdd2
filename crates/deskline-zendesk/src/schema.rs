//! Output schemas for Zendesk objects
//!
//! Each object kind has a declarative field tree (name, type, nullability,
//! nested records) built once into a static `Arc<RecordSchema>`. Records
//! are projected onto these trees: undeclared payload fields are dropped and
//! declared-but-absent fields become `null`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use apache_avro::Schema as AvroSchema;
use serde_json::{Map, Value, json};

/// Field value type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Long,
    Double,
    Boolean,
    String,
    Array(Box<FieldType>),
    Map(Box<FieldType>),
    Record(RecordSchema),
    /// Avro type without a dedicated variant, kept as its JSON form.
    /// Values pass through projection untouched.
    Other(Value),
}

impl FieldType {
    pub fn array(items: FieldType) -> Self {
        Self::Array(Box::new(items))
    }

    pub fn map(values: FieldType) -> Self {
        Self::Map(Box::new(values))
    }

    pub fn record(name: &str, fields: Vec<Field>) -> Self {
        Self::Record(RecordSchema::new(name, fields))
    }
}

/// One named field of a record
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: &str, ty: FieldType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            ty,
            nullable,
        }
    }
}

/// Ordered set of fields
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

impl RecordSchema {
    pub fn new(name: &str, fields: Vec<Field>) -> Self {
        Self {
            name: name.to_string(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Keep exactly the declared fields of `value`, recursing into nested
    /// records and arrays of records. Non-object input yields all-null.
    pub fn project(&self, value: &Value) -> Map<String, Value> {
        let obj = value.as_object();
        self.fields
            .iter()
            .map(|field| {
                let projected = match obj.and_then(|o| o.get(&field.name)) {
                    None | Some(Value::Null) => Value::Null,
                    Some(v) => project_value(&field.ty, v),
                };
                (field.name.clone(), projected)
            })
            .collect()
    }

    /// Avro JSON rendering of this schema.
    ///
    /// A record name is defined once; later uses of an identical record are
    /// written as a reference to it, a different record under a taken name
    /// gets a numeric suffix.
    pub fn to_json(&self) -> Value {
        self.render(&mut HashMap::new())
    }

    fn render(&self, defined: &mut HashMap<String, RecordSchema>) -> Value {
        let mut name = self.name.clone();
        let mut n = 1;
        while let Some(existing) = defined.get(&name) {
            if existing == self {
                return json!(name);
            }
            n += 1;
            name = format!("{}_{n}", self.name);
        }
        defined.insert(name.clone(), self.clone());
        let fields: Vec<Value> = self.fields.iter().map(|f| field_to_json(f, defined)).collect();
        json!({"type": "record", "name": name, "fields": fields})
    }
}

fn project_value(ty: &FieldType, value: &Value) -> Value {
    match (ty, value) {
        (FieldType::Record(schema), Value::Object(_)) => Value::Object(schema.project(value)),
        (FieldType::Array(items), Value::Array(values)) => Value::Array(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Value::Null,
                    v => project_value(items, v),
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn type_to_json(ty: &FieldType, defined: &mut HashMap<String, RecordSchema>) -> Value {
    match ty {
        FieldType::Long => json!("long"),
        FieldType::Double => json!("double"),
        FieldType::Boolean => json!("boolean"),
        FieldType::String => json!("string"),
        FieldType::Array(items) => json!({"type": "array", "items": type_to_json(items, defined)}),
        FieldType::Map(values) => json!({"type": "map", "values": type_to_json(values, defined)}),
        FieldType::Record(schema) => schema.render(defined),
        FieldType::Other(raw) => raw.clone(),
    }
}

fn field_to_json(field: &Field, defined: &mut HashMap<String, RecordSchema>) -> Value {
    let ty = type_to_json(&field.ty, defined);
    let ty = if field.nullable { with_null(ty) } else { ty };
    json!({"name": field.name, "type": ty})
}

/// Add `null` to a type; unions cannot nest, so an existing union is extended.
fn with_null(ty: Value) -> Value {
    match ty {
        Value::Array(mut branches) => {
            if !branches.iter().any(|b| b == "null") {
                branches.push(json!("null"));
            }
            Value::Array(branches)
        }
        ty if ty == "null" => ty,
        ty => json!([ty, "null"]),
    }
}

/// Error from parsing a user-supplied schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError(pub String);

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid schema: {}", self.0)
    }
}

impl std::error::Error for SchemaError {}

impl From<apache_avro::Error> for SchemaError {
    fn from(e: apache_avro::Error) -> Self {
        Self(e.to_string())
    }
}

/// Parse an Avro record schema into a field tree.
///
/// Unions with `null` mark a field nullable, `int`/`float` widen to
/// `long`/`double`. Other Avro types (enums, fixed, bytes, logical types,
/// unions of several types) are kept verbatim as [`FieldType::Other`].
pub fn parse_json(text: &str) -> Result<RecordSchema, SchemaError> {
    let schema = AvroSchema::parse_str(text)?;
    let AvroSchema::Record(record) = &schema else {
        return Err(SchemaError("top-level type must be a record".into()));
    };
    AvroConverter::default().record(record)
}

/// Converts parsed Avro schemas, resolving named references to records
/// defined earlier in the same document.
#[derive(Default)]
struct AvroConverter {
    records: HashMap<String, RecordSchema>,
}

impl AvroConverter {
    fn record(&mut self, record: &apache_avro::schema::RecordSchema) -> Result<RecordSchema, SchemaError> {
        let fields = record
            .fields
            .iter()
            .map(|f| {
                let (ty, nullable) = self.field_type(&f.schema)?;
                Ok(Field::new(&f.name, ty, nullable))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        let schema = RecordSchema::new(&record.name.name, fields);
        self.records.insert(schema.name.clone(), schema.clone());
        Ok(schema)
    }

    /// Returns the type and whether it admits null
    fn field_type(&mut self, schema: &AvroSchema) -> Result<(FieldType, bool), SchemaError> {
        let ty = match schema {
            AvroSchema::Null => return Ok((FieldType::Other(json!("null")), true)),
            AvroSchema::Boolean => FieldType::Boolean,
            AvroSchema::Int | AvroSchema::Long => FieldType::Long,
            AvroSchema::Float | AvroSchema::Double => FieldType::Double,
            AvroSchema::String => FieldType::String,
            AvroSchema::Record(record) => FieldType::Record(self.record(record)?),
            AvroSchema::Array(array) => FieldType::array(self.field_type(&array.items)?.0),
            AvroSchema::Map(map) => FieldType::map(self.field_type(&map.types)?.0),
            AvroSchema::Ref { name } => match self.records.get(&name.name) {
                Some(record) => FieldType::Record(record.clone()),
                None => FieldType::Other(serde_json::to_value(schema)?),
            },
            AvroSchema::Union(union) => {
                let nullable = union.variants().iter().any(|v| matches!(v, AvroSchema::Null));
                let branches: Vec<&AvroSchema> = union
                    .variants()
                    .iter()
                    .filter(|v| !matches!(v, AvroSchema::Null))
                    .collect();
                return match branches.as_slice() {
                    [only] => {
                        let (ty, inner_nullable) = self.field_type(only)?;
                        Ok((ty, nullable || inner_nullable))
                    }
                    _ => {
                        let branches = branches
                            .iter()
                            .map(serde_json::to_value)
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok((FieldType::Other(Value::Array(branches)), nullable))
                    }
                };
            }
            other => FieldType::Other(serde_json::to_value(other)?),
        };
        Ok((ty, false))
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

// === Declarative schemas ===

use FieldType as T;

fn req(name: &str, ty: FieldType) -> Field {
    Field::new(name, ty, false)
}

fn opt(name: &str, ty: FieldType) -> Field {
    Field::new(name, ty, true)
}

fn list_str(name: &str) -> Field {
    opt(name, T::array(T::String))
}

fn list_long(name: &str) -> Field {
    opt(name, T::array(T::Long))
}

fn timestamps() -> [Field; 2] {
    [opt("created_at", T::String), opt("updated_at", T::String)]
}

/// Fields shared by attachments and their thumbnails
fn file_fields() -> Vec<Field> {
    vec![
        opt("id", T::Long),
        opt("file_name", T::String),
        opt("content_url", T::String),
        opt("url", T::String),
        opt("mapped_content_url", T::String),
        opt("content_type", T::String),
        opt("width", T::Long),
        opt("height", T::Long),
        opt("size", T::Long),
    ]
}

fn attachment(name: &str) -> Field {
    let mut fields = file_fields();
    let mut thumbnail = file_fields();
    thumbnail.push(opt("inline", T::Boolean));
    thumbnail.push(opt("deleted", T::Boolean));
    fields.push(opt(
        "thumbnails",
        T::array(T::record("photo_object", thumbnail)),
    ));
    fields.push(opt("inline", T::Boolean));
    fields.push(opt("deleted", T::Boolean));
    opt(name, T::record("attachment_object", fields))
}

fn attachments() -> Field {
    let Field { ty, .. } = attachment("attachments");
    opt("attachments", T::array(ty))
}

/// `via` object: channel plus source from/to descriptions
fn via() -> Field {
    let from = T::record(
        "from_object",
        vec![
            opt("profile_url", T::String),
            opt("subject", T::String),
            opt("service_info", T::String),
            opt("title", T::String),
            opt("topic_name", T::String),
            opt("id", T::Long),
            opt("topic_id", T::Long),
            opt("revision_id", T::Long),
            opt("supports_channelback", T::String),
            opt("address", T::String),
            opt("supports_clickthrough", T::String),
            list_str("original_recipients"),
            opt("formatted_phone", T::String),
            opt("ticket_id", T::Long),
            opt("facebook_id", T::String),
            opt("registered_integration_service_name", T::String),
            opt("deleted", T::String),
            opt("phone", T::String),
            opt("name", T::String),
            opt("username", T::String),
        ],
    );
    let to = T::record(
        "to_object",
        vec![
            opt("address", T::String),
            opt("profile_url", T::String),
            opt("phone", T::String),
            opt("name", T::String),
            opt("formatted_phone", T::String),
            opt("username", T::String),
            opt("facebook_id", T::String),
        ],
    );
    let source = T::record(
        "source_object",
        vec![opt("from", from), opt("to", to), opt("rel", T::String)],
    );
    opt(
        "via",
        T::record(
            "via_object",
            vec![opt("channel", T::String), opt("source", source)],
        ),
    )
}

fn minutes(name: &str) -> Field {
    opt(
        name,
        T::record(
            &format!("{}_minute", name.trim_end_matches("_minutes")),
            vec![opt("calendar", T::Long), opt("business", T::Long)],
        ),
    )
}

fn satisfaction_rating_fields(nullable_refs: bool) -> Vec<Field> {
    let reference = |name: &str| Field::new(name, T::Long, nullable_refs);
    let mut fields = vec![
        Field::new("id", T::Long, nullable_refs),
        opt("url", T::String),
        reference("assignee_id"),
        reference("group_id"),
        reference("requester_id"),
        reference("ticket_id"),
        Field::new("score", T::String, nullable_refs),
    ];
    fields.extend(timestamps());
    fields.extend([
        opt("comment", T::String),
        opt("reason", T::String),
        opt("reason_id", T::Long),
        opt("reason_code", T::Long),
    ]);
    fields
}

fn field_option(name: &str) -> Field {
    opt(
        name,
        T::array(T::record(
            &name[..name.len() - 1],
            vec![
                opt("id", T::Long),
                opt("name", T::String),
                opt("position", T::Long),
                opt("raw_name", T::String),
                opt("url", T::String),
                opt("value", T::String),
                opt("default", T::Boolean),
            ],
        )),
    )
}

/// Minimal user shape attached to joined comments
fn author() -> Field {
    opt(
        "author",
        T::record(
            "author_object",
            vec![
                opt("id", T::Long),
                opt("name", T::String),
                opt("email", T::String),
                opt("role", T::String),
                opt("locale", T::String),
                opt("time_zone", T::String),
            ],
        ),
    )
}

macro_rules! static_schema {
    ($(#[$meta:meta])* $fn_name:ident, $build:expr) => {
        $(#[$meta])*
        pub fn $fn_name() -> &'static Arc<RecordSchema> {
            static SCHEMA: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| Arc::new($build));
            &SCHEMA
        }
    };
}

static_schema!(
    /// Comment events flattened out of incremental ticket events
    ticket_comments,
    RecordSchema::new("ticket_comments", {
        vec![
            req("id", T::Long),
            opt("type", T::String),
            opt("body", T::String),
            opt("html_body", T::String),
            opt("plain_body", T::String),
            opt("public", T::Boolean),
            opt("author_id", T::Long),
            attachments(),
            via(),
            opt("created_at", T::String),
        ]
    })
);

static_schema!(
    groups,
    RecordSchema::new("group", {
        let mut fields = vec![
            req("id", T::Long),
            opt("url", T::String),
            req("name", T::String),
            opt("deleted", T::Boolean),
        ];
        fields.extend(timestamps());
        fields
    })
);

static_schema!(
    organizations,
    RecordSchema::new("organization", {
        let mut fields = vec![
            req("id", T::Long),
            opt("url", T::String),
            opt("external_id", T::String),
            req("name", T::String),
        ];
        fields.extend(timestamps());
        fields.extend([
            list_str("domain_names"),
            opt("details", T::String),
            opt("notes", T::String),
            opt("group_id", T::Long),
            opt("shared_tickets", T::Boolean),
            opt("shared_comments", T::Boolean),
            list_str("tags"),
            opt("organization_fields", T::map(T::String)),
        ]);
        fields
    })
);

static_schema!(
    satisfaction_ratings,
    RecordSchema::new("satisfaction_ratings", satisfaction_rating_fields(false))
);

static_schema!(
    tags,
    RecordSchema::new(
        "tags",
        vec![req("name", T::String), opt("count", T::Long)]
    )
);

static_schema!(
    ticket_fields,
    RecordSchema::new("ticket_fields", {
        let mut fields = vec![
            req("id", T::Long),
            opt("url", T::String),
            req("type", T::String),
            req("title", T::String),
            opt("raw_title", T::String),
            opt("description", T::String),
            opt("raw_description", T::String),
            opt("position", T::Long),
            opt("active", T::Boolean),
            opt("required", T::Boolean),
            opt("collapsed_for_agents", T::Boolean),
            opt("regexp_for_validation", T::String),
            opt("title_in_portal", T::String),
            opt("raw_title_in_portal", T::String),
            opt("visible_in_portal", T::Boolean),
            opt("editable_in_portal", T::Boolean),
            opt("required_in_portal", T::Boolean),
            opt("tag", T::String),
        ];
        fields.extend(timestamps());
        fields.extend([
            field_option("system_field_options"),
            field_option("custom_field_options"),
            opt("sub_type_id", T::Long),
            opt("removable", T::Boolean),
            opt("agent_description", T::String),
        ]);
        fields
    })
);

static_schema!(
    ticket_metrics,
    RecordSchema::new("ticket_metrics", {
        let mut fields = vec![
            req("id", T::Long),
            opt("ticket_id", T::Long),
            opt("url", T::String),
            opt("group_stations", T::Long),
            opt("assignee_stations", T::Long),
            opt("reopens", T::Long),
            opt("replies", T::Long),
            opt("assignee_updated_at", T::String),
            opt("requester_updated_at", T::String),
            opt("status_updated_at", T::String),
            opt("initially_assigned_at", T::String),
            opt("assigned_at", T::String),
            opt("solved_at", T::String),
            opt("latest_comment_added_at", T::String),
            minutes("first_resolution_time_in_minutes"),
            minutes("reply_time_in_minutes"),
            minutes("full_resolution_time_in_minutes"),
            minutes("agent_wait_time_in_minutes"),
            minutes("requester_wait_time_in_minutes"),
        ];
        fields.extend(timestamps());
        fields
    })
);

static_schema!(
    ticket_metric_events,
    RecordSchema::new(
        "ticket_metric_events",
        vec![
            req("id", T::Long),
            opt("ticket_id", T::Long),
            opt("metric", T::String),
            opt("instance_id", T::Long),
            opt("type", T::String),
            opt("time", T::String),
            opt(
                "sla",
                T::record(
                    "sla_object",
                    vec![
                        opt("target", T::Long),
                        opt("business_hours", T::Boolean),
                        opt(
                            "policy",
                            T::record(
                                "policy_object",
                                vec![
                                    opt("id", T::Long),
                                    opt("title", T::String),
                                    opt("description", T::String),
                                ],
                            ),
                        ),
                    ],
                ),
            ),
            opt(
                "status",
                T::record(
                    "status_object",
                    vec![opt("calendar", T::Long), opt("business", T::Long)],
                ),
            ),
            opt("deleted", T::Boolean),
        ]
    )
);

static_schema!(
    tickets,
    RecordSchema::new("tickets", {
        let mut fields = vec![
            req("id", T::Long),
            opt("url", T::String),
            opt("external_id", T::String),
            opt("type", T::String),
            opt("subject", T::String),
            opt("raw_subject", T::String),
            opt("description", T::String),
            opt("priority", T::String),
            opt("status", T::String),
            opt("recipient", T::String),
            req("requester_id", T::Long),
            opt("submitter_id", T::Long),
            opt("assignee_id", T::Long),
            opt("organization_id", T::Long),
            opt("group_id", T::Long),
            list_long("collaborator_ids"),
            opt(
                "collaborators",
                T::array(T::record(
                    "collaborator",
                    vec![opt("name", T::String), opt("email", T::String)],
                )),
            ),
            list_long("email_cc_ids"),
            list_long("follower_ids"),
            opt("forum_topic_id", T::Long),
            opt("problem_id", T::Long),
            opt("has_incidents", T::Boolean),
            opt("due_at", T::String),
            list_str("tags"),
            via(),
            opt(
                "custom_fields",
                T::array(T::record(
                    "custom_field",
                    vec![opt("id", T::Long), opt("value", T::String)],
                )),
            ),
            opt(
                "satisfaction_rating",
                T::record("satisfaction_rating_object", satisfaction_rating_fields(true)),
            ),
            list_long("sharing_agreement_ids"),
            list_long("followup_ids"),
            opt("via_followup_source_id", T::Long),
            list_long("macro_ids"),
            opt("ticket_form_id", T::Long),
            opt("brand_id", T::Long),
            opt("allow_channelback", T::Boolean),
            opt("allow_attachments", T::Boolean),
            opt("is_public", T::Boolean),
        ];
        fields.extend(timestamps());
        fields
    })
);

static_schema!(
    users,
    RecordSchema::new(
        "users",
        vec![
            req("id", T::Long),
            opt("email", T::String),
            req("name", T::String),
            opt("active", T::Boolean),
            opt("alias", T::String),
            opt("chat_only", T::Boolean),
            opt("created_at", T::String),
            opt("custom_role_id", T::Long),
            opt("role_type", T::Long),
            opt("details", T::String),
            opt("external_id", T::String),
            opt("last_login_at", T::String),
            opt("locale", T::String),
            opt("locale_id", T::Long),
            opt("moderator", T::Boolean),
            opt("notes", T::String),
            opt("only_public_comments", T::Boolean),
            opt("organization_id", T::Long),
            opt("default_group_id", T::Long),
            opt("phone", T::String),
            opt("shared_phone_number", T::Boolean),
            attachment("photo"),
            opt("restricted_agent", T::Boolean),
            opt("role", T::String),
            opt("shared", T::Boolean),
            opt("shared_agent", T::Boolean),
            opt("signature", T::String),
            opt("suspended", T::Boolean),
            list_str("tags"),
            opt("ticket_restriction", T::String),
            opt("time_zone", T::String),
            opt("two_factor_auth_enabled", T::Boolean),
            opt("updated_at", T::String),
            opt("url", T::String),
            opt("user_fields", T::map(T::String)),
            opt("verified", T::Boolean),
            opt("report_csv", T::Boolean),
        ]
    )
);

static_schema!(
    /// Plain (non-incremental) user listing, used to resolve comment authors
    users_simple,
    RecordSchema::new("users_simple", {
        let mut fields = vec![
            req("id", T::Long),
            opt("url", T::String),
            req("name", T::String),
            opt("email", T::String),
            opt("role", T::String),
            opt("locale", T::String),
            opt("time_zone", T::String),
        ];
        fields.extend(timestamps());
        fields
    })
);

fn request_fields() -> Vec<Field> {
    let mut fields = vec![
        req("id", T::Long),
        opt("url", T::String),
        opt("subject", T::String),
        opt("description", T::String),
        opt("status", T::String),
        opt("priority", T::String),
        opt("type", T::String),
        opt("requester_id", T::Long),
        opt("assignee_id", T::Long),
        opt("organization_id", T::Long),
        opt("group_id", T::Long),
        list_long("collaborator_ids"),
        list_long("email_cc_ids"),
        opt("is_public", T::Boolean),
        opt("can_be_solved_by_me", T::Boolean),
        opt("solved", T::Boolean),
        opt("due_at", T::String),
        opt("ticket_form_id", T::Long),
        opt("recipient", T::String),
        via(),
        opt(
            "custom_fields",
            T::array(T::record(
                "custom_field",
                vec![opt("id", T::Long), opt("value", T::String)],
            )),
        ),
    ];
    fields.extend(timestamps());
    fields
}

static_schema!(requests, RecordSchema::new("requests", request_fields()));

fn help_center_comment(name: &str, parent_field: &str) -> RecordSchema {
    let mut fields = vec![
        req("id", T::Long),
        opt("url", T::String),
        opt("html_url", T::String),
        opt("body", T::String),
        opt("author_id", T::Long),
        opt(parent_field, T::Long),
        opt("locale", T::String),
        opt("vote_sum", T::Long),
        opt("vote_count", T::Long),
    ];
    fields.extend(timestamps());
    fields.push(author());
    RecordSchema::new(name, fields)
}

static_schema!(
    article_comments,
    help_center_comment("article_comments", "source_id")
);

static_schema!(
    post_comments,
    help_center_comment("post_comments", "post_id")
);

static_schema!(
    requests_comments,
    RecordSchema::new("requests_comments", {
        let mut fields = vec![
            req("id", T::Long),
            opt("type", T::String),
            opt("request_id", T::Long),
            opt("body", T::String),
            opt("html_body", T::String),
            opt("plain_body", T::String),
            opt("public", T::Boolean),
            opt("author_id", T::Long),
            attachments(),
            opt("created_at", T::String),
        ];
        fields.push(opt(
            "request",
            T::Record(RecordSchema::new("request_object", request_fields())),
        ));
        fields
    })
);
