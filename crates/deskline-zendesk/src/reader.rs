//! Schema-projecting record reader over a plain or joined fetcher

use std::sync::Arc;

use deskline_core::FetchError;
use serde_json::{Map, Value};

use crate::config::FetchConfig;
use crate::join::JoinFetcher;
use crate::object::ObjectKind;
use crate::pager::{PagedFetcher, RecordStream};
use crate::schema::RecordSchema;

/// Output record: declared fields only, in schema order
pub type Record = Map<String, Value>;

pub struct RecordReader {
    kind: ObjectKind,
    schema: Arc<RecordSchema>,
    stream: Box<dyn RecordStream + Send>,
    records: usize,
}

impl std::fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("kind", &self.kind)
            .field("schema", &self.schema.name)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl RecordReader {
    /// Reader for `kind` on `subdomain`; kinds with a join get a [`JoinFetcher`].
    pub fn new(
        config: &FetchConfig,
        kind: ObjectKind,
        subdomain: &str,
        schema: Arc<RecordSchema>,
    ) -> Result<Self, FetchError> {
        let stream: Box<dyn RecordStream + Send> = match kind.descriptor().join {
            Some(join) => Box::new(JoinFetcher::new(config, kind, join, subdomain)?),
            None => Box::new(PagedFetcher::new(config, kind, subdomain)?),
        };
        Ok(Self::from_stream(kind, schema, stream))
    }

    pub fn from_stream(
        kind: ObjectKind,
        schema: Arc<RecordSchema>,
        stream: Box<dyn RecordStream + Send>,
    ) -> Self {
        Self {
            kind,
            schema,
            stream,
            records: 0,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Records produced so far
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn has_next(&mut self) -> Result<bool, FetchError> {
        self.stream.has_next()
    }

    pub fn next_record(&mut self) -> Result<Record, FetchError> {
        let value = self.stream.next_item()?;
        self.records += 1;
        Ok(self.schema.project(&value))
    }

    pub fn close(&mut self) {
        self.stream.close();
    }
}

impl Iterator for RecordReader {
    type Item = Result<Record, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => match self.next_record() {
                Ok(record) => Some(Ok(record)),
                Err(e) => {
                    self.close();
                    Some(Err(e))
                }
            },
            Ok(false) => None,
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::tests::{ScriptedSource, fetcher};
    use serde_json::json;

    #[test]
    fn projects_plain_records() {
        let source = ScriptedSource::default().page(
            "t1",
            Ok(json!({"tags": [
                {"name": "vip", "count": 3, "extra": 1},
                {"name": "billing"}
            ]})),
        );
        let stream = fetcher(ObjectKind::Tags, source, "t1");
        let reader = RecordReader::from_stream(
            ObjectKind::Tags,
            Arc::clone(ObjectKind::Tags.schema()),
            Box::new(stream),
        );
        let records: Vec<Record> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(
            records.into_iter().map(Value::Object).collect::<Vec<_>>(),
            [
                json!({"name": "vip", "count": 3}),
                json!({"name": "billing", "count": null})
            ]
        );
    }

    #[test]
    fn projects_joined_records() {
        let comments = ScriptedSource::default().page(
            "r1",
            Ok(json!({"comments": [{"id": 5, "request_id": 7, "body": "hi", "secret": 1}]})),
        );
        let requests = ScriptedSource::default().page(
            "q1",
            Ok(json!({"requests": [{"id": 7, "subject": "printer", "internal": true}]})),
        );
        let kind = ObjectKind::RequestsComments;
        let join = JoinFetcher::with_fetchers(
            fetcher(kind, comments, "r1"),
            fetcher(ObjectKind::Requests, requests, "q1"),
            kind.descriptor().join.unwrap(),
        );
        let mut reader = RecordReader::from_stream(kind, Arc::clone(kind.schema()), Box::new(join));

        assert!(reader.has_next().unwrap());
        let record = reader.next_record().unwrap();
        assert_eq!(record["body"], "hi");
        assert!(record.get("secret").is_none());
        assert_eq!(record["request"]["subject"], "printer");
        assert!(record["request"].get("internal").is_none());
        assert_eq!(record["request"]["status"], Value::Null);
        assert!(!reader.has_next().unwrap());
        assert_eq!(reader.records(), 1);
    }

    #[test]
    fn custom_schema_projection() {
        let source = ScriptedSource::default()
            .page("g1", Ok(json!({"groups": [{"id": 1, "name": "Support", "deleted": false}]})));
        let schema = crate::schema::parse_json(
            r#"{"type":"record","name":"g","fields":[{"name":"name","type":"string"}]}"#,
        )
        .unwrap();
        let reader = RecordReader::from_stream(
            ObjectKind::Groups,
            Arc::new(schema),
            Box::new(fetcher(ObjectKind::Groups, source, "g1")),
        );
        let records: Vec<Record> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(Value::Object(records[0].clone()), json!({"name": "Support"}));
    }

    #[test]
    fn error_stops_iteration() {
        let source = ScriptedSource::default().page("t1", Err(FetchError::http(401, "bad auth")));
        let reader = RecordReader::from_stream(
            ObjectKind::Tags,
            Arc::clone(ObjectKind::Tags.schema()),
            Box::new(fetcher(ObjectKind::Tags, source, "t1")),
        );
        let results: Vec<_> = reader.collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn secondary_failure_stops_iteration() {
        let comments = ScriptedSource::default().page(
            "r1",
            Ok(json!({"comments": [
                {"id": 5, "request_id": 7, "body": "first"},
                {"id": 6, "request_id": 8, "body": "second"}
            ]})),
        );
        let requests =
            ScriptedSource::default().page("q1", Err(FetchError::http(403, "forbidden")));
        let kind = ObjectKind::RequestsComments;
        let join = JoinFetcher::with_fetchers(
            fetcher(kind, comments.clone(), "r1"),
            fetcher(ObjectKind::Requests, requests, "q1"),
            kind.descriptor().join.unwrap(),
        );
        let reader = RecordReader::from_stream(kind, Arc::clone(kind.schema()), Box::new(join));

        let results: Vec<_> = reader.collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap_err().status(), Some(403));
        assert_eq!(*comments.closed.lock().unwrap(), 1);
    }
}
