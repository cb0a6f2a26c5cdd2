//! Join enrichment: a primary record stream whose items reference records of
//! a secondary stream, resolved through a lazily filled lookup table.

use deskline_core::FetchError;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::config::FetchConfig;
use crate::object::{JoinSpec, ObjectKind};
use crate::pager::{HttpPageSource, PageSource, PagedFetcher, RecordStream};

/// Lookup key of a reference value; numbers and strings compare by text.
fn lookup_key(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

pub struct JoinFetcher<P: PageSource = HttpPageSource, S: PageSource = HttpPageSource> {
    primary: PagedFetcher<P>,
    secondary: PagedFetcher<S>,
    join: JoinSpec,
    lookup: FxHashMap<String, Value>,
    secondary_exhausted: bool,
    unresolved: usize,
}

impl JoinFetcher<HttpPageSource, HttpPageSource> {
    pub fn new(
        config: &FetchConfig,
        kind: ObjectKind,
        join: JoinSpec,
        subdomain: &str,
    ) -> Result<Self, FetchError> {
        let primary = PagedFetcher::new(config, kind, subdomain)?;
        let secondary = PagedFetcher::new(config, join.secondary, subdomain)?;
        Ok(Self::with_fetchers(primary, secondary, join))
    }
}

impl<P: PageSource, S: PageSource> JoinFetcher<P, S> {
    pub fn with_fetchers(primary: PagedFetcher<P>, secondary: PagedFetcher<S>, join: JoinSpec) -> Self {
        Self {
            primary,
            secondary,
            join,
            lookup: FxHashMap::default(),
            secondary_exhausted: false,
            unresolved: 0,
        }
    }

    pub fn has_next(&mut self) -> Result<bool, FetchError> {
        self.primary.has_next()
    }

    /// Next primary record, with the referenced secondary record inserted
    /// under the join's target field when it can be found.
    pub fn next_item(&mut self) -> Result<Value, FetchError> {
        let mut item = self.primary.next_item()?;
        let Some(key) = item.get(self.join.key_field).and_then(lookup_key) else {
            log::debug!(
                "{}: record has no '{}', not enriched",
                self.primary.kind(),
                self.join.key_field
            );
            return Ok(item);
        };
        match self.resolve(&key)? {
            Some(found) => {
                if let Value::Object(map) = &mut item {
                    map.insert(self.join.target_field.to_string(), found);
                }
            }
            None => {
                self.unresolved += 1;
                log::debug!(
                    "{}: no {} with {} = {key}",
                    self.primary.kind(),
                    self.join.secondary,
                    self.join.id_field
                );
            }
        }
        Ok(item)
    }

    /// Look `key` up, pulling secondary records until it appears or the
    /// secondary stream runs out.
    fn resolve(&mut self, key: &str) -> Result<Option<Value>, FetchError> {
        if let Some(found) = self.lookup.get(key) {
            return Ok(Some(found.clone()));
        }
        while !self.secondary_exhausted {
            if !self.secondary.has_next()? {
                self.secondary_exhausted = true;
                log::debug!(
                    "{}: exhausted after {} records",
                    self.join.secondary,
                    self.lookup.len()
                );
                break;
            }
            let record = self.secondary.next_item()?;
            let Some(id) = record.get(self.join.id_field).and_then(lookup_key) else {
                continue;
            };
            let hit = id == key;
            self.lookup.insert(id, record);
            if hit {
                return Ok(self.lookup.get(key).cloned());
            }
        }
        Ok(None)
    }

    /// Primary records emitted without enrichment because no match was found
    pub fn unresolved(&self) -> usize {
        self.unresolved
    }

    pub fn close(&mut self) {
        self.primary.close();
        self.secondary.close();
        self.lookup.clear();
    }
}

impl<P: PageSource, S: PageSource> RecordStream for JoinFetcher<P, S> {
    fn has_next(&mut self) -> Result<bool, FetchError> {
        JoinFetcher::has_next(self)
    }

    fn next_item(&mut self) -> Result<Value, FetchError> {
        JoinFetcher::next_item(self)
    }

    fn close(&mut self) {
        JoinFetcher::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::tests::{ScriptedSource, fetcher};
    use serde_json::json;

    fn author_join() -> JoinSpec {
        ObjectKind::ArticleComments.descriptor().join.unwrap()
    }

    fn users(source: ScriptedSource) -> PagedFetcher<ScriptedSource> {
        fetcher(ObjectKind::UsersSimple, source, "u1")
    }

    fn comments(source: ScriptedSource) -> PagedFetcher<ScriptedSource> {
        fetcher(ObjectKind::ArticleComments, source, "c1")
    }

    fn drain(join: &mut JoinFetcher<ScriptedSource, ScriptedSource>) -> Vec<Value> {
        let mut out = Vec::new();
        while join.has_next().unwrap() {
            out.push(join.next_item().unwrap());
        }
        out
    }

    #[test]
    fn enriches_from_secondary() {
        let primary = ScriptedSource::default().page(
            "c1",
            Ok(json!({"comments": [
                {"id": 1, "author_id": 10},
                {"id": 2, "author_id": 20},
                {"id": 3, "author_id": 10}
            ]})),
        );
        let secondary = ScriptedSource::default()
            .page("u1", Ok(json!({"users": [{"id": 10, "name": "a"}], "next_page": "u2"})))
            .page("u2", Ok(json!({"users": [{"id": 20, "name": "b"}]})));
        let mut join =
            JoinFetcher::with_fetchers(comments(primary), users(secondary.clone()), author_join());

        let items = drain(&mut join);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["author"]["name"], "a");
        assert_eq!(items[1]["author"]["name"], "b");
        assert_eq!(items[2]["author"]["name"], "a");
        // third item resolved from the table, no refetch
        assert_eq!(secondary.requested(), ["u1", "u2"]);
        assert_eq!(join.unresolved(), 0);
    }

    #[test]
    fn secondary_pulled_lazily() {
        let primary = ScriptedSource::default()
            .page("c1", Ok(json!({"comments": [{"id": 1, "author_id": 10}]})));
        let secondary = ScriptedSource::default()
            .page("u1", Ok(json!({"users": [{"id": 10}], "next_page": "u2"})))
            .page("u2", Ok(json!({"users": [{"id": 20}]})));
        let mut join =
            JoinFetcher::with_fetchers(comments(primary), users(secondary.clone()), author_join());
        drain(&mut join);
        assert_eq!(secondary.requested(), ["u1"]);
    }

    #[test]
    fn missing_reference_leaves_field_absent() {
        let primary = ScriptedSource::default().page(
            "c1",
            Ok(json!({"comments": [
                {"id": 1, "author_id": 99},
                {"id": 2},
                {"id": 3, "author_id": null},
                {"id": 4, "author_id": 10}
            ]})),
        );
        let secondary = ScriptedSource::default()
            .page("u1", Ok(json!({"users": [{"id": 10, "name": "a"}]})));
        let mut join = JoinFetcher::with_fetchers(comments(primary), users(secondary), author_join());

        let items = drain(&mut join);
        assert_eq!(items.len(), 4);
        assert!(items[0].get("author").is_none());
        assert!(items[1].get("author").is_none());
        assert!(items[2].get("author").is_none());
        // secondary is exhausted but everything seen is still in the table
        assert_eq!(items[3]["author"]["name"], "a");
        assert_eq!(join.unresolved(), 1);
    }

    #[test]
    fn string_and_number_keys_match() {
        let primary = ScriptedSource::default()
            .page("c1", Ok(json!({"comments": [{"id": 1, "author_id": "10"}]})));
        let secondary = ScriptedSource::default().page("u1", Ok(json!({"users": [{"id": 10}]})));
        let mut join = JoinFetcher::with_fetchers(comments(primary), users(secondary), author_join());
        let items = drain(&mut join);
        assert_eq!(items[0]["author"]["id"], 10);
    }

    #[test]
    fn secondary_failure_propagates() {
        let primary = ScriptedSource::default()
            .page("c1", Ok(json!({"comments": [{"id": 1, "author_id": 10}]})));
        let secondary = ScriptedSource::default().page("u1", Err(FetchError::http(403, "forbidden")));
        let mut join = JoinFetcher::with_fetchers(comments(primary), users(secondary), author_join());
        assert!(join.has_next().unwrap());
        let err = join.next_item().unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn close_closes_both() {
        let primary = ScriptedSource::default();
        let secondary = ScriptedSource::default();
        let mut join = JoinFetcher::with_fetchers(
            comments(primary.clone()),
            users(secondary.clone()),
            author_join(),
        );
        join.close();
        assert_eq!(*primary.closed.lock().unwrap(), 1);
        assert_eq!(*secondary.closed.lock().unwrap(), 1);
        assert!(!join.has_next().unwrap());
    }
}
