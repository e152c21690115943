//! Ordered, editable list of mock routes.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::MockRoute;
use crate::openapi;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteStore {
    routes: Vec<MockRoute>,
}

/// What an import did to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub compiled: usize,
    pub added: usize,
}

impl RouteStore {
    pub fn new(routes: Vec<MockRoute>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[MockRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn into_inner(self) -> Vec<MockRoute> {
        self.routes
    }

    pub fn add(&mut self, route: MockRoute) {
        self.routes.push(route);
    }

    /// Replaces the route at `index`, returning the previous one.
    pub fn update(&mut self, index: usize, route: MockRoute) -> Result<MockRoute> {
        let len = self.routes.len();
        let slot = self
            .routes
            .get_mut(index)
            .ok_or(Error::RouteIndex { index, len })?;
        Ok(std::mem::replace(slot, route))
    }

    pub fn remove(&mut self, index: usize) -> Result<MockRoute> {
        if index >= self.routes.len() {
            return Err(Error::RouteIndex {
                index,
                len: self.routes.len(),
            });
        }
        Ok(self.routes.remove(index))
    }

    /// Appends routes whose (method, path) is not present yet. Existing
    /// entries are never touched. Returns how many were added.
    pub fn merge_import(&mut self, routes: impl IntoIterator<Item = MockRoute>) -> usize {
        let mut seen: HashSet<(String, String)> =
            self.routes.iter().map(MockRoute::import_key).collect();
        let before = self.routes.len();
        for route in routes {
            if seen.insert(route.import_key()) {
                self.routes.push(route);
            } else {
                tracing::debug!("Skipping duplicate route {} {}", route.method, route.path);
            }
        }
        self.routes.len() - before
    }

    /// Merges a JSON array of routes. Nothing changes if the text does not
    /// parse.
    pub fn import_json(&mut self, text: &str) -> Result<usize> {
        let routes: Vec<MockRoute> = serde_json::from_str(text).map_err(Error::MalformedRoutes)?;
        Ok(self.merge_import(routes))
    }

    /// Parses, validates and compiles an OpenAPI document, then merges the
    /// resulting routes.
    pub fn import_openapi(&mut self, text: &str) -> Result<ImportOutcome> {
        let document = openapi::parse_document(text)?;
        self.import_openapi_value(&document)
    }

    pub fn import_openapi_value(&mut self, document: &serde_json::Value) -> Result<ImportOutcome> {
        let report = openapi::validate(Some(document));
        if !report.valid {
            return Err(Error::InvalidSchema(report.errors));
        }
        let compiled = openapi::compile(document);
        let outcome = ImportOutcome {
            compiled: compiled.len(),
            added: self.merge_import(compiled),
        };
        tracing::info!(
            "Imported {} of {} routes from OpenAPI document",
            outcome.added,
            outcome.compiled
        );
        Ok(outcome)
    }
}

impl From<Vec<MockRoute>> for RouteStore {
    fn from(routes: Vec<MockRoute>) -> Self {
        Self::new(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MockBody;
    use serde_json::json;

    fn store() -> RouteStore {
        RouteStore::new(vec![
            MockRoute::new("GET", "/a"),
            MockRoute::new("POST", "/b"),
            MockRoute::new("GET", "/c"),
        ])
    }

    #[test]
    fn update_and_remove_by_index() {
        let mut store = store();
        let old = store.update(1, MockRoute::new("PUT", "/b")).unwrap();
        assert_eq!(old.method, "POST");
        assert_eq!(store.routes()[1].method, "PUT");

        let removed = store.remove(0).unwrap();
        assert_eq!(removed.path, "/a");
        let paths: Vec<_> = store.routes().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/b", "/c"]);
    }

    #[test]
    fn out_of_range_indices_fail() {
        let mut store = store();
        assert!(matches!(
            store.remove(3),
            Err(Error::RouteIndex { index: 3, len: 3 })
        ));
        assert!(store.update(9, MockRoute::new("GET", "/x")).is_err());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn merge_skips_existing_and_keeps_original() {
        let mut store = RouteStore::new(vec![
            MockRoute::new("GET", "/users").with_body(json!({ "mine": true })),
        ]);
        let added = store.merge_import(vec![
            MockRoute::new("GET", "/users").with_body(json!({ "theirs": true })),
            MockRoute::new("POST", "/users"),
            MockRoute::new("POST", "/users"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.routes()[0].body, MockBody::Json(json!({ "mine": true })));
    }

    #[test]
    fn malformed_json_import_leaves_store_untouched() {
        let mut store = store();
        let before = store.clone();
        let err = store.import_json("[{\"path\": ").unwrap_err();
        assert!(matches!(err, Error::MalformedRoutes(_)));
        assert_eq!(store, before);
    }

    #[test]
    fn json_import_defaults_unusable_status_and_delay() {
        let mut store = RouteStore::default();
        let added = store
            .import_json(
                r#"[
                    {"path": "/null", "method": "GET", "status": null, "delayMs": null},
                    {"path": "/negative", "method": "GET", "status": -1, "delayMs": -10},
                    {"path": "/text", "method": "GET", "status": "abc"},
                    {"path": "/huge", "method": "GET", "status": 70000}
                ]"#,
            )
            .unwrap();
        assert_eq!(added, 4);
        assert!(store.routes().iter().all(|r| r.status == 200 && r.delay_ms == 0));
    }

    #[test]
    fn openapi_import_merges_without_duplicates() {
        let mut store = RouteStore::new(vec![MockRoute::new("GET", "/users").with_status(418)]);
        let doc = json!({
            "openapi": "3.0.0",
            "paths": { "/users": { "get": {}, "post": {} } }
        });
        let outcome = store.import_openapi(&doc.to_string()).unwrap();
        assert_eq!(outcome, ImportOutcome { compiled: 2, added: 1 });
        assert_eq!(store.routes()[0].status, 418);
        assert_eq!(store.routes()[1].method, "POST");
    }

    #[test]
    fn invalid_schema_is_not_imported() {
        let mut store = store();
        let err = store
            .import_openapi(r#"{ "openapi": "2.0", "paths": {} }"#)
            .unwrap_err();
        match err {
            Error::InvalidSchema(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(store.len(), 3);
    }
}
