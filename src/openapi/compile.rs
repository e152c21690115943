use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::synthesize::synthesize;
use crate::models::{DEFAULT_STATUS, MockBody, MockRoute};

pub const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Compiles an OpenAPI document into one mock route per (path, method).
///
/// Does not validate. Unknown keys under a path item (`parameters`,
/// `summary`, ...) and non-object entries are skipped, so malformed input
/// produces fewer routes rather than an error. Routes come out in document
/// order.
pub fn compile(document: &Value) -> Vec<MockRoute> {
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };
    let components = document
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object);

    let mut routes = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for (key, operation) in item {
            let method = key.to_uppercase();
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }
            let Some(operation) = operation.as_object() else {
                continue;
            };
            routes.push(compile_operation(path, &method, operation, components));
        }
    }

    tracing::debug!("Compiled {} routes from OpenAPI document", routes.len());
    routes
}

fn compile_operation(
    path: &str,
    method: &str,
    operation: &Map<String, Value>,
    components: Option<&Map<String, Value>>,
) -> MockRoute {
    let mut status = DEFAULT_STATUS;
    let mut media_type = DEFAULT_MEDIA_TYPE.to_string();
    let mut body = None;

    if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
        let key = responses
            .keys()
            .find(|k| k.starts_with('2') || k.as_str() == "default")
            .map(String::as_str)
            .unwrap_or("200");
        status = key.parse().unwrap_or(DEFAULT_STATUS);

        let response = responses
            .get(key)
            .filter(|r| !r.is_null())
            .or_else(|| responses.get("200"));

        if let Some(content) = response
            .and_then(|r| r.get("content"))
            .and_then(Value::as_object)
        {
            if let Some((first, entry)) = content.iter().next() {
                media_type = first.clone();
                body = Some(content_example(entry, components));
            } else {
                body = Some(json!({}));
            }
        }
    }

    let body = body.unwrap_or_else(|| default_body(path, method, operation));

    MockRoute {
        path: path.to_string(),
        method: method.to_string(),
        status,
        headers: HashMap::from([("Content-Type".to_string(), media_type)]),
        body: MockBody::from(body),
        delay_ms: 0,
    }
}

/// `example`, then the first of `examples`, then a synthesized value.
fn content_example(entry: &Value, components: Option<&Map<String, Value>>) -> Value {
    if let Some(example) = entry.get("example").filter(|v| !v.is_null()) {
        return example.clone();
    }
    if let Some(first) = entry
        .get("examples")
        .and_then(Value::as_object)
        .and_then(|examples| examples.values().next())
    {
        return first.clone();
    }
    if let Some(schema) = entry.get("schema").filter(|v| !v.is_null()) {
        return synthesize(schema, components);
    }
    json!({})
}

fn default_body(path: &str, method: &str, operation: &Map<String, Value>) -> Value {
    let message = operation
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {} response", method, path));
    json!({ "message": message, "data": null })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_example_and_first_success_status() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {
                "/users": {
                    "get": {
                        "summary": "Get users",
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {
                                        "schema": { "type": "object" },
                                        "example": { "users": [] }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
        let routes = compile(&doc);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/users");
        assert_eq!(routes[0].method, "GET");
        assert_eq!(routes[0].status, 200);
        assert_eq!(routes[0].body, MockBody::Json(json!({ "users": [] })));
        assert_eq!(routes[0].headers["Content-Type"], "application/json");
        assert_eq!(routes[0].delay_ms, 0);
    }

    #[test]
    fn status_selection() {
        let doc = json!({
            "paths": {
                "/a": { "post": { "responses": { "400": {}, "201": {}, "200": {} } } },
                "/b": { "get": { "responses": { "default": {} } } },
                "/c": { "get": { "responses": { "404": {} } } }
            }
        });
        let routes = compile(&doc);
        assert_eq!(routes[0].status, 201);
        assert_eq!(routes[1].status, 200);
        assert_eq!(routes[2].status, 200);
    }

    #[test]
    fn skips_non_method_keys() {
        let doc = json!({
            "paths": {
                "/items": {
                    "parameters": [{ "name": "q" }],
                    "summary": "items",
                    "get": {},
                    "trace": {},
                    "Delete": {}
                }
            }
        });
        let methods: Vec<_> = compile(&doc).into_iter().map(|r| r.method).collect();
        assert_eq!(methods, vec!["GET", "DELETE"]);
    }

    #[test]
    fn preserves_document_order() {
        let doc = json!({
            "paths": {
                "/z": { "put": {}, "get": {} },
                "/a": { "delete": {} }
            }
        });
        let keys: Vec<_> = compile(&doc)
            .into_iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect();
        assert_eq!(keys, vec!["PUT /z", "GET /z", "DELETE /a"]);
    }

    #[test]
    fn default_body_without_content() {
        let doc = json!({
            "paths": {
                "/ping": {
                    "get": { "summary": "Ping it" },
                    "head": { "responses": { "204": { "description": "empty" } } }
                }
            }
        });
        let routes = compile(&doc);
        assert_eq!(
            routes[0].body,
            MockBody::Json(json!({ "message": "Ping it", "data": null }))
        );
        assert_eq!(routes[1].status, 204);
        assert_eq!(
            routes[1].body,
            MockBody::Json(json!({ "message": "HEAD /ping response", "data": null }))
        );
    }

    #[test]
    fn uses_first_media_type_and_named_examples() {
        let doc = json!({
            "paths": {
                "/doc": {
                    "get": {
                        "responses": {
                            "200": {
                                "content": {
                                    "text/plain": { "examples": { "first": "hello", "second": "bye" } },
                                    "application/json": { "example": {} }
                                }
                            }
                        }
                    }
                }
            }
        });
        let route = &compile(&doc)[0];
        assert_eq!(route.headers["Content-Type"], "text/plain");
        assert_eq!(route.body, MockBody::Text("hello".into()));
    }

    #[test]
    fn synthesizes_from_schema_refs() {
        let doc = json!({
            "paths": {
                "/pets": {
                    "get": {
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {
                                        "schema": { "type": "array", "items": { "$ref": "#/components/schemas/Pet" } }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Pet": { "type": "object", "properties": { "name": { "type": "string" } } }
                }
            }
        });
        assert_eq!(compile(&doc)[0].body, MockBody::Json(json!([{ "name": "string" }])));
    }

    #[test]
    fn swagger_documents_compile_permissively() {
        let doc = json!({
            "swagger": "2.0",
            "paths": { "/legacy": { "get": { "responses": { "200": { "schema": { "type": "string" } } } } } }
        });
        let routes = compile(&doc);
        assert_eq!(routes.len(), 1);
        assert_eq!(
            routes[0].body,
            MockBody::Json(json!({ "message": "GET /legacy response", "data": null }))
        );
        assert!(compile(&json!({ "swagger": "2.0" })).is_empty());
    }
}
