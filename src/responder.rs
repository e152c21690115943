//! Turns a matched [`MockRoute`] (or a miss) into a concrete HTTP response.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::models::MockRoute;

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub reason: &'static str,
    pub headers: HeaderMap,
    pub body: String,
}

impl MockResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Reason phrases for the handful of codes mocks commonly use. Anything
/// else reads "OK".
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

/// Status to send for a route; zero or out-of-range codes become 200.
pub fn effective_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::OK)
}

pub fn respond(route: &MockRoute) -> MockResponse {
    let status = effective_status(route.status);
    let mut headers = HeaderMap::new();

    for (key, value) in &route.headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Skipping invalid header {}: {}", key, value),
        }
    }

    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    MockResponse {
        status,
        reason: reason_phrase(status.as_u16()),
        headers,
        body: route.body.render(),
    }
}

pub fn not_found(method: &str, path: &str) -> MockResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    MockResponse {
        status: StatusCode::NOT_FOUND,
        reason: reason_phrase(404),
        headers,
        body: json!({
            "error": "Route not found",
            "path": path,
            "method": method,
        })
        .to_string(),
    }
}
