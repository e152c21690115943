use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STATUS: u16 = 200;

/// A canned response body: strings are sent verbatim, anything else is
/// serialized as JSON.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MockBody {
    Text(String),
    Json(Value),
}

impl Default for MockBody {
    fn default() -> Self {
        MockBody::Json(Value::Null)
    }
}

impl From<Value> for MockBody {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => MockBody::Text(s),
            other => MockBody::Json(other),
        }
    }
}

impl MockBody {
    /// Wire form of the body. An absent body renders as `{}`.
    pub fn render(&self) -> String {
        match self {
            MockBody::Text(s) => s.clone(),
            MockBody::Json(Value::Null) => "{}".to_string(),
            MockBody::Json(v) => v.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MockRoute {
    pub path: String,
    pub method: String,
    #[serde(default = "default_status", deserialize_with = "lenient_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: MockBody,
    #[serde(default, deserialize_with = "lenient_delay")]
    pub delay_ms: u64,
}

fn default_status() -> u16 {
    DEFAULT_STATUS
}

/// Integer, or a string holding one. Anything else is treated as unset.
fn loose_integer(value: Option<Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_status<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(loose_integer(raw)
        .and_then(|n| u16::try_from(n).ok())
        .unwrap_or(DEFAULT_STATUS))
}

fn lenient_delay<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(loose_integer(raw)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0))
}

impl MockRoute {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            status: DEFAULT_STATUS,
            headers: HashMap::new(),
            body: MockBody::default(),
            delay_ms: 0,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<MockBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Key used to detect duplicates when importing: method and path exactly
    /// as stored.
    pub fn import_key(&self) -> (String, String) {
        (self.method.clone(), self.path.clone())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MockServerStatus {
    pub running: bool,
    pub port: u16,
}

impl Default for MockServerStatus {
    fn default() -> Self {
        Self {
            running: false,
            port: DEFAULT_PORT,
        }
    }
}

impl MockServerStatus {
    pub fn running(port: u16) -> Self {
        Self {
            running: true,
            port,
        }
    }

    pub fn stopped(port: u16) -> Self {
        Self {
            running: false,
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn route_defaults_when_fields_missing() {
        let route: MockRoute = serde_json::from_value(json!({
            "path": "users",
            "method": "get"
        }))
        .unwrap();
        assert_eq!(route.status, 200);
        assert_eq!(route.delay_ms, 0);
        assert!(route.headers.is_empty());
        assert_eq!(route.body, MockBody::Json(Value::Null));
    }

    #[test]
    fn unusable_status_falls_back_to_200() {
        for status in [json!(null), json!(-1), json!(70000), json!("abc"), json!(2.5), json!({})] {
            let route: MockRoute = serde_json::from_value(json!({
                "path": "/a",
                "method": "GET",
                "status": status
            }))
            .unwrap();
            assert_eq!(route.status, 200, "status {}", status);
        }

        let route: MockRoute =
            serde_json::from_str(r#"{"path":"/a","method":"GET","status":" 404 "}"#).unwrap();
        assert_eq!(route.status, 404);
    }

    #[test]
    fn unusable_delay_falls_back_to_zero() {
        for delay in [json!(null), json!(-5), json!("soon"), json!(1.5)] {
            let route: MockRoute = serde_json::from_value(json!({
                "path": "/a",
                "method": "GET",
                "delayMs": delay
            }))
            .unwrap();
            assert_eq!(route.delay_ms, 0, "delay {}", delay);
        }

        let route: MockRoute =
            serde_json::from_str(r#"{"path":"/a","method":"GET","delayMs":"250"}"#).unwrap();
        assert_eq!(route.delay_ms, 250);
    }

    #[test]
    fn delay_uses_camel_case_on_the_wire() {
        let route = MockRoute::new("GET", "/slow").with_delay(50);
        let wire = serde_json::to_value(&route).unwrap();
        assert_eq!(wire["delayMs"], 50);
    }

    #[test]
    fn string_bodies_stay_verbatim() {
        let route: MockRoute = serde_json::from_value(json!({
            "path": "/raw",
            "method": "GET",
            "body": "<xml/>"
        }))
        .unwrap();
        assert_eq!(route.body, MockBody::Text("<xml/>".into()));
        assert_eq!(route.body.render(), "<xml/>");
    }

    #[test]
    fn structured_bodies_serialize() {
        let body = MockBody::Json(json!({ "id": 1 }));
        assert_eq!(body.render(), r#"{"id":1}"#);
        assert_eq!(MockBody::default().render(), "{}");
    }

    #[test]
    fn status_defaults_to_stopped_on_3000() {
        assert_eq!(
            MockServerStatus::default(),
            MockServerStatus {
                running: false,
                port: 3000
            }
        );
    }
}
