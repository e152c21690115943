//! Example-value synthesis from JSON-schema fragments.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};

const REF_PREFIX: &str = "#/components/schemas/";

/// Nesting limit; deeper fragments synthesize to `null`.
pub const MAX_DEPTH: usize = 64;

/// Builds an example value for `schema`, resolving `$ref`s against the
/// document's `components.schemas`.
///
/// Total over any input: a `$ref` that re-enters a schema already being
/// expanded yields `null` at that point instead of recursing.
pub fn synthesize(schema: &Value, components: Option<&Map<String, Value>>) -> Value {
    let mut synth = Synthesizer {
        components,
        expanding: Vec::new(),
    };
    synth.example(schema, 0)
}

struct Synthesizer<'a> {
    components: Option<&'a Map<String, Value>>,
    expanding: Vec<String>,
}

impl Synthesizer<'_> {
    fn example(&mut self, schema: &Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            tracing::debug!("Schema nesting exceeds {} levels, using null", MAX_DEPTH);
            return Value::Null;
        }
        let Some(obj) = schema.as_object() else {
            return Value::Null;
        };

        if let Some(reference) = obj.get("$ref") {
            return self.resolve(reference, depth);
        }

        let own_example = obj.get("example").filter(|v| !v.is_null());

        match schema_type(obj) {
            Some("object") => {
                let mut out = Map::new();
                if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                    for (name, prop) in props {
                        out.insert(name.clone(), self.example(prop, depth + 1));
                    }
                }
                Value::Object(out)
            }
            Some("array") => match obj.get("items") {
                Some(items) => match self.example(items, depth + 1) {
                    Value::Null => json!([]),
                    item => Value::Array(vec![item]),
                },
                None => json!([]),
            },
            Some("string") => {
                if let Some(first) = first_enum(obj) {
                    return first;
                }
                match obj.get("format").and_then(Value::as_str) {
                    Some("date") => json!(Utc::now().format("%Y-%m-%d").to_string()),
                    Some("date-time") => {
                        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
                    }
                    Some("email") => json!("example@example.com"),
                    Some("uri") => json!("https://example.com"),
                    _ => own_example.cloned().unwrap_or_else(|| json!("string")),
                }
            }
            Some("number") | Some("integer") => first_enum(obj)
                .or_else(|| own_example.cloned())
                .unwrap_or_else(|| json!(0)),
            Some("boolean") => own_example.cloned().unwrap_or(Value::Bool(false)),
            Some("null") => Value::Null,
            Some("oneOf") | Some("anyOf") => {
                let first = ["oneOf", "anyOf"]
                    .iter()
                    .filter_map(|key| obj.get(*key).and_then(Value::as_array))
                    .find_map(|alts| alts.first());
                match first {
                    Some(alt) => self.example(alt, depth + 1),
                    None => Value::Null,
                }
            }
            _ => own_example.cloned().unwrap_or(Value::Null),
        }
    }

    fn resolve(&mut self, reference: &Value, depth: usize) -> Value {
        let Some(name) = reference.as_str().and_then(|r| r.strip_prefix(REF_PREFIX)) else {
            tracing::debug!("Unsupported $ref {}, using null", reference);
            return Value::Null;
        };
        let Some(target) = self.components.and_then(|c| c.get(name)) else {
            tracing::debug!("Unresolved $ref {}, using null", name);
            return Value::Null;
        };
        if self.expanding.iter().any(|n| n == name) {
            tracing::debug!("Cyclic $ref {}, using null", name);
            return Value::Null;
        }

        self.expanding.push(name.to_string());
        let value = self.example(target, depth + 1);
        self.expanding.pop();
        value
    }
}

/// Declared type, or the combinator keyword when no type is given. For 3.1
/// style type arrays the first non-null entry wins.
fn schema_type(obj: &Map<String, Value>) -> Option<&str> {
    match obj.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .or(Some("null")),
        _ if obj.contains_key("oneOf") => Some("oneOf"),
        _ if obj.contains_key("anyOf") => Some("anyOf"),
        _ => None,
    }
}

fn first_enum(obj: &Map<String, Value>) -> Option<Value> {
    obj.get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
        .cloned()
}
