//! OpenAPI → mock route compilation.

mod compile;
mod synthesize;
mod validate;

pub use compile::{HTTP_METHODS, compile};
pub use synthesize::{MAX_DEPTH, synthesize};
pub use validate::{ValidationReport, validate};

use serde_json::Value;

use crate::error::{Error, Result};

/// Parses an OpenAPI document given as JSON or YAML text.
pub fn parse_document(text: &str) -> Result<Value> {
    let json_err = match serde_json::from_str::<Value>(text) {
        Ok(doc) => return Ok(doc),
        Err(e) => e,
    };
    match serde_yaml::from_str::<Value>(text) {
        Ok(doc) => Ok(doc),
        Err(yaml_err) => Err(Error::MalformedDocument {
            json: json_err.to_string(),
            yaml: yaml_err.to_string(),
        }),
    }
}
