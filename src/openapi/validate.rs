use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Checks that `document` looks like a usable OpenAPI 3.x definition.
///
/// Every violation is reported. A `swagger` marker counts as "this is an API
/// schema" but only `openapi: 3.x` passes the version check.
pub fn validate(document: Option<&Value>) -> ValidationReport {
    let doc = match document {
        Some(doc) if !doc.is_null() => doc,
        _ => return ValidationReport::from_errors(vec!["schema must not be empty".to_string()]),
    };

    let mut errors = Vec::new();

    let openapi = doc.get("openapi").filter(|v| !v.is_null());
    let swagger = doc.get("swagger").filter(|v| !v.is_null());

    if openapi.is_none() && swagger.is_none() {
        errors.push("schema must declare an OpenAPI 3.x or Swagger 2.0 version".to_string());
    }

    if let Some(version) = openapi {
        let supported = version.as_str().is_some_and(|v| v.starts_with("3."));
        if !supported {
            let shown = version
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| version.to_string());
            errors.push(format!(
                "OpenAPI version {} is not supported, only OpenAPI 3.x",
                shown
            ));
        }
    }

    let has_paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .is_some_and(|paths| !paths.is_empty());
    if !has_paths {
        errors.push("schema must have at least one path".to_string());
    }

    ValidationReport::from_errors(errors)
}
