use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The native shell control surface is not present in this process.
    #[error("native integration unavailable: no native shell is attached")]
    NativeUnavailable,

    /// The host cannot run an interception agent at all.
    #[error("interception agent not supported in this environment")]
    AgentUnsupported,

    #[error("failed to install interception agent: {0}")]
    AgentInstall(String),

    #[error("interception agent error: {0}")]
    Agent(String),

    #[error("mock server is not running")]
    NotRunning,

    #[error("route index {index} out of range (have {len} routes)")]
    RouteIndex { index: usize, len: usize },

    #[error("malformed route list: {0}")]
    MalformedRoutes(#[source] serde_json::Error),

    #[error("malformed document: not JSON ({json}) and not YAML ({yaml})")]
    MalformedDocument { json: String, yaml: String },

    #[error("invalid OpenAPI schema: {}", .0.join(", "))]
    InvalidSchema(Vec<String>),

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("persisted state error: {0}")]
    Persist(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors meaning "this capability does not exist here", which
    /// callers usually treat as "not running" instead of a hard failure.
    pub fn is_environment_unavailable(&self) -> bool {
        matches!(self, Error::NativeUnavailable | Error::AgentUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_errors_are_distinguishable() {
        assert!(Error::NativeUnavailable.is_environment_unavailable());
        assert!(Error::AgentUnsupported.is_environment_unavailable());
        assert!(!Error::NotRunning.is_environment_unavailable());
        assert!(Error::NativeUnavailable.to_string().contains("native integration unavailable"));
    }

    #[test]
    fn invalid_schema_lists_every_error() {
        let err = Error::InvalidSchema(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid OpenAPI schema: a, b");
    }
}
