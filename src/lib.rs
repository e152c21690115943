//! Mock HTTP server core: compiles OpenAPI documents into mock routes and
//! answers requests either from a real loopback listener or from an
//! in-page interception agent.

pub mod agent;
pub mod backend;
pub mod config;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod openapi;
pub mod persist;
pub mod responder;
pub mod server;
pub mod store;

pub use error::{Error, Result};
pub use models::{MockBody, MockRoute, MockServerStatus};
pub use store::RouteStore;
