//! Page-scoped interception agent: answers loopback requests from the route
//! list it was last sent.

mod host;
mod interceptor;
mod protocol;

pub use host::{AgentHandle, AgentHost, AgentLifecycle, AgentRegistration, LocalAgentHost};
pub use interceptor::{AgentState, FetchDisposition, InterceptionAgent, PendingResponse};
pub use protocol::{AgentEvent, AgentMessage, InterceptedRequest};
