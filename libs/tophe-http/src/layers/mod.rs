//! Tower layers used by the default transport.

mod user_agent;

pub use user_agent::{UserAgentLayer, UserAgentService};
