pub mod agent;
pub mod census;

pub use agent::{AgentClient, AgentError, CensusToolDispatcher, ToolDispatcher};
pub use census::{build_predicate, call_tool, GeoPredicate, McpClient, CENSUS_TOOL};
