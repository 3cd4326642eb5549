pub mod agent;
pub mod span;
pub mod trace;

pub use agent::{AgentInstructions, AgentPerformance};
pub use span::Span;
pub use trace::{Trace, TraceSummary};
