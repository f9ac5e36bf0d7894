//! swarmgate-core
//!
//! Policy-gated tool execution and the orchestration loop for an autonomous
//! agent. Every model-requested tool call passes through a policy gate
//! (allow/deny lists, safety-tier consent, domain policy, argument clamping,
//! rate limiting) before it reaches the sandbox; a per-turn state machine
//! drives streaming, tool execution, synthesis and delegation with a hard
//! cap on model calls.

pub mod catalog;
pub mod config;
pub mod engines;
pub mod error;
pub mod events;
pub mod exec;
pub mod llm;
pub mod orchestrator;
pub mod policy;
pub mod rate_limiter;
pub mod sandbox;
pub mod session;

pub use config::AppConfig;
pub use error::{Result, SwarmError};
pub use events::{SessionUpdate, TurnStage, UpdateSender};
pub use exec::{BatchOutcome, ToolCoordinator};
pub use orchestrator::{TurnOutcome, TurnProcessor};
pub use policy::{GlobalPolicy, PolicyGate};
pub use session::{Session, SessionRegistry};
