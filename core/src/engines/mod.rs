//! Leaf engines supporting the policy gate and orchestration loop
//!
//! Budget ledger, result cache, advisory router, and the keyword memory
//! index. Each is owned by exactly one session and mutated only by that
//! session's orchestration task.

pub mod budget;
pub mod cache;
pub mod memory;
pub mod routing;

pub use budget::{BudgetLedger, BudgetTotals, ChargeRecord};
pub use cache::{CacheStats, CachedOutcome, ResultCache};
pub use memory::{MemoryEntry, MemoryIndex};
pub use routing::{RouteProposal, RoutingEngine};
