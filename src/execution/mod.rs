pub mod dca;
pub mod engine;
pub mod executors;
pub mod retry;
pub mod scheduler;
pub mod types;

pub use engine::{Collaborators, EngineConfig, ExecutionEngine};
pub use retry::RetryPolicy;
pub use types::{
    ActionStatus, ActionType, ExecutedAction, ExecutionMetrics, ExecutionState, ExecutionStatus,
    NetworkStatus,
};
