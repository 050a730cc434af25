//! 核心编排层：错误类型、有序映射、共享状态、任务调度、错误恢复与主控循环

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod task_map;
pub mod task_scheduler;

pub use error::{AgentError, StateError};
pub use orchestrator::{Orchestrator, Outcome, Phase, Reply, DEFAULT_MAX_RECOVERY_ATTEMPTS};
pub use recovery::{fallback_explanation, ErrorRecoveryNode, RecoveryStep};
pub use state::{
    AgentState, StateDelta, TaskKind, KEY_AGGREGATOR, KEY_CLASSIFY, KEY_ERROR, KEY_ORDER,
    NODE_AGGREGATOR, NODE_CLASSIFY, NODE_ORDER, NODE_RECOVERY,
};
pub use task_map::TaskMap;
pub use task_scheduler::TaskScheduler;
