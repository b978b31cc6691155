// ==========================================
// 配送派单核心 - 引擎层
// ==========================================
// 职责: 兼容性判定、骑手排序、并单、策略执行、超时改派
// 红线: 兼容性/排序/并单为纯同步计算；只有优化器与落地调用会挂起
// 红线: 每一次丢单、改派都输出原因码
// ==========================================

pub mod clubbing;
pub mod collaborators;
pub mod compatibility;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod ranking;
pub mod reassignment;
pub mod scheduler;
pub mod strategy;

// 重导出核心引擎
pub use clubbing::{ClubbingEngine, ClubbingResult};
pub use collaborators::DispatchCollaborators;
pub use compatibility::{CompatibilityEngine, Ineligibility};
pub use error::{AllocationError, AllocationResult};
pub use executor::{AllocationExecutor, AppliedTrip, CyclePhase, CycleReport, FailedApply, PreparedCycle, StrategyOutcome};
pub use ledger::WorkerLedger;
pub use ranking::{CriterionKey, RankingEngine, RankingPreferences};
pub use reassignment::{
    eligible_for_reassignment, is_significant_improvement, predicted_delay_secs, ReassignmentMonitor,
    ReassignmentOutcome, ReassignmentReport,
};
pub use scheduler::{DispatchScheduler, HubCycleResult};
pub use strategy::{
    AllocationStrategy, Deadline, DirectStrategy, OptimizerStrategy, SequentialStrategy, StrategyContext,
    StrategyKind,
};
