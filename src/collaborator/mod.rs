// ==========================================
// 配送派单核心 - 外部协作方边界
// ==========================================
// 职责: 定义核心依赖的外部服务契约（只有接口，不含实现）
// 红线: 核心从不直接写库，所有状态变更都经过 PlanApplier
// ==========================================

pub mod applier;
pub mod error;
pub mod optimizer;
pub mod source;
pub mod travel_time;

pub use applier::PlanApplier;
pub use error::{CollaboratorError, CollaboratorResult};
pub use optimizer::{
    HttpOptimizerClient, OptimizerAssignment, OptimizerConstraints, OptimizerRequest,
    OptimizerResponse, OptimizerService, OptimizerUnit, OptimizerWorker,
};
pub use source::JobWorkerSource;
pub use travel_time::{JobRoute, TravelTimeEstimator};
