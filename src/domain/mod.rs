// ==========================================
// 配送派单核心 - 领域模型层
// ==========================================
// 职责: 定义运单、骑手、并单、分配方案等领域实体
// 红线: 不含协作方调用,不含引擎逻辑
// ==========================================

pub mod bundle;
pub mod geo;
pub mod job;
pub mod plan;
pub mod types;
pub mod window;
pub mod worker;

// 重导出核心类型
pub use bundle::{AllocatableUnit, Bundle};
pub use geo::GeoPoint;
pub use job::{ExclusionTag, Job, NO_CLUB_LABEL};
pub use plan::{AssignmentPlan, DroppedJob};
pub use types::{JobStatus, ReasonCode, VehicleClass, WorkerStatus};
pub use window::TimeWindow;
pub use worker::{merge_capabilities, CapacityConstraint, Worker, WorkerProfile};
