// ==========================================
// 配送派单核心 - 核心库
// ==========================================
// 职责: 站点级自动派单（兼容性 → 排序 → 并单 → 策略 → 落地）
//       + 超时改派监控
// 红线: 存储、入单、推送均为外部协作方，核心只通过契约调用
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 引擎层 - 分配规则
pub mod engine;

// 协作方层 - 外部服务契约
pub mod collaborator;

// 配置层 - 站点配置
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    AllocatableUnit, AssignmentPlan, Bundle, DroppedJob, ExclusionTag, GeoPoint, Job, JobStatus,
    ReasonCode, TimeWindow, VehicleClass, Worker, WorkerProfile, WorkerStatus,
};

// 引擎
pub use engine::{
    AllocationError, AllocationExecutor, AllocationResult, ClubbingEngine, CompatibilityEngine,
    CriterionKey, CycleReport, DispatchCollaborators, DispatchScheduler, RankingEngine,
    ReassignmentMonitor, ReassignmentOutcome, StrategyKind,
};

// 协作方
pub use collaborator::{
    CollaboratorError, HttpOptimizerClient, JobWorkerSource, OptimizerService, PlanApplier,
    TravelTimeEstimator,
};

// 配置
pub use config::{AllocationConfig, AllocationConfigReader, ConfigManager};

// ==========================================
// 版本信息
// ==========================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "配送派单核心";
