// ==========================================
// 配送派单核心 - 协作方聚合
// ==========================================
// 职责: 聚合分配周期与改派监控所需的外部协作方句柄
// ==========================================

use std::sync::Arc;

use crate::collaborator::{JobWorkerSource, OptimizerService, PlanApplier, TravelTimeEstimator};

/// 派单引擎协作方集合
///
/// # 包含的协作方
/// - `source`: 运单/骑手快照
/// - `applier`: 方案落地（分配 / 撤销 / 改派计数）
/// - `travel_time`: 行程时间估算（改派监控使用）
/// - `optimizer`: 外部优化器（可选；缺省时按配置的 endpoint 临时创建 HTTP 客户端）
#[derive(Clone)]
pub struct DispatchCollaborators {
    pub source: Arc<dyn JobWorkerSource>,
    pub applier: Arc<dyn PlanApplier>,
    pub travel_time: Arc<dyn TravelTimeEstimator>,
    pub optimizer: Option<Arc<dyn OptimizerService>>,
}

impl DispatchCollaborators {
    pub fn new(
        source: Arc<dyn JobWorkerSource>,
        applier: Arc<dyn PlanApplier>,
        travel_time: Arc<dyn TravelTimeEstimator>,
    ) -> Self {
        Self {
            source,
            applier,
            travel_time,
            optimizer: None,
        }
    }

    /// 注入进程内优化器（优先于配置中的 endpoint）
    pub fn with_optimizer(mut self, optimizer: Arc<dyn OptimizerService>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }
}
