// ==========================================
// 配送派单核心 - 领域类型定义
// ==========================================
// 红线: 状态是枚举,不是自由字符串
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 运单状态 (Job Status)
// ==========================================
// 序列化格式: snake_case (与上游存储一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Unassigned, // 待分配
    Assigned,   // 已分配
    Delivered,  // 已送达（终态）
    Failed,     // 失败（终态）
}

impl JobStatus {
    /// 是否为终态（终态运单不得再次进入分配）
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Delivered | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Unassigned => write!(f, "unassigned"),
            JobStatus::Assigned => write!(f, "assigned"),
            JobStatus::Delivered => write!(f, "delivered"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// 骑手状态 (Worker Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    AvailableIdle,     // 空闲可派
    AvailableAssigned, // 有单可派
    EnRoute,           // 配送途中
    Returning,         // 返回站点
    OffDuty,           // 下班
    OnBreak,           // 休息
    OutOfArea,         // 离开区域
}

impl WorkerStatus {
    /// 是否可接收新任务
    ///
    /// 只有 available_idle / available_assigned 两种状态进入派单池
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            WorkerStatus::AvailableIdle | WorkerStatus::AvailableAssigned
        )
    }

    /// 派单池默认拉取的状态集合
    pub fn dispatchable() -> Vec<WorkerStatus> {
        vec![WorkerStatus::AvailableIdle, WorkerStatus::AvailableAssigned]
    }

    /// 全部状态（改派监控需要看到配送途中的骑手）
    pub fn all() -> Vec<WorkerStatus> {
        vec![
            WorkerStatus::AvailableIdle,
            WorkerStatus::AvailableAssigned,
            WorkerStatus::EnRoute,
            WorkerStatus::Returning,
            WorkerStatus::OffDuty,
            WorkerStatus::OnBreak,
            WorkerStatus::OutOfArea,
        ]
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::AvailableIdle => "available_idle",
            WorkerStatus::AvailableAssigned => "available_assigned",
            WorkerStatus::EnRoute => "en_route",
            WorkerStatus::Returning => "returning",
            WorkerStatus::OffDuty => "off_duty",
            WorkerStatus::OnBreak => "on_break",
            WorkerStatus::OutOfArea => "out_of_area",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// 车型 (Vehicle Class)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Bicycle,
    Motorbike,
    Car,
    Van,
    Truck,
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VehicleClass::Bicycle => "bicycle",
            VehicleClass::Motorbike => "motorbike",
            VehicleClass::Car => "car",
            VehicleClass::Van => "van",
            VehicleClass::Truck => "truck",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// 原因码 (Reason Code)
// ==========================================
// 红线: 每一次丢单、每一次改派都必须带机器可读原因码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NoEligibleWorker,     // 无可用骑手
    CapacityExceeded,     // 运力超限
    ValidationFailed,     // 输入数据不合法
    DeadlineExceeded,     // 周期超时
    OptimizerDropped,     // 优化器主动放弃
    OptimizerRejected,    // 优化器结果复核未通过
    OptimizerOmitted,     // 优化器结果中缺失
    OptimizerUnavailable, // 优化器不可用且未降级
    ApplyConflict,        // 落地时状态并发变更
    ApplyFailed,          // 落地失败
    DelayReassignment,    // 超时改派
    ReassignRequeued,     // 改派失败回队
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NoEligibleWorker => "NO_ELIGIBLE_WORKER",
            ReasonCode::CapacityExceeded => "CAPACITY_EXCEEDED",
            ReasonCode::ValidationFailed => "VALIDATION_FAILED",
            ReasonCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ReasonCode::OptimizerDropped => "OPTIMIZER_DROPPED",
            ReasonCode::OptimizerRejected => "OPTIMIZER_REJECTED",
            ReasonCode::OptimizerOmitted => "OPTIMIZER_OMITTED",
            ReasonCode::OptimizerUnavailable => "OPTIMIZER_UNAVAILABLE",
            ReasonCode::ApplyConflict => "APPLY_CONFLICT",
            ReasonCode::ApplyFailed => "APPLY_FAILED",
            ReasonCode::DelayReassignment => "DELAY_REASSIGNMENT",
            ReasonCode::ReassignRequeued => "REASSIGN_REQUEUED",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
