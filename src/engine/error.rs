// ==========================================
// 配送派单核心 - 引擎层错误类型
// ==========================================
// 红线: 单个单元失败只影响自身,仅拉取失败会中止周期
// 工具: thiserror 派生宏
// ==========================================

use crate::collaborator::CollaboratorError;
use crate::config::ConfigError;
use crate::domain::types::ReasonCode;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum AllocationError {
    // ===== 单元级错误（隔离到丢单列表） =====
    #[error("数据验证失败 (ref={unit_ref}): {message}")]
    Validation { unit_ref: String, message: String },

    #[error("运力超限: worker_id={worker_id}, unit_ref={unit_ref}")]
    CapacityExceeded { worker_id: String, unit_ref: String },

    #[error("骑手不兼容: worker_id={worker_id}, unit_ref={unit_ref}, reason={reason}")]
    IneligibleWorker {
        worker_id: String,
        unit_ref: String,
        reason: String,
    },

    #[error("方案重复分配: job_ref={job_ref}")]
    DuplicateAssignment { job_ref: String },

    // ===== 外部协作方错误 =====
    #[error("外部服务失败: {0}")]
    ExternalService(String),

    #[error("落地冲突: {0}")]
    ApplyConflict(String),

    #[error("运单/骑手拉取失败: {0}")]
    SourceUnavailable(String),

    // ===== 配置错误 =====
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AllocationError {
    /// 错误对应的审计原因码
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            AllocationError::Validation { .. } => ReasonCode::ValidationFailed,
            AllocationError::CapacityExceeded { .. } => ReasonCode::CapacityExceeded,
            AllocationError::IneligibleWorker { .. } => ReasonCode::NoEligibleWorker,
            AllocationError::DuplicateAssignment { .. } => ReasonCode::OptimizerRejected,
            AllocationError::ExternalService(_) => ReasonCode::OptimizerUnavailable,
            AllocationError::ApplyConflict(_) => ReasonCode::ApplyConflict,
            AllocationError::SourceUnavailable(_)
            | AllocationError::Config(_)
            | AllocationError::Other(_) => ReasonCode::ApplyFailed,
        }
    }

    /// 是否应中止整个周期
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(
            self,
            AllocationError::SourceUnavailable(_) | AllocationError::Config(_)
        )
    }
}

impl From<CollaboratorError> for AllocationError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Conflict(msg) => AllocationError::ApplyConflict(msg),
            other => AllocationError::ExternalService(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type AllocationResult<T> = Result<T, AllocationError>;
