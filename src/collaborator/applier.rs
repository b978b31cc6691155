// ==========================================
// 配送派单核心 - 方案落地契约
// ==========================================
// 红线: 每次调用要么全部生效、要么全部不生效
// 红线: 并发冲突返回 CollaboratorError::Conflict
// ==========================================

use crate::collaborator::error::CollaboratorResult;
use crate::domain::types::ReasonCode;
use async_trait::async_trait;

#[async_trait]
pub trait PlanApplier: Send + Sync {
    /// 将一组运单标记为已分配并挂到骑手趟次上
    ///
    /// # 参数
    /// - worker_id: 骑手
    /// - job_refs: 有序运单列表
    /// - trip_id: 追加到已有趟次；None 时新建
    ///
    /// # 返回
    /// 实际趟次 id
    async fn apply(
        &self,
        worker_id: &str,
        job_refs: &[String],
        trip_id: Option<String>,
    ) -> CollaboratorResult<String>;

    /// 撤销单票分配
    async fn unassign(&self, worker_id: &str, job_ref: &str, reason: ReasonCode) -> CollaboratorResult<()>;

    /// 改派次数 +1，返回新值
    async fn increment_reassignment_attempts(&self, job_ref: &str) -> CollaboratorResult<u32>;
}
