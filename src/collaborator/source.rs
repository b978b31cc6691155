// ==========================================
// 配送派单核心 - 运单/骑手数据源契约
// ==========================================
// 红线: 返回一致性快照,周期读取期间不得变化
// ==========================================

use crate::collaborator::error::CollaboratorResult;
use crate::domain::job::Job;
use crate::domain::types::{JobStatus, WorkerStatus};
use crate::domain::window::TimeWindow;
use crate::domain::worker::Worker;
use async_trait::async_trait;

#[async_trait]
pub trait JobWorkerSource: Send + Sync {
    /// 拉取站点运单
    ///
    /// # 参数
    /// - hub_id: 站点
    /// - statuses: 状态过滤
    /// - window: 时间窗过滤（与运单时间窗有重叠即返回），None 表示不过滤
    async fn fetch_jobs(
        &self,
        hub_id: &str,
        statuses: &[JobStatus],
        window: Option<TimeWindow>,
    ) -> CollaboratorResult<Vec<Job>>;

    /// 拉取站点骑手
    async fn fetch_workers(
        &self,
        hub_id: &str,
        statuses: &[WorkerStatus],
    ) -> CollaboratorResult<Vec<Worker>>;
}
