// ==========================================
// 配送派单核心 - 多站点调度
// ==========================================
// 职责:
// - 多个站点的分配周期各自一个任务并行执行，互不共享可变状态;
// - 改派监控按独立节奏运行，直到取消令牌触发。
// 红线: 每个周期开始时读取一次配置快照，周期内不再读取
// ==========================================

use crate::config::AllocationConfigReader;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::executor::{AllocationExecutor, CycleReport};
use crate::engine::reassignment::{ReassignmentMonitor, ReassignmentReport};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 单站点周期结果
#[derive(Debug)]
pub struct HubCycleResult {
    pub hub_id: String,
    pub result: AllocationResult<CycleReport>,
}

pub struct DispatchScheduler<C>
where
    C: AllocationConfigReader + 'static,
{
    config: Arc<C>,
    executor: Arc<AllocationExecutor>,
    monitor: Arc<ReassignmentMonitor>,
}

impl<C> DispatchScheduler<C>
where
    C: AllocationConfigReader + 'static,
{
    pub fn new(config: Arc<C>, executor: Arc<AllocationExecutor>, monitor: Arc<ReassignmentMonitor>) -> Self {
        Self {
            config,
            executor,
            monitor,
        }
    }

    /// 并行执行多个站点的分配周期（每个站点一个任务）
    ///
    /// 单个站点失败（配置错误、拉取失败、任务崩溃）只体现在该站点的结果里
    pub async fn run_hubs(&self, hub_ids: &[String], now: DateTime<Utc>) -> Vec<HubCycleResult> {
        info!(hubs_count = hub_ids.len(), "开始多站点分配");

        let handles: Vec<_> = hub_ids
            .iter()
            .map(|hub_id| {
                let config = Arc::clone(&self.config);
                let executor = Arc::clone(&self.executor);
                let hub_id = hub_id.clone();
                tokio::spawn(async move {
                    let config = config.hub_config(&hub_id).await?;
                    executor.run_cycle(&hub_id, Arc::new(config), now).await
                })
            })
            .collect();

        hub_ids
            .iter()
            .zip(join_all(handles).await)
            .map(|(hub_id, joined)| {
                let result = joined.unwrap_or_else(|e| Err(task_failed(hub_id, e)));
                if let Err(err) = &result {
                    error!(hub_id = %hub_id, error = %err, "站点分配周期中止");
                }
                HubCycleResult {
                    hub_id: hub_id.clone(),
                    result,
                }
            })
            .collect()
    }

    /// 对配置中列出的全部站点执行分配
    pub async fn run_configured_hubs(&self, now: DateTime<Utc>) -> AllocationResult<Vec<HubCycleResult>> {
        let hub_ids = self.config.configured_hubs().await?;
        Ok(self.run_hubs(&hub_ids, now).await)
    }

    /// 单轮改派（各站点并行）
    pub async fn run_reassignment_round(
        &self,
        hub_ids: &[String],
        now: DateTime<Utc>,
    ) -> Vec<(String, AllocationResult<ReassignmentReport>)> {
        let handles: Vec<_> = hub_ids
            .iter()
            .map(|hub_id| {
                let config = Arc::clone(&self.config);
                let monitor = Arc::clone(&self.monitor);
                let hub_id = hub_id.clone();
                tokio::spawn(async move {
                    let config = config.hub_config(&hub_id).await?;
                    monitor.run_once(&hub_id, &config, now).await
                })
            })
            .collect();

        hub_ids
            .iter()
            .zip(join_all(handles).await)
            .map(|(hub_id, joined)| {
                let result = joined.unwrap_or_else(|e| Err(task_failed(hub_id, e)));
                if let Err(err) = &result {
                    warn!(hub_id = %hub_id, error = %err, "改派扫描失败，等待下一轮");
                }
                (hub_id.clone(), result)
            })
            .collect()
    }

    /// 按固定节奏运行改派监控，直到 cancel 被触发
    ///
    /// # 返回
    /// 已完成的轮数
    pub async fn run_reassignment_loop(
        &self,
        hub_ids: Vec<String>,
        period: Duration,
        cancel: CancellationToken,
    ) -> u64 {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rounds = 0u64;

        info!(hubs_count = hub_ids.len(), period_ms = period.as_millis() as u64, "改派监控启动");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(rounds, "改派监控收到停止信号");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_reassignment_round(&hub_ids, Utc::now()).await;
                    rounds += 1;
                }
            }
        }
        rounds
    }
}

/// 站点任务崩溃或被取消
fn task_failed(hub_id: &str, err: JoinError) -> AllocationError {
    AllocationError::Other(anyhow::Error::new(err).context(format!("hub {} task aborted", hub_id)))
}
