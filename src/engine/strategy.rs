// ==========================================
// 配送派单核心 - 分配策略定义
// ==========================================
// 用途:
// - 三种策略（规则直派 / 优化器委托 / 顺序贪心）共用同一接口;
// - 兼容性、排序、运力台账逻辑由策略共享，不按业务线重复实现。
// ==========================================

mod direct;
mod optimizer;
mod sequential;

pub use direct::DirectStrategy;
pub use optimizer::{build_optimizer_request, OptimizerStrategy};
pub use sequential::SequentialStrategy;

use crate::config::AllocationConfig;
use crate::domain::bundle::AllocatableUnit;
use crate::domain::plan::AssignmentPlan;
use crate::domain::types::ReasonCode;
use crate::engine::error::AllocationResult;
use crate::engine::ledger::WorkerLedger;
use crate::engine::ranking::RankingEngine;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 分配策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Direct,
    Optimizer,
    Sequential,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Optimizer => "optimizer",
            StrategyKind::Sequential => "sequential",
        }
    }

    pub fn title_cn(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "规则直派",
            StrategyKind::Optimizer => "优化器委托",
            StrategyKind::Sequential => "顺序贪心",
        }
    }
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Direct
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" | "rule_based" | "rule-based" => Ok(StrategyKind::Direct),
            "optimizer" | "optimizer_delegated" | "optimizer-delegated" => Ok(StrategyKind::Optimizer),
            "sequential" | "sequential_greedy" | "sequential-greedy" => Ok(StrategyKind::Sequential),
            other => Err(format!("未知策略类型: {}", other)),
        }
    }
}

// ==========================================
// Deadline - 周期截止时间
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// 单次策略执行的上下文
pub struct StrategyContext<'a> {
    pub hub_id: &'a str,
    pub config: &'a AllocationConfig,
    pub ranking: &'a RankingEngine,
    pub now: DateTime<Utc>,
    pub deadline: Deadline,
}

// ==========================================
// Trait: AllocationStrategy
// ==========================================
#[async_trait]
pub trait AllocationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// 执行分配
    ///
    /// # 参数
    /// - units: 已准备好的分配单元（并单 + 单票）
    /// - ledger: 本周期运力台账（成功分配会预占运力）
    ///
    /// # 返回
    /// - Ok(plan): 分配方案（含丢单列表）
    /// - Err: 策略整体失败（仅外部服务类错误），台账未被修改
    async fn execute(
        &self,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        ctx: &StrategyContext<'_>,
    ) -> AllocationResult<AssignmentPlan>;
}

/// 单元整体丢弃（逐票记录原因码）
pub(crate) fn drop_unit(plan: &mut AssignmentPlan, unit: &AllocatableUnit, reason: ReasonCode, detail: &str) {
    for job_ref in unit.job_refs() {
        warn!(
            job_ref = %job_ref,
            unit_ref = %unit.unit_ref(),
            reason_code = %reason,
            detail = %detail,
            "运单本周期未分配"
        );
        plan.drop_job(job_ref, reason, detail);
    }
}

// ==========================================
// 规则类策略共用的放置循环
// ==========================================
// candidates: 返回该单元的候选骑手 id（已按策略排好序，已过兼容性过滤）
// 规则:
// - 候选为空 → NO_ELIGIBLE_WORKER
// - 候选均无剩余运力 → CAPACITY_EXCEEDED
// - 并单放置失败时拆回单票，插到队首重试一次
// - 每个单元开始前检查截止时间，超时后剩余单元全部 DEADLINE_EXCEEDED
pub(crate) fn place_units<F>(
    units: Vec<AllocatableUnit>,
    ledger: &mut WorkerLedger,
    ctx: &StrategyContext<'_>,
    mut candidates: F,
) -> AssignmentPlan
where
    F: FnMut(&WorkerLedger, &AllocatableUnit) -> Vec<String>,
{
    let mut plan = AssignmentPlan::new();
    let mut queue: VecDeque<AllocatableUnit> = units.into();

    while let Some(unit) = queue.pop_front() {
        if ctx.deadline.is_expired() {
            drop_unit(&mut plan, &unit, ReasonCode::DeadlineExceeded, "cycle deadline exceeded");
            for rest in queue.drain(..) {
                drop_unit(&mut plan, &rest, ReasonCode::DeadlineExceeded, "cycle deadline exceeded");
            }
            break;
        }

        if let Some(dup) = unit.job_refs().into_iter().find(|r| plan.contains_job(r) || plan.is_dropped(r)) {
            warn!(job_ref = %dup, unit_ref = %unit.unit_ref(), "运单重复出现，跳过");
            continue;
        }

        let ordered = candidates(ledger, &unit);
        let failure = if ordered.is_empty() {
            (ReasonCode::NoEligibleWorker, "no compatible worker")
        } else {
            // 依次尝试预占，第一个成功的候选即中选
            match ordered.iter().find(|id| ledger.reserve(id, &unit).is_ok()) {
                Some(worker_id) => {
                    let job_refs = unit.job_refs();
                    // 上面已排除重复 job_ref，这里不会失败
                    if let Err(dup) = plan.assign(worker_id, &job_refs) {
                        warn!(job_ref = %dup, worker_id = %worker_id, "方案拒绝重复分配");
                        continue;
                    }
                    debug!(
                        unit_ref = %unit.unit_ref(),
                        worker_id = %worker_id,
                        jobs_count = job_refs.len(),
                        "单元已分配"
                    );
                    continue;
                }
                None => (ReasonCode::CapacityExceeded, "no compatible worker has remaining capacity"),
            }
        };

        if unit.is_bundle() {
            debug!(unit_ref = %unit.unit_ref(), reason_code = %failure.0, "并单无法整单放置，拆回单票重试");
            for single in unit.into_singles().into_iter().rev() {
                queue.push_front(single);
            }
            continue;
        }

        drop_unit(&mut plan, &unit, failure.0, failure.1);
    }

    plan
}
