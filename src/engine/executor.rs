// ==========================================
// 配送派单核心 - 分配周期执行器
// ==========================================
// 状态机: Start → Prepare → Execute(strategy) → Finalize
// 红线: 只有拉取失败会中止周期；单元/落地失败逐个隔离上报
// 红线: 拉取与落地都受周期截止时间约束，不无限等待
// 红线: 配置在周期开始时传入，周期内不再读取
// ==========================================

use crate::collaborator::{HttpOptimizerClient, OptimizerService};
use crate::config::AllocationConfig;
use crate::domain::bundle::AllocatableUnit;
use crate::domain::job::Job;
use crate::domain::plan::{AssignmentPlan, DroppedJob};
use crate::domain::types::{JobStatus, ReasonCode, WorkerStatus};
use crate::domain::worker::Worker;
use crate::engine::clubbing::ClubbingEngine;
use crate::engine::collaborators::DispatchCollaborators;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::ledger::WorkerLedger;
use crate::engine::ranking::RankingEngine;
use crate::engine::strategy::{
    drop_unit, AllocationStrategy, Deadline, DirectStrategy, OptimizerStrategy, SequentialStrategy,
    StrategyContext, StrategyKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// CyclePhase - 周期阶段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Start,
    Prepare,
    Execute,
    Finalize,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Start => "start",
            CyclePhase::Prepare => "prepare",
            CyclePhase::Execute => "execute",
            CyclePhase::Finalize => "finalize",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// CycleReport - 周期结果
// ==========================================

/// 已落地的趟次
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedTrip {
    pub worker_id: String,
    pub trip_id: String,
    pub job_refs: Vec<String>,
}

/// 落地失败的趟次（下个周期重新评估）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedApply {
    pub worker_id: String,
    pub job_refs: Vec<String>,
    pub reason: ReasonCode,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub hub_id: String,
    pub started_at: DateTime<Utc>,
    pub strategy_used: StrategyKind,
    /// 优化器失败后降级为规则直派
    pub fell_back: bool,
    pub plan: AssignmentPlan,
    pub applied: Vec<AppliedTrip>,
    pub failed: Vec<FailedApply>,
}

impl CycleReport {
    pub fn applied_job_count(&self) -> usize {
        self.applied.iter().map(|t| t.job_refs.len()).sum()
    }

    pub fn dropped(&self) -> &[DroppedJob] {
        self.plan.dropped()
    }
}

/// Prepare 阶段输出
#[derive(Debug, Clone, Default)]
pub struct PreparedCycle {
    pub units: Vec<AllocatableUnit>,
    pub workers: Vec<Worker>,
    pub invalid: Vec<DroppedJob>,
}

/// Execute 阶段输出
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub plan: AssignmentPlan,
    pub strategy_used: StrategyKind,
    pub fell_back: bool,
}

// ==========================================
// AllocationExecutor - 分配周期执行器
// ==========================================
pub struct AllocationExecutor {
    collaborators: DispatchCollaborators,
}

impl AllocationExecutor {
    pub fn new(collaborators: DispatchCollaborators) -> Self {
        Self { collaborators }
    }

    pub fn collaborators(&self) -> &DispatchCollaborators {
        &self.collaborators
    }

    /// 执行一个站点的完整分配周期
    ///
    /// # 返回
    /// - Ok(report): 周期完成（可能含丢单与落地失败）
    /// - Err(SourceUnavailable): 无法拉取运单/骑手，周期中止，等待下次调度
    #[instrument(skip(self, config, now), fields(cycle_id = tracing::field::Empty))]
    pub async fn run_cycle(
        &self,
        hub_id: &str,
        config: Arc<AllocationConfig>,
        now: DateTime<Utc>,
    ) -> AllocationResult<CycleReport> {
        // ==========================================
        // Start
        // ==========================================
        let cycle_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("cycle_id", cycle_id.as_str());
        let deadline = Deadline::after(config.cycle_deadline());
        info!(
            phase = %CyclePhase::Start,
            strategy = %config.strategy,
            deadline_ms = config.cycle_deadline_ms,
            "开始分配周期"
        );

        // ==========================================
        // Prepare: 拉取快照 → 校验 → 并单
        // ==========================================
        let source = &self.collaborators.source;
        let jobs = match timeout(
            deadline.remaining(),
            source.fetch_jobs(hub_id, &[JobStatus::Unassigned], None),
        )
        .await
        {
            Ok(fetched) => fetched.map_err(|e| AllocationError::SourceUnavailable(format!("fetch jobs: {}", e)))?,
            Err(_) => {
                return Err(AllocationError::SourceUnavailable(
                    "fetch jobs: cycle deadline exceeded".to_string(),
                ))
            }
        };
        let workers = match timeout(
            deadline.remaining(),
            source.fetch_workers(hub_id, &WorkerStatus::dispatchable()),
        )
        .await
        {
            Ok(fetched) => fetched.map_err(|e| AllocationError::SourceUnavailable(format!("fetch workers: {}", e)))?,
            Err(_) => {
                return Err(AllocationError::SourceUnavailable(
                    "fetch workers: cycle deadline exceeded".to_string(),
                ))
            }
        };

        let prepared = Self::prepare(hub_id, jobs, workers, &config, now);
        info!(
            phase = %CyclePhase::Prepare,
            units_count = prepared.units.len(),
            workers_count = prepared.workers.len(),
            invalid_count = prepared.invalid.len(),
            "准备阶段完成"
        );

        // ==========================================
        // Execute
        // ==========================================
        let mut ledger = WorkerLedger::new(prepared.workers);
        let outcome = self
            .execute_strategy(hub_id, prepared.units, &mut ledger, &config, now, deadline)
            .await;
        let mut plan = outcome.plan;
        for invalid in prepared.invalid {
            plan.drop_job(invalid.job_ref, invalid.reason, invalid.detail);
        }
        info!(
            phase = %CyclePhase::Execute,
            strategy_used = %outcome.strategy_used,
            fell_back = outcome.fell_back,
            assigned_count = plan.assigned_count(),
            dropped_count = plan.dropped().len(),
            "执行阶段完成"
        );

        // ==========================================
        // Finalize: 逐趟落地，失败互不影响
        // ==========================================
        let mut applied = Vec::new();
        let mut failed = Vec::new();
        for (worker_id, job_refs) in plan.trips() {
            let outcome = match timeout(
                deadline.remaining(),
                self.collaborators.applier.apply(worker_id, job_refs, None),
            )
            .await
            {
                Ok(Ok(trip_id)) => Ok(trip_id),
                Ok(Err(err)) => {
                    let reason = if err.is_conflict() {
                        ReasonCode::ApplyConflict
                    } else {
                        ReasonCode::ApplyFailed
                    };
                    Err((reason, err.to_string()))
                }
                Err(_) => Err((ReasonCode::DeadlineExceeded, "apply timed out at cycle deadline".to_string())),
            };
            match outcome {
                Ok(trip_id) => {
                    debug!(worker_id = %worker_id, trip_id = %trip_id, jobs_count = job_refs.len(), "趟次已落地");
                    applied.push(AppliedTrip {
                        worker_id: worker_id.clone(),
                        trip_id,
                        job_refs: job_refs.clone(),
                    });
                }
                Err((reason, detail)) => {
                    warn!(
                        worker_id = %worker_id,
                        job_refs = ?job_refs,
                        reason_code = %reason,
                        error = %detail,
                        "趟次落地失败"
                    );
                    failed.push(FailedApply {
                        worker_id: worker_id.clone(),
                        job_refs: job_refs.clone(),
                        reason,
                        detail,
                    });
                }
            }
        }

        info!(
            phase = %CyclePhase::Finalize,
            applied_trips = applied.len(),
            failed_trips = failed.len(),
            "分配周期完成"
        );

        Ok(CycleReport {
            cycle_id,
            hub_id: hub_id.to_string(),
            started_at: now,
            strategy_used: outcome.strategy_used,
            fell_back: outcome.fell_back,
            plan,
            applied,
            failed,
        })
    }

    /// Prepare 阶段（纯函数）
    ///
    /// # 规则
    /// 1. 非本站点、非 unassigned 的运单直接忽略（不重复派出）
    /// 2. 数据不合法的运单 → VALIDATION_FAILED
    /// 3. 重复 job_ref 只保留第一条
    /// 4. 非本站点 / 数据不合法的骑手剔除
    /// 5. 启用并单时执行并单
    pub fn prepare(
        hub_id: &str,
        jobs: Vec<Job>,
        workers: Vec<Worker>,
        config: &AllocationConfig,
        now: DateTime<Utc>,
    ) -> PreparedCycle {
        let mut invalid = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut valid_jobs = Vec::with_capacity(jobs.len());

        for job in jobs {
            if job.hub_id != hub_id || !job.is_allocatable() {
                debug!(job_ref = %job.job_ref, status = %job.status, "运单不在本周期分配范围");
                continue;
            }
            if let Err(message) = job.validate() {
                warn!(
                    job_ref = %job.job_ref,
                    reason_code = %ReasonCode::ValidationFailed,
                    message = %message,
                    "运单数据不合法，本周期跳过"
                );
                invalid.push(DroppedJob {
                    job_ref: job.job_ref,
                    reason: ReasonCode::ValidationFailed,
                    detail: message,
                });
                continue;
            }
            if !seen.insert(job.job_ref.clone()) {
                warn!(job_ref = %job.job_ref, "重复运单快照，已忽略");
                continue;
            }
            valid_jobs.push(job);
        }

        let workers: Vec<Worker> = workers
            .into_iter()
            .filter(|w| {
                if w.hub_id != hub_id {
                    return false;
                }
                match w.validate() {
                    Ok(()) => true,
                    Err(message) => {
                        warn!(worker_id = %w.id, message = %message, "骑手数据不合法，本周期剔除");
                        false
                    }
                }
            })
            .collect();

        let units = if config.clubbing.enabled {
            ClubbingEngine::club(valid_jobs, &workers, &config.clubbing, now).into_units()
        } else {
            valid_jobs.into_iter().map(AllocatableUnit::Single).collect()
        };

        PreparedCycle {
            units,
            workers,
            invalid,
        }
    }

    /// Execute 阶段：按配置选择策略，优化器失败时按配置降级
    pub async fn execute_strategy(
        &self,
        hub_id: &str,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        config: &AllocationConfig,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> StrategyOutcome {
        let ranking = RankingEngine::new(config.ranking.clone());
        let ctx = StrategyContext {
            hub_id,
            config,
            ranking: &ranking,
            now,
            deadline,
        };

        let strategy: Box<dyn AllocationStrategy> = match config.strategy {
            StrategyKind::Direct => Box::new(DirectStrategy::new()),
            StrategyKind::Sequential => Box::new(SequentialStrategy::new()),
            StrategyKind::Optimizer => match self.optimizer_for(config) {
                Some(service) => Box::new(OptimizerStrategy::new(service)),
                None => {
                    let err = AllocationError::ExternalService("no optimizer configured".to_string());
                    return Self::fall_back(err, units, ledger, &ctx);
                }
            },
        };

        let kind = strategy.kind();
        // 策略失败时需要原样重跑或整体丢单
        let retained = units.clone();

        match strategy.execute(units, ledger, &ctx).await {
            Ok(plan) => StrategyOutcome {
                plan,
                strategy_used: kind,
                fell_back: false,
            },
            Err(err) if kind == StrategyKind::Optimizer => Self::fall_back(err, retained, ledger, &ctx),
            Err(err) => {
                warn!(error = %err, strategy = %kind, "分配策略执行失败");
                let mut plan = AssignmentPlan::new();
                let detail = err.to_string();
                for unit in &retained {
                    drop_unit(&mut plan, unit, err.reason_code(), &detail);
                }
                StrategyOutcome {
                    plan,
                    strategy_used: kind,
                    fell_back: false,
                }
            }
        }
    }

    fn fall_back(
        err: AllocationError,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        ctx: &StrategyContext<'_>,
    ) -> StrategyOutcome {
        if ctx.config.optimizer.fallback_to_direct {
            warn!(
                error = %err,
                reason_code = %ReasonCode::OptimizerUnavailable,
                "优化器不可用，降级为规则直派"
            );
            return StrategyOutcome {
                plan: DirectStrategy::new().allocate(units, ledger, ctx),
                strategy_used: StrategyKind::Direct,
                fell_back: true,
            };
        }

        let mut plan = AssignmentPlan::new();
        let detail = err.to_string();
        for unit in &units {
            drop_unit(&mut plan, unit, ReasonCode::OptimizerUnavailable, &detail);
        }
        StrategyOutcome {
            plan,
            strategy_used: StrategyKind::Optimizer,
            fell_back: false,
        }
    }

    /// 优化器来源: 注入的服务优先，其次按配置 endpoint 创建 HTTP 客户端
    fn optimizer_for(&self, config: &AllocationConfig) -> Option<Arc<dyn OptimizerService>> {
        if let Some(service) = &self.collaborators.optimizer {
            return Some(service.clone());
        }
        let endpoint = config.optimizer.endpoint.as_deref()?;
        match HttpOptimizerClient::new(endpoint, config.optimizer.timeout()) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "优化器客户端创建失败");
                None
            }
        }
    }
}
