// ==========================================
// 配送派单核心 - 超时改派监控
// ==========================================
// 职责: 扫描已分配运单，预测延误超阈值时改派给明显更快的骑手
// 输入: 已分配运单 + 全部骑手快照 + 行程时间估算
// 输出: 每票运单的改派结果（带原因码）
// 红线: 撤销 → 计数 +1 → 分配，分配失败时运单回队，不得悬空
// 红线: 候选须比当前骑手快出 improvement_margin_percent 才改派
// ==========================================

use crate::collaborator::JobRoute;
use crate::config::{AllocationConfig, ReassignmentConfig};
use crate::domain::bundle::AllocatableUnit;
use crate::domain::job::Job;
use crate::domain::types::{JobStatus, ReasonCode, WorkerStatus};
use crate::engine::collaborators::DispatchCollaborators;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::ledger::WorkerLedger;
use crate::engine::ranking::RankingEngine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

// ==========================================
// ReassignmentOutcome - 单票改派结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReassignmentOutcome {
    /// 已改派
    Reassigned {
        job_ref: String,
        from_worker: String,
        to_worker: String,
        trip_id: String,
        attempts: u32,
    },
    /// 已撤销但未能重新分配，等待下个分配周期
    Requeued {
        job_ref: String,
        from_worker: String,
        detail: String,
    },
    /// 达到改派条件但没有明显更优的骑手
    Kept { job_ref: String, detail: String },
    /// 不满足改派条件或数据不足
    Skipped { job_ref: String, detail: String },
    /// 撤销失败，运单仍归原骑手
    Failed {
        job_ref: String,
        reason: ReasonCode,
        detail: String,
    },
}

impl ReassignmentOutcome {
    pub fn job_ref(&self) -> &str {
        match self {
            ReassignmentOutcome::Reassigned { job_ref, .. }
            | ReassignmentOutcome::Requeued { job_ref, .. }
            | ReassignmentOutcome::Kept { job_ref, .. }
            | ReassignmentOutcome::Skipped { job_ref, .. }
            | ReassignmentOutcome::Failed { job_ref, .. } => job_ref,
        }
    }

    /// 审计原因码（未发生状态变更的结果没有原因码）
    pub fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            ReassignmentOutcome::Reassigned { .. } => Some(ReasonCode::DelayReassignment),
            ReassignmentOutcome::Requeued { .. } => Some(ReasonCode::ReassignRequeued),
            ReassignmentOutcome::Failed { reason, .. } => Some(*reason),
            ReassignmentOutcome::Kept { .. } | ReassignmentOutcome::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReassignmentReport {
    pub hub_id: String,
    pub checked_at: DateTime<Utc>,
    pub outcomes: Vec<ReassignmentOutcome>,
}

impl ReassignmentReport {
    pub fn reassigned_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ReassignmentOutcome::Reassigned { .. }))
            .count()
    }

    pub fn outcome_for(&self, job_ref: &str) -> Option<&ReassignmentOutcome> {
        self.outcomes.iter().find(|o| o.job_ref() == job_ref)
    }
}

// ==========================================
// 纯函数判定
// ==========================================

/// 预测延误秒数 = (now + 预计剩余时长) - 时间窗关闭时刻
///
/// 负数表示可按时送达
pub fn predicted_delay_secs(job: &Job, now: DateTime<Utc>, estimate_secs: f64) -> f64 {
    (now - job.window.close).num_milliseconds() as f64 / 1000.0 + estimate_secs
}

/// 是否满足改派条件
///
/// # 规则
/// 1. reassignment_attempts < max_retries
/// 2. 延误 / 时间窗长度 * 100 > delay_buffer_percent
/// 3. 时间窗非法或延误非有限值 → false
pub fn eligible_for_reassignment(job: &Job, delay_secs: f64, config: &ReassignmentConfig) -> bool {
    if job.reassignment_attempts >= config.max_retries {
        return false;
    }
    let window_secs = job.window.duration_secs();
    if window_secs <= 0 || !delay_secs.is_finite() {
        return false;
    }
    delay_secs / window_secs as f64 * 100.0 > config.delay_buffer_percent
}

/// 候选预测时长是否优于当前骑手超过改进幅度
pub fn is_significant_improvement(current_secs: f64, candidate_secs: f64, margin_percent: f64) -> bool {
    if !current_secs.is_finite() || !candidate_secs.is_finite() {
        return false;
    }
    candidate_secs < current_secs * (1.0 - margin_percent / 100.0)
}

// ==========================================
// ReassignmentMonitor - 改派监控
// ==========================================
pub struct ReassignmentMonitor {
    collaborators: DispatchCollaborators,
}

impl ReassignmentMonitor {
    pub fn new(collaborators: DispatchCollaborators) -> Self {
        Self { collaborators }
    }

    /// 对一个站点执行一轮扫描
    ///
    /// # 返回
    /// - Err(SourceUnavailable): 无法拉取快照，本轮跳过
    #[instrument(skip(self, config, now))]
    pub async fn run_once(
        &self,
        hub_id: &str,
        config: &AllocationConfig,
        now: DateTime<Utc>,
    ) -> AllocationResult<ReassignmentReport> {
        let jobs = self
            .collaborators
            .source
            .fetch_jobs(hub_id, &[JobStatus::Assigned], None)
            .await
            .map_err(|e| AllocationError::SourceUnavailable(format!("fetch jobs: {}", e)))?;
        let workers = self
            .collaborators
            .source
            .fetch_workers(hub_id, &WorkerStatus::all())
            .await
            .map_err(|e| AllocationError::SourceUnavailable(format!("fetch workers: {}", e)))?;

        let mut ledger = WorkerLedger::new(workers);
        let ranking = RankingEngine::new(config.ranking.clone());
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in jobs {
            if job.hub_id != hub_id || job.status != JobStatus::Assigned {
                continue;
            }
            let outcome = self.evaluate(job, &mut ledger, &ranking, config, now).await;
            if let Some(reason) = outcome.reason_code() {
                info!(job_ref = %outcome.job_ref(), reason_code = %reason, outcome = ?outcome, "改派处理结果");
            }
            outcomes.push(outcome);
        }

        let report = ReassignmentReport {
            hub_id: hub_id.to_string(),
            checked_at: now,
            outcomes,
        };
        info!(
            checked_count = report.outcomes.len(),
            reassigned_count = report.reassigned_count(),
            "改派扫描完成"
        );
        Ok(report)
    }

    async fn evaluate(
        &self,
        job: Job,
        ledger: &mut WorkerLedger,
        ranking: &RankingEngine,
        config: &AllocationConfig,
        now: DateTime<Utc>,
    ) -> ReassignmentOutcome {
        let job_ref = job.job_ref.clone();
        let skip = |detail: String| ReassignmentOutcome::Skipped {
            job_ref: job_ref.clone(),
            detail,
        };

        if let Err(message) = job.validate() {
            return skip(format!("invalid job: {}", message));
        }
        let Some(current_id) = job.assigned_worker_id.clone() else {
            return skip("no assigned worker".to_string());
        };
        let Some(current_location) = ledger.get(&current_id).and_then(|w| w.location) else {
            return skip(format!("location of worker {} unknown", current_id));
        };

        // ===== 当前骑手预测 =====
        let route = JobRoute::from(&job);
        let current_secs = match self
            .collaborators
            .travel_time
            .estimate(current_location, &route, now)
            .await
        {
            Ok(secs) => secs,
            Err(err) => {
                warn!(job_ref = %job_ref, error = %err, "行程时间估算失败，本轮跳过");
                return skip(format!("travel time unavailable: {}", err));
            }
        };

        let delay_secs = predicted_delay_secs(&job, now, current_secs);
        if !eligible_for_reassignment(&job, delay_secs, &config.reassignment) {
            debug!(job_ref = %job_ref, delay_secs, attempts = job.reassignment_attempts, "不满足改派条件");
            return skip(format!(
                "delay {:.0}s, attempts {}/{}",
                delay_secs, job.reassignment_attempts, config.reassignment.max_retries
            ));
        }

        // ===== 候选骑手: 兼容 + 有运力 + 非当前骑手，按排序键排序 =====
        let unit = AllocatableUnit::Single(job);
        let candidate_ids: Vec<String> = {
            let compatible: Vec<_> = ledger
                .compatible_workers(&unit, now)
                .into_iter()
                .filter(|w| w.id != current_id && w.location.is_some())
                .collect();
            ranking
                .rank_for_point(compatible, &config.criteria_order, unit.origin())
                .into_iter()
                .filter(|w| ledger.has_capacity(&w.id, &unit))
                .map(|w| w.id.clone())
                .collect()
        };

        let mut best: Option<(String, f64)> = None;
        for candidate_id in candidate_ids {
            let Some(location) = ledger.get(&candidate_id).and_then(|w| w.location) else {
                continue;
            };
            match self.collaborators.travel_time.estimate(location, &route, now).await {
                Ok(secs) if secs.is_finite() => {
                    // 严格更小才替换，平局保留排序靠前者
                    if best.as_ref().map_or(true, |(_, b)| secs < *b) {
                        best = Some((candidate_id, secs));
                    }
                }
                Ok(_) => {}
                Err(err) => debug!(worker_id = %candidate_id, error = %err, "候选骑手估算失败"),
            }
        }

        let Some((to_worker, candidate_secs)) = best else {
            return ReassignmentOutcome::Kept {
                job_ref,
                detail: "no alternative worker".to_string(),
            };
        };
        if !is_significant_improvement(
            current_secs,
            candidate_secs,
            config.reassignment.improvement_margin_percent,
        ) {
            return ReassignmentOutcome::Kept {
                job_ref,
                detail: format!(
                    "best candidate {} at {:.0}s vs current {:.0}s",
                    to_worker, candidate_secs, current_secs
                ),
            };
        }

        self.transfer(&unit, &current_id, &to_worker, ledger).await
    }

    /// 撤销（释放原骑手运力）→ 计数 +1 → 分配
    async fn transfer(
        &self,
        unit: &AllocatableUnit,
        from_worker: &str,
        to_worker: &str,
        ledger: &mut WorkerLedger,
    ) -> ReassignmentOutcome {
        let job_ref = unit.unit_ref().to_string();
        let applier = &self.collaborators.applier;

        if let Err(err) = applier
            .unassign(from_worker, &job_ref, ReasonCode::DelayReassignment)
            .await
        {
            let reason = if err.is_conflict() {
                ReasonCode::ApplyConflict
            } else {
                ReasonCode::ApplyFailed
            };
            warn!(job_ref = %job_ref, from_worker = %from_worker, reason_code = %reason, error = %err, "撤销分配失败，保持原骑手");
            return ReassignmentOutcome::Failed {
                job_ref,
                reason,
                detail: err.to_string(),
            };
        }
        // 撤销成功即已离开原骑手，后续运单可把原骑手当作候选
        ledger.release(from_worker, unit);

        let requeue = |detail: String| {
            warn!(
                job_ref = %job_ref,
                from_worker = %from_worker,
                reason_code = %ReasonCode::ReassignRequeued,
                detail = %detail,
                "改派未完成，运单回到待分配"
            );
            ReassignmentOutcome::Requeued {
                job_ref: job_ref.clone(),
                from_worker: from_worker.to_string(),
                detail,
            }
        };

        let attempts = match applier.increment_reassignment_attempts(&job_ref).await {
            Ok(n) => n,
            Err(err) => return requeue(format!("attempt counter update failed: {}", err)),
        };

        match applier.apply(to_worker, &[job_ref.clone()], None).await {
            Ok(trip_id) => {
                // 同一轮内后续运单要看到新负载
                if let Err(err) = ledger.reserve(to_worker, unit) {
                    debug!(error = %err, "改派后台账预占失败");
                }
                ReassignmentOutcome::Reassigned {
                    job_ref: job_ref.clone(),
                    from_worker: from_worker.to_string(),
                    to_worker: to_worker.to_string(),
                    trip_id,
                    attempts,
                }
            }
            Err(err) => requeue(format!("assign to {} failed: {}", to_worker, err)),
        }
    }
}
