// ==========================================
// 配送派单核心 - 优化器委托策略
// ==========================================
// 流程: 单元/骑手 → 请求结构 → 调用外部优化器（带超时）
//       → 逐对复核（兼容性 + 运力）→ 未落位的并单拆回单票重试 → 方案
// 红线: 调用期间不持有任何锁；台账只在拿到结果后修改
// 红线: 优化器失败时返回 Err，由执行器决定是否降级
// ==========================================

use crate::collaborator::optimizer::{
    OptimizerConstraints, OptimizerRequest, OptimizerService, OptimizerUnit, OptimizerWorker,
};
use crate::domain::bundle::AllocatableUnit;
use crate::domain::plan::AssignmentPlan;
use crate::domain::types::ReasonCode;
use crate::domain::worker::CapacityConstraint;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::ledger::WorkerLedger;
use crate::engine::strategy::direct::DirectStrategy;
use crate::engine::strategy::{drop_unit, AllocationStrategy, StrategyContext, StrategyKind};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct OptimizerStrategy {
    service: Arc<dyn OptimizerService>,
}

impl OptimizerStrategy {
    pub fn new(service: Arc<dyn OptimizerService>) -> Self {
        Self { service }
    }
}

/// 构造优化器请求
///
/// 骑手上报剩余运力（max - current），起点取最后位置，缺省取站点
pub fn build_optimizer_request(
    units: &[AllocatableUnit],
    ledger: &WorkerLedger,
    ctx: &StrategyContext<'_>,
) -> OptimizerRequest {
    let depot = ctx.config.optimizer.depot;
    let respond_by = ctx.now
        + ChronoDuration::from_std(ctx.deadline.remaining()).unwrap_or_else(|_| ChronoDuration::zero());

    OptimizerRequest {
        hub_id: ctx.hub_id.to_string(),
        units: units
            .iter()
            .map(|unit| OptimizerUnit {
                unit_ref: unit.unit_ref().to_string(),
                job_refs: unit.job_refs(),
                origin: unit.origin(),
                destination: unit.destination(),
                window: unit.window(),
                weight_kg: unit.weight_kg(),
                volume_m3: unit.volume_m3(),
                required_tags: unit.required_tags().iter().cloned().collect(),
                excluded_workers: unit.active_exclusions(ctx.now).into_iter().collect(),
            })
            .collect(),
        workers: ledger
            .workers()
            .iter()
            .filter(|w| w.status.is_dispatchable())
            .map(|w| OptimizerWorker {
                worker_id: w.id.clone(),
                start: w.location.or(depot),
                end: depot,
                capabilities: w.capabilities.iter().cloned().collect(),
                remaining_jobs: w.remaining_jobs(),
                remaining_weight_kg: w.remaining_weight_kg(),
                shift: w.shift,
            })
            .collect(),
        depot,
        constraints: OptimizerConstraints {
            speed_mps: ctx.config.optimizer.speed_mps,
            respond_by,
        },
    }
}

#[async_trait]
impl AllocationStrategy for OptimizerStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Optimizer
    }

    #[instrument(skip_all, fields(hub_id = %ctx.hub_id, units_count = units.len()))]
    async fn execute(
        &self,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        ctx: &StrategyContext<'_>,
    ) -> AllocationResult<AssignmentPlan> {
        // 超时 = min(优化器超时, 周期剩余时间)
        let timeout = ctx.config.optimizer.timeout().min(ctx.deadline.remaining());
        if timeout.is_zero() {
            return Err(AllocationError::ExternalService(
                "no time left for optimizer call".to_string(),
            ));
        }

        let request = build_optimizer_request(&units, ledger, ctx);
        debug!(timeout_ms = timeout.as_millis() as u64, "发送优化器请求");

        let response = match tokio::time::timeout(timeout, self.service.solve(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                return Err(AllocationError::ExternalService(format!("optimizer failed: {}", err)));
            }
            Err(_) => {
                return Err(AllocationError::ExternalService(format!(
                    "optimizer timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        };

        // ===== 逐对复核 =====
        let mut plan = AssignmentPlan::new();
        let index: HashMap<&str, usize> = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.unit_ref(), i))
            .collect();
        let mut handled = vec![false; units.len()];
        // 未能整单落位的并单，稍后拆回单票重试一次
        let mut split_retry: Vec<Rejected> = Vec::new();

        for assignment in &response.assignments {
            for unit_ref in &assignment.unit_refs {
                let Some(&i) = index.get(unit_ref.as_str()) else {
                    warn!(unit_ref = %unit_ref, "优化器返回未知单元，忽略");
                    continue;
                };
                if handled[i] {
                    warn!(unit_ref = %unit_ref, worker_id = %assignment.worker_id, "优化器重复分配单元，忽略");
                    continue;
                }
                handled[i] = true;
                let unit = &units[i];

                if let Err(reason) = ledger.check(&assignment.worker_id, unit, ctx.now) {
                    reject(
                        &mut plan,
                        &mut split_retry,
                        unit,
                        ReasonCode::OptimizerRejected,
                        format!("worker {} failed re-check: {}", assignment.worker_id, reason),
                    );
                    continue;
                }
                if ledger.reserve(&assignment.worker_id, unit).is_err() {
                    reject(
                        &mut plan,
                        &mut split_retry,
                        unit,
                        ReasonCode::OptimizerRejected,
                        format!("worker {} lacks capacity", assignment.worker_id),
                    );
                    continue;
                }
                if let Err(dup) = plan.assign(&assignment.worker_id, &unit.job_refs()) {
                    warn!(job_ref = %dup, "优化器方案含重复运单");
                    drop_unit(&mut plan, unit, ReasonCode::OptimizerRejected, "duplicate job reference");
                }
            }
        }

        for unit_ref in &response.dropped {
            if let Some(&i) = index.get(unit_ref.as_str()) {
                if !handled[i] {
                    handled[i] = true;
                    reject(
                        &mut plan,
                        &mut split_retry,
                        &units[i],
                        ReasonCode::OptimizerDropped,
                        "dropped by optimizer".to_string(),
                    );
                }
            }
        }

        for (i, unit) in units.iter().enumerate() {
            if !handled[i] {
                reject(
                    &mut plan,
                    &mut split_retry,
                    unit,
                    ReasonCode::OptimizerOmitted,
                    "missing from optimizer response".to_string(),
                );
            }
        }

        if !split_retry.is_empty() {
            retry_as_singles(&mut plan, split_retry, ledger, ctx);
        }

        info!(
            hub_id = %ctx.hub_id,
            assigned_count = plan.assigned_count(),
            dropped_count = plan.dropped().len(),
            "优化器方案复核完成"
        );
        Ok(plan)
    }
}

/// 复核未通过的单元
struct Rejected {
    unit: AllocatableUnit,
    reason: ReasonCode,
    detail: String,
}

/// 单票直接丢弃；并单留待拆分重试
fn reject(
    plan: &mut AssignmentPlan,
    split_retry: &mut Vec<Rejected>,
    unit: &AllocatableUnit,
    reason: ReasonCode,
    detail: String,
) {
    if unit.is_bundle() {
        split_retry.push(Rejected {
            unit: unit.clone(),
            reason,
            detail,
        });
    } else {
        drop_unit(plan, unit, reason, &detail);
    }
}

/// 并单拆回单票，按规则直派排序重试一次
///
/// 仍无法放置的成员保留优化器给出的原因码（截止超时除外）
fn retry_as_singles(
    plan: &mut AssignmentPlan,
    rejected: Vec<Rejected>,
    ledger: &mut WorkerLedger,
    ctx: &StrategyContext<'_>,
) {
    let mut origins: HashMap<String, (ReasonCode, String)> = HashMap::new();
    let mut singles = Vec::new();
    for Rejected { unit, reason, detail } in rejected {
        debug!(unit_ref = %unit.unit_ref(), reason_code = %reason, "并单未被优化器落位，拆回单票重试");
        for job_ref in unit.job_refs() {
            origins.insert(job_ref, (reason, detail.clone()));
        }
        singles.extend(unit.into_singles());
    }

    let retried = DirectStrategy::new().allocate(singles, ledger, ctx);
    for (worker_id, job_refs) in retried.trips() {
        if let Err(dup) = plan.assign(worker_id, job_refs) {
            warn!(job_ref = %dup, worker_id = %worker_id, "拆分重试结果与方案重复");
        }
    }
    for dropped in retried.dropped() {
        let (reason, detail) = match origins.get(&dropped.job_ref) {
            Some(_) if dropped.reason == ReasonCode::DeadlineExceeded => (dropped.reason, dropped.detail.clone()),
            Some((reason, detail)) => (*reason, format!("{}; split retry: {}", detail, dropped.detail)),
            None => (dropped.reason, dropped.detail.clone()),
        };
        plan.drop_job(dropped.job_ref.clone(), reason, detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::error::{CollaboratorError, CollaboratorResult};
    use crate::collaborator::optimizer::{OptimizerAssignment, OptimizerResponse};
    use crate::config::AllocationConfig;
    use crate::domain::bundle::Bundle;
    use crate::domain::geo::GeoPoint;
    use crate::domain::job::{ExclusionTag, Job};
    use crate::domain::types::{JobStatus, WorkerStatus};
    use crate::domain::window::TimeWindow;
    use crate::domain::worker::Worker;
    use crate::engine::ranking::RankingEngine;
    use crate::engine::strategy::Deadline;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    // ==========================================
    // 测试辅助
    // ==========================================

    struct FixedOptimizer {
        response: CollaboratorResult<OptimizerResponse>,
        seen: Mutex<Option<OptimizerRequest>>,
    }

    impl FixedOptimizer {
        fn returning(response: OptimizerResponse) -> Self {
            Self {
                response: Ok(response),
                seen: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(CollaboratorError::Unavailable("solver down".to_string())),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl OptimizerService for FixedOptimizer {
        async fn solve(&self, request: &OptimizerRequest) -> CollaboratorResult<OptimizerResponse> {
            *self.seen.lock().unwrap() = Some(request.clone());
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(CollaboratorError::Unavailable(e.to_string())),
            }
        }
    }

    struct SlowOptimizer;

    #[async_trait]
    impl OptimizerService for SlowOptimizer {
        async fn solve(&self, _request: &OptimizerRequest) -> CollaboratorResult<OptimizerResponse> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(OptimizerResponse::default())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn create_test_job(job_ref: &str, tags: &[&str]) -> Job {
        Job {
            job_ref: job_ref.to_string(),
            hub_id: "HUB1".to_string(),
            source: "web".to_string(),
            origin: GeoPoint::new(31.20, 121.40),
            destination: GeoPoint::new(31.23, 121.47),
            window: TimeWindow::new(now() + Duration::hours(2), now() + Duration::hours(3)),
            weight_kg: 5.0,
            volume_m3: 0.1,
            cash_amount: None,
            status: JobStatus::Unassigned,
            assigned_worker_id: None,
            assigned_trip_id: None,
            group_id: None,
            reassignment_attempts: 0,
            required_tags: tags.iter().map(|s| s.to_string()).collect(),
            labels: BTreeSet::new(),
            exclusions: Vec::new(),
            created_at: now() - Duration::minutes(10),
        }
    }

    fn create_test_worker(id: &str, caps: &[&str], max_jobs: u32) -> Worker {
        Worker {
            id: id.to_string(),
            hub_id: "HUB1".to_string(),
            status: WorkerStatus::AvailableIdle,
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
            vehicle_class: None,
            max_jobs,
            max_weight_kg: 100.0,
            current_jobs: 0,
            current_weight_kg: 0.0,
            shift: None,
            location: None,
            last_activity_at: None,
            cash_held: 0.0,
            cash_limit: None,
        }
    }

    fn assignment(worker_id: &str, refs: &[&str]) -> OptimizerAssignment {
        OptimizerAssignment {
            worker_id: worker_id.to_string(),
            unit_refs: refs.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn run_with(
        service: Arc<dyn OptimizerService>,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        config: &AllocationConfig,
        budget: std::time::Duration,
    ) -> AllocationResult<AssignmentPlan> {
        let ranking = RankingEngine::default();
        let ctx = StrategyContext {
            hub_id: "HUB1",
            config,
            ranking: &ranking,
            now: now(),
            deadline: Deadline::after(budget),
        };
        OptimizerStrategy::new(service).execute(units, ledger, &ctx).await
    }

    #[tokio::test]
    async fn test_adopts_valid_pairs_and_rejects_invalid() {
        let units = vec![
            AllocatableUnit::Single(create_test_job("J1", &["refrigerated"])),
            AllocatableUnit::Single(create_test_job("J2", &["refrigerated"])),
            AllocatableUnit::Single(create_test_job("J3", &[])),
            AllocatableUnit::Single(create_test_job("J4", &[])),
        ];
        let service = Arc::new(FixedOptimizer::returning(OptimizerResponse {
            assignments: vec![
                assignment("COLD", &["J1"]),
                // WARM 没有冷链能力，必须被复核拒绝
                assignment("WARM", &["J2", "J3"]),
            ],
            dropped: vec!["J4".to_string()],
        }));
        let mut ledger = WorkerLedger::new(vec![
            create_test_worker("COLD", &["refrigerated"], 6),
            create_test_worker("WARM", &[], 6),
        ]);

        let plan = run_with(
            service,
            units,
            &mut ledger,
            &AllocationConfig::default(),
            std::time::Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert_eq!(plan.worker_for("J1"), Some("COLD"));
        assert_eq!(plan.worker_for("J3"), Some("WARM"));
        assert!(plan.worker_for("J2").is_none());
        let reason_of = |r: &str| plan.dropped().iter().find(|d| d.job_ref == r).map(|d| d.reason);
        assert_eq!(reason_of("J2"), Some(ReasonCode::OptimizerRejected));
        assert_eq!(reason_of("J4"), Some(ReasonCode::OptimizerDropped));
        assert_eq!(ledger.get("WARM").unwrap().current_jobs, 1);
    }

    #[tokio::test]
    async fn test_capacity_recheck_and_omitted_units() {
        let units = vec![
            AllocatableUnit::Single(create_test_job("J1", &[])),
            AllocatableUnit::Single(create_test_job("J2", &[])),
            AllocatableUnit::Single(create_test_job("J3", &[])),
        ];
        let service = Arc::new(FixedOptimizer::returning(OptimizerResponse {
            assignments: vec![assignment("W1", &["J1", "J2"])],
            dropped: Vec::new(),
        }));
        let mut ledger = WorkerLedger::new(vec![create_test_worker("W1", &[], 1)]);

        let plan = run_with(
            service,
            units,
            &mut ledger,
            &AllocationConfig::default(),
            std::time::Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert_eq!(plan.worker_for("J1"), Some("W1"));
        let reasons: Vec<(String, ReasonCode)> = plan
            .dropped()
            .iter()
            .map(|d| (d.job_ref.clone(), d.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("J2".to_string(), ReasonCode::OptimizerRejected),
                ("J3".to_string(), ReasonCode::OptimizerOmitted),
            ]
        );
    }

    #[tokio::test]
    async fn test_bundle_ref_expands_to_members_and_exclusions_sent() {
        let mut a = create_test_job("A", &[]);
        a.exclusions.push(ExclusionTag::new("W2", now() + Duration::hours(1)));
        let b = create_test_job("B", &[]);
        let bundle = AllocatableUnit::Bundle(Bundle {
            bundle_id: "CLUB-A".to_string(),
            hub_id: "HUB1".to_string(),
            required_tags: BTreeSet::new(),
            window: a.window,
            weight_kg: 10.0,
            sources: BTreeSet::from(["web".to_string()]),
            members: vec![a, b],
        });
        let service = Arc::new(FixedOptimizer::returning(OptimizerResponse {
            assignments: vec![assignment("W1", &["CLUB-A"])],
            dropped: Vec::new(),
        }));
        let mut ledger = WorkerLedger::new(vec![
            create_test_worker("W1", &[], 6),
            create_test_worker("W2", &[], 6),
        ]);

        let plan = run_with(
            service.clone(),
            vec![bundle],
            &mut ledger,
            &AllocationConfig::default(),
            std::time::Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert_eq!(plan.trip_for("W1").unwrap(), &["A".to_string(), "B".to_string()][..]);
        let seen = service.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.units[0].job_refs, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(seen.units[0].excluded_workers, vec!["W2".to_string()]);
        assert_eq!(seen.workers.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_bundle_is_split_and_retried() {
        let mut a = create_test_job("A", &[]);
        a.weight_kg = 60.0;
        let mut b = create_test_job("B", &[]);
        b.weight_kg = 60.0;
        let bundle = AllocatableUnit::Bundle(Bundle {
            bundle_id: "CLUB-A".to_string(),
            hub_id: "HUB1".to_string(),
            required_tags: BTreeSet::new(),
            window: a.window,
            weight_kg: 120.0,
            sources: BTreeSet::from(["web".to_string()]),
            members: vec![a, b],
        });
        // 120kg 整单超出 W1 载重，单票各自都能放下
        let service = Arc::new(FixedOptimizer::returning(OptimizerResponse {
            assignments: vec![assignment("W1", &["CLUB-A"])],
            dropped: Vec::new(),
        }));
        let mut ledger = WorkerLedger::new(vec![
            create_test_worker("W1", &[], 6),
            create_test_worker("W2", &[], 6),
        ]);

        let plan = run_with(
            service,
            vec![bundle],
            &mut ledger,
            &AllocationConfig::default(),
            std::time::Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert!(plan.dropped().is_empty());
        let a_worker = plan.worker_for("A").unwrap();
        let b_worker = plan.worker_for("B").unwrap();
        assert_ne!(a_worker, b_worker);
        assert_eq!(ledger.get("W1").unwrap().current_weight_kg, 60.0);
        assert_eq!(ledger.get("W2").unwrap().current_weight_kg, 60.0);
    }

    #[tokio::test]
    async fn test_omitted_bundle_members_keep_optimizer_reason_when_retry_fails() {
        let bundle = AllocatableUnit::Bundle(Bundle {
            bundle_id: "CLUB-A".to_string(),
            hub_id: "HUB1".to_string(),
            required_tags: BTreeSet::from(["hazmat".to_string()]),
            window: create_test_job("A", &[]).window,
            weight_kg: 10.0,
            sources: BTreeSet::from(["web".to_string()]),
            members: vec![create_test_job("A", &["hazmat"]), create_test_job("B", &["hazmat"])],
        });
        let service = Arc::new(FixedOptimizer::returning(OptimizerResponse::default()));
        let mut ledger = WorkerLedger::new(vec![create_test_worker("W1", &[], 6)]);

        let plan = run_with(
            service,
            vec![bundle],
            &mut ledger,
            &AllocationConfig::default(),
            std::time::Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert_eq!(plan.assigned_count(), 0);
        let reasons: Vec<(String, ReasonCode)> = plan
            .dropped()
            .iter()
            .map(|d| (d.job_ref.clone(), d.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("A".to_string(), ReasonCode::OptimizerOmitted),
                ("B".to_string(), ReasonCode::OptimizerOmitted),
            ]
        );
    }

    #[tokio::test]
    async fn test_service_failure_leaves_ledger_untouched() {
        let mut ledger = WorkerLedger::new(vec![create_test_worker("W1", &[], 6)]);
        let result = run_with(
            Arc::new(FixedOptimizer::failing()),
            vec![AllocatableUnit::Single(create_test_job("J1", &[]))],
            &mut ledger,
            &AllocationConfig::default(),
            std::time::Duration::from_secs(30),
        )
        .await;

        assert!(matches!(result, Err(AllocationError::ExternalService(_))));
        assert_eq!(ledger.get("W1").unwrap().current_jobs, 0);
    }

    #[tokio::test]
    async fn test_timeout_bounded_by_config() {
        let mut config = AllocationConfig::default();
        config.optimizer.timeout_ms = 50;
        let mut ledger = WorkerLedger::new(vec![create_test_worker("W1", &[], 6)]);
        let result = run_with(
            Arc::new(SlowOptimizer),
            vec![AllocatableUnit::Single(create_test_job("J1", &[]))],
            &mut ledger,
            &config,
            std::time::Duration::from_secs(30),
        )
        .await;

        match result {
            Err(AllocationError::ExternalService(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other.map(|p| p.assigned_count())),
        }
    }
}
