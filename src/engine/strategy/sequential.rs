// ==========================================
// 配送派单核心 - 顺序贪心策略
// ==========================================
// 流程: 单元按入单时间（旧 → 新）处理，按骑手列表原顺序扫描，
//       第一个兼容且有运力的骑手中选；不做全局排序
// ==========================================

use crate::domain::bundle::AllocatableUnit;
use crate::domain::plan::AssignmentPlan;
use crate::engine::error::AllocationResult;
use crate::engine::ledger::WorkerLedger;
use crate::engine::strategy::{place_units, AllocationStrategy, StrategyContext, StrategyKind};
use async_trait::async_trait;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default)]
pub struct SequentialStrategy;

impl SequentialStrategy {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(
        &self,
        mut units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        ctx: &StrategyContext<'_>,
    ) -> AssignmentPlan {
        units.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.unit_ref().cmp(b.unit_ref()))
        });

        let plan = place_units(units, ledger, ctx, |ledger, unit| {
            ledger
                .compatible_workers(unit, ctx.now)
                .into_iter()
                .map(|w| w.id.clone())
                .collect()
        });

        info!(
            hub_id = %ctx.hub_id,
            assigned_count = plan.assigned_count(),
            dropped_count = plan.dropped().len(),
            "顺序贪心分配完成"
        );
        plan
    }
}

#[async_trait]
impl AllocationStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    #[instrument(skip_all, fields(hub_id = %ctx.hub_id, units_count = units.len()))]
    async fn execute(
        &self,
        units: Vec<AllocatableUnit>,
        ledger: &mut WorkerLedger,
        ctx: &StrategyContext<'_>,
    ) -> AllocationResult<AssignmentPlan> {
        Ok(self.allocate(units, ledger, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationConfig;
    use crate::domain::geo::GeoPoint;
    use crate::domain::job::Job;
    use crate::domain::types::{JobStatus, ReasonCode, WorkerStatus};
    use crate::domain::window::TimeWindow;
    use crate::domain::worker::Worker;
    use crate::engine::ranking::RankingEngine;
    use crate::engine::strategy::Deadline;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn create_test_job(job_ref: &str, age_minutes: i64) -> Job {
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
            required_tags: BTreeSet::new(),
            labels: BTreeSet::new(),
            exclusions: Vec::new(),
            created_at: now() - Duration::minutes(age_minutes),
        }
    }

    fn create_test_worker(id: &str, max_jobs: u32, current_jobs: u32) -> Worker {
        Worker {
            id: id.to_string(),
            hub_id: "HUB1".to_string(),
            status: WorkerStatus::AvailableAssigned,
            capabilities: BTreeSet::new(),
            vehicle_class: None,
            max_jobs,
            max_weight_kg: 100.0,
            current_jobs,
            current_weight_kg: 0.0,
            shift: None,
            location: None,
            last_activity_at: None,
            cash_held: 0.0,
            cash_limit: None,
        }
    }

    #[test]
    fn test_oldest_first_and_worker_list_order() {
        let config = AllocationConfig::default();
        let ranking = RankingEngine::default();
        let ctx = StrategyContext {
            hub_id: "HUB1",
            config: &config,
            ranking: &ranking,
            now: now(),
            deadline: Deadline::after(std::time::Duration::from_secs(60)),
        };
        // W1 只剩一个名额，W2 单量更多但排在后面
        let mut ledger = WorkerLedger::new(vec![
            create_test_worker("W1", 3, 2),
            create_test_worker("W2", 6, 5),
        ]);
        let units = vec![
            AllocatableUnit::Single(create_test_job("NEW", 5)),
            AllocatableUnit::Single(create_test_job("OLD", 50)),
            AllocatableUnit::Single(create_test_job("MID", 20)),
        ];
        let plan = SequentialStrategy::new().allocate(units, &mut ledger, &ctx);

        assert_eq!(plan.worker_for("OLD"), Some("W1"));
        assert_eq!(plan.worker_for("MID"), Some("W2"));
        assert!(plan.is_dropped("NEW"));
        assert_eq!(plan.dropped()[0].reason, ReasonCode::CapacityExceeded);
        assert_eq!(ledger.get("W1").unwrap().current_jobs, 3);
        assert_eq!(ledger.get("W2").unwrap().current_jobs, 6);
    }
}
