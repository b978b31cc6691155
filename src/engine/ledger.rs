// ==========================================
// 配送派单核心 - 周期内运力台账
// ==========================================
// 职责: 记录本周期内已预占的单量/载重/代收,防止同周期超卖
// 说明: 只在内存中累加,真实负载由落地服务写入
// ==========================================

use crate::domain::bundle::AllocatableUnit;
use crate::domain::worker::{CapacityConstraint, Worker};
use crate::engine::compatibility::{CompatibilityEngine, Ineligibility};
use crate::engine::error::{AllocationError, AllocationResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub struct WorkerLedger {
    workers: Vec<Worker>,
    index: HashMap<String, usize>,
}

impl WorkerLedger {
    /// 创建台账（保持输入顺序；重复 id 只保留第一条）
    pub fn new(workers: Vec<Worker>) -> Self {
        let mut kept = Vec::with_capacity(workers.len());
        let mut index = HashMap::new();
        for worker in workers {
            if index.contains_key(&worker.id) {
                tracing::warn!(worker_id = %worker.id, "重复骑手快照，已忽略");
                continue;
            }
            index.insert(worker.id.clone(), kept.len());
            kept.push(worker);
        }
        Self { workers: kept, index }
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn get(&self, worker_id: &str) -> Option<&Worker> {
        self.index.get(worker_id).map(|&i| &self.workers[i])
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// 兼容性判定（不含运力）
    pub fn check(&self, worker_id: &str, unit: &AllocatableUnit, now: DateTime<Utc>) -> Result<(), Ineligibility> {
        match self.get(worker_id) {
            Some(worker) => CompatibilityEngine::check_unit(worker, unit, now),
            None => Err(Ineligibility::MalformedInput(format!("unknown worker {}", worker_id))),
        }
    }

    /// 兼容的骑手（保持台账顺序）
    pub fn compatible_workers(&self, unit: &AllocatableUnit, now: DateTime<Utc>) -> Vec<&Worker> {
        self.workers
            .iter()
            .filter(|w| CompatibilityEngine::check_unit(w, unit, now).is_ok())
            .collect()
    }

    /// 剩余运力能否承接该单元
    pub fn has_capacity(&self, worker_id: &str, unit: &AllocatableUnit) -> bool {
        self.get(worker_id)
            .map(|w| w.can_take(unit.job_count(), unit.weight_kg(), unit.cash()))
            .unwrap_or(false)
    }

    /// 预占运力
    ///
    /// # 返回
    /// - Ok(()): 已累加到骑手当前负载
    /// - Err(CapacityExceeded): 未做任何修改
    pub fn reserve(&mut self, worker_id: &str, unit: &AllocatableUnit) -> AllocationResult<()> {
        let exceeded = || AllocationError::CapacityExceeded {
            worker_id: worker_id.to_string(),
            unit_ref: unit.unit_ref().to_string(),
        };
        let &i = self.index.get(worker_id).ok_or_else(exceeded)?;
        let worker = &mut self.workers[i];
        if !worker.can_take(unit.job_count(), unit.weight_kg(), unit.cash()) {
            return Err(exceeded());
        }
        worker.current_jobs += unit.job_count();
        worker.current_weight_kg += unit.weight_kg();
        worker.cash_held += unit.cash();
        Ok(())
    }

    /// 释放运力（运单已从该骑手撤出）
    ///
    /// 只减到 0 为止；快照里不存在的骑手忽略
    pub fn release(&mut self, worker_id: &str, unit: &AllocatableUnit) {
        let Some(&i) = self.index.get(worker_id) else {
            return;
        };
        let worker = &mut self.workers[i];
        worker.current_jobs = worker.current_jobs.saturating_sub(unit.job_count());
        worker.current_weight_kg = (worker.current_weight_kg - unit.weight_kg()).max(0.0);
        worker.cash_held = (worker.cash_held - unit.cash()).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::GeoPoint;
    use crate::domain::job::Job;
    use crate::domain::types::{JobStatus, WorkerStatus};
    use crate::domain::window::TimeWindow;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn create_test_job(job_ref: &str, weight_kg: f64, cash: Option<f64>) -> Job {
        Job {
            job_ref: job_ref.to_string(),
            hub_id: "HUB1".to_string(),
            source: "web".to_string(),
            origin: GeoPoint::new(31.20, 121.40),
            destination: GeoPoint::new(31.23, 121.47),
            window: TimeWindow::new(now(), now() + chrono::Duration::hours(1)),
            weight_kg,
            volume_m3: 0.1,
            cash_amount: cash,
            status: JobStatus::Assigned,
            assigned_worker_id: None,
            assigned_trip_id: None,
            group_id: None,
            reassignment_attempts: 0,
            required_tags: BTreeSet::new(),
            labels: BTreeSet::new(),
            exclusions: Vec::new(),
            created_at: now(),
        }
    }

    fn create_test_worker(id: &str, current_jobs: u32, max_jobs: u32) -> Worker {
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
    fn test_reserve_then_release_restores_capacity() {
        let mut ledger = WorkerLedger::new(vec![create_test_worker("X", 0, 1)]);
        let unit = AllocatableUnit::Single(create_test_job("J1", 40.0, Some(25.0)));

        ledger.reserve("X", &unit).unwrap();
        assert!(!ledger.has_capacity("X", &unit));
        assert!(matches!(
            ledger.reserve("X", &unit),
            Err(AllocationError::CapacityExceeded { .. })
        ));

        ledger.release("X", &unit);
        let worker = ledger.get("X").unwrap();
        assert_eq!(worker.current_jobs, 0);
        assert_eq!(worker.current_weight_kg, 0.0);
        assert_eq!(worker.cash_held, 0.0);
        assert!(ledger.has_capacity("X", &unit));
    }

    #[test]
    fn test_release_never_goes_below_zero() {
        // 快照负载里不含该单的重量/代收（例如外部刚写入）
        let mut ledger = WorkerLedger::new(vec![create_test_worker("X", 1, 1)]);
        let unit = AllocatableUnit::Single(create_test_job("J1", 40.0, Some(25.0)));

        ledger.release("X", &unit);
        ledger.release("X", &unit);
        ledger.release("GHOST", &unit);

        let worker = ledger.get("X").unwrap();
        assert_eq!(worker.current_jobs, 0);
        assert_eq!(worker.current_weight_kg, 0.0);
        assert_eq!(worker.cash_held, 0.0);
    }
}
