// ==========================================
// 协作方 Fake 实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::collaborator::{
    CollaboratorError, CollaboratorResult, JobRoute, JobWorkerSource, OptimizerRequest,
    OptimizerResponse, OptimizerService, PlanApplier, TravelTimeEstimator,
};
use dispatch_core::domain::{GeoPoint, Job, JobStatus, ReasonCode, TimeWindow, Worker, WorkerStatus};
use dispatch_core::engine::DispatchCollaborators;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 挂起时长，远大于测试里的周期截止时间
const STALL: Duration = Duration::from_secs(30);

// ==========================================
// InMemorySource - 内存快照数据源
// ==========================================

#[derive(Default)]
pub struct InMemorySource {
    pub jobs: Mutex<Vec<Job>>,
    pub workers: Mutex<Vec<Worker>>,
    pub unavailable: Mutex<bool>,
    /// 拉取时挂起（模拟存储无响应）
    pub stalled: Mutex<bool>,
}

impl InMemorySource {
    pub fn new(jobs: Vec<Job>, workers: Vec<Worker>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
            workers: Mutex::new(workers),
            unavailable: Mutex::new(false),
            stalled: Mutex::new(false),
        }
    }

    pub fn set_unavailable(&self, down: bool) {
        *self.unavailable.lock().unwrap() = down;
    }

    pub fn set_stalled(&self, stalled: bool) {
        *self.stalled.lock().unwrap() = stalled;
    }

    async fn check_up(&self) -> CollaboratorResult<()> {
        let stalled = *self.stalled.lock().unwrap();
        if stalled {
            tokio::time::sleep(STALL).await;
        }
        if *self.unavailable.lock().unwrap() {
            return Err(CollaboratorError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobWorkerSource for InMemorySource {
    async fn fetch_jobs(
        &self,
        hub_id: &str,
        statuses: &[JobStatus],
        window: Option<TimeWindow>,
    ) -> CollaboratorResult<Vec<Job>> {
        self.check_up().await?;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.hub_id == hub_id && statuses.contains(&j.status))
            .filter(|j| window.map_or(true, |w| w.overlaps(&j.window)))
            .cloned()
            .collect())
    }

    async fn fetch_workers(&self, hub_id: &str, statuses: &[WorkerStatus]) -> CollaboratorResult<Vec<Worker>> {
        self.check_up().await?;
        Ok(self
            .workers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.hub_id == hub_id && statuses.contains(&w.status))
            .cloned()
            .collect())
    }
}

// ==========================================
// RecordingApplier - 记录落地调用
// ==========================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyCall {
    pub worker_id: String,
    pub job_refs: Vec<String>,
    pub trip_id: String,
}

#[derive(Default)]
pub struct RecordingApplier {
    pub applied: Mutex<Vec<ApplyCall>>,
    pub unassigned: Mutex<Vec<(String, String, ReasonCode)>>,
    pub attempts: Mutex<HashMap<String, u32>>,
    /// 对这些骑手的 apply 返回 Conflict
    pub conflict_workers: Mutex<HashSet<String>>,
    /// 对这些骑手的 apply 返回 Unavailable
    pub failing_workers: Mutex<HashSet<String>>,
    pub fail_unassign: Mutex<bool>,
    /// 对这些骑手的 apply 挂起不返回
    pub stalled_workers: Mutex<HashSet<String>>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(self, job_ref: &str, attempts: u32) -> Self {
        self.attempts.lock().unwrap().insert(job_ref.to_string(), attempts);
        self
    }

    pub fn conflict_on(self, worker_id: &str) -> Self {
        self.conflict_workers.lock().unwrap().insert(worker_id.to_string());
        self
    }

    pub fn fail_on(self, worker_id: &str) -> Self {
        self.failing_workers.lock().unwrap().insert(worker_id.to_string());
        self
    }

    pub fn stall_on(self, worker_id: &str) -> Self {
        self.stalled_workers.lock().unwrap().insert(worker_id.to_string());
        self
    }

    pub fn applied_calls(&self) -> Vec<ApplyCall> {
        self.applied.lock().unwrap().clone()
    }

    pub fn unassign_calls(&self) -> Vec<(String, String, ReasonCode)> {
        self.unassigned.lock().unwrap().clone()
    }

    pub fn attempts_of(&self, job_ref: &str) -> u32 {
        self.attempts.lock().unwrap().get(job_ref).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PlanApplier for RecordingApplier {
    async fn apply(
        &self,
        worker_id: &str,
        job_refs: &[String],
        trip_id: Option<String>,
    ) -> CollaboratorResult<String> {
        let stalled = self.stalled_workers.lock().unwrap().contains(worker_id);
        if stalled {
            tokio::time::sleep(STALL).await;
        }
        if self.conflict_workers.lock().unwrap().contains(worker_id) {
            return Err(CollaboratorError::Conflict(format!("worker {} changed state", worker_id)));
        }
        if self.failing_workers.lock().unwrap().contains(worker_id) {
            return Err(CollaboratorError::Unavailable("applier offline".to_string()));
        }
        let mut applied = self.applied.lock().unwrap();
        let trip_id = trip_id.unwrap_or_else(|| format!("TRIP-{}-{}", worker_id, applied.len() + 1));
        applied.push(ApplyCall {
            worker_id: worker_id.to_string(),
            job_refs: job_refs.to_vec(),
            trip_id: trip_id.clone(),
        });
        Ok(trip_id)
    }

    async fn unassign(&self, worker_id: &str, job_ref: &str, reason: ReasonCode) -> CollaboratorResult<()> {
        if *self.fail_unassign.lock().unwrap() {
            return Err(CollaboratorError::Conflict(format!("job {} already moved", job_ref)));
        }
        self.unassigned
            .lock()
            .unwrap()
            .push((worker_id.to_string(), job_ref.to_string(), reason));
        Ok(())
    }

    async fn increment_reassignment_attempts(&self, job_ref: &str) -> CollaboratorResult<u32> {
        let mut attempts = self.attempts.lock().unwrap();
        let counter = attempts.entry(job_ref.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

// ==========================================
// TableTravelTime - 按骑手位置查表的行程时间
// ==========================================

#[derive(Default)]
pub struct TableTravelTime {
    table: Mutex<Vec<(GeoPoint, f64)>>,
}

impl TableTravelTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, location: GeoPoint, secs: f64) -> Self {
        self.table.lock().unwrap().push((location, secs));
        self
    }
}

#[async_trait]
impl TravelTimeEstimator for TableTravelTime {
    async fn estimate(
        &self,
        worker_location: GeoPoint,
        _route: &JobRoute,
        _now: DateTime<Utc>,
    ) -> CollaboratorResult<f64> {
        self.table
            .lock()
            .unwrap()
            .iter()
            .find(|(point, _)| *point == worker_location)
            .map(|(_, secs)| *secs)
            .ok_or_else(|| CollaboratorError::Unavailable("no estimate".to_string()))
    }
}

// ==========================================
// ScriptedOptimizer - 固定响应的优化器
// ==========================================

pub struct ScriptedOptimizer {
    response: Option<OptimizerResponse>,
    pub calls: Mutex<Vec<OptimizerRequest>>,
}

impl ScriptedOptimizer {
    pub fn returning(response: OptimizerResponse) -> Self {
        Self {
            response: Some(response),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 始终超时/不可用
    pub fn unavailable() -> Self {
        Self {
            response: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl OptimizerService for ScriptedOptimizer {
    async fn solve(&self, request: &OptimizerRequest) -> CollaboratorResult<OptimizerResponse> {
        self.calls.lock().unwrap().push(request.clone());
        self.response
            .clone()
            .ok_or_else(|| CollaboratorError::Timeout("solver did not answer".to_string()))
    }
}

// ==========================================
// 组装
// ==========================================

pub struct Harness {
    pub source: Arc<InMemorySource>,
    pub applier: Arc<RecordingApplier>,
    pub travel_time: Arc<TableTravelTime>,
}

impl Harness {
    pub fn new(jobs: Vec<Job>, workers: Vec<Worker>) -> Self {
        Self::with_parts(jobs, workers, RecordingApplier::new(), TableTravelTime::new())
    }

    pub fn with_parts(
        jobs: Vec<Job>,
        workers: Vec<Worker>,
        applier: RecordingApplier,
        travel_time: TableTravelTime,
    ) -> Self {
        Self {
            source: Arc::new(InMemorySource::new(jobs, workers)),
            applier: Arc::new(applier),
            travel_time: Arc::new(travel_time),
        }
    }

    pub fn collaborators(&self) -> DispatchCollaborators {
        DispatchCollaborators::new(self.source.clone(), self.applier.clone(), self.travel_time.clone())
    }
}
