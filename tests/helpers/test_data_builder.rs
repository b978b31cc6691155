// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::{DateTime, Duration, TimeZone, Utc};
use dispatch_core::domain::{ExclusionTag, GeoPoint, Job, JobStatus, TimeWindow, Worker, WorkerStatus};
use std::collections::BTreeSet;

pub const HUB: &str = "HUB1";

/// 固定测试时刻: 2026-03-02 hh:mm UTC
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

/// 站点附近的送达点
pub fn downtown() -> GeoPoint {
    GeoPoint::new(31.2304, 121.4737)
}

// ==========================================
// Job 构建器
// ==========================================

pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(job_ref: &str) -> Self {
        Self {
            job: Job {
                job_ref: job_ref.to_string(),
                hub_id: HUB.to_string(),
                source: "web".to_string(),
                origin: GeoPoint::new(31.2000, 121.4000),
                destination: downtown(),
                window: TimeWindow::new(at(14, 0), at(15, 0)),
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
                created_at: at(10, 0),
            },
        }
    }

    pub fn hub(mut self, hub_id: &str) -> Self {
        self.job.hub_id = hub_id.to_string();
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.job.source = source.to_string();
        self
    }

    pub fn window(mut self, open: DateTime<Utc>, close: DateTime<Utc>) -> Self {
        self.job.window = TimeWindow::new(open, close);
        self
    }

    pub fn destination(mut self, point: GeoPoint) -> Self {
        self.job.destination = point;
        self
    }

    pub fn weight(mut self, weight_kg: f64) -> Self {
        self.job.weight_kg = weight_kg;
        self
    }

    pub fn requires(mut self, tags: &[&str]) -> Self {
        self.job.required_tags = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.job.labels.insert(label.to_string());
        self
    }

    pub fn excludes(mut self, worker_id: &str, expires_at: DateTime<Utc>) -> Self {
        self.job.exclusions.push(ExclusionTag::new(worker_id, expires_at));
        self
    }

    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.job.created_at = ts;
        self
    }

    pub fn assigned_to(mut self, worker_id: &str, attempts: u32) -> Self {
        self.job.status = JobStatus::Assigned;
        self.job.assigned_worker_id = Some(worker_id.to_string());
        self.job.assigned_trip_id = Some(format!("TRIP-{}", worker_id));
        self.job.reassignment_attempts = attempts;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

// ==========================================
// Worker 构建器
// ==========================================

pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            worker: Worker {
                id: id.to_string(),
                hub_id: HUB.to_string(),
                status: WorkerStatus::AvailableIdle,
                capabilities: BTreeSet::new(),
                vehicle_class: None,
                max_jobs: 6,
                max_weight_kg: 100.0,
                current_jobs: 0,
                current_weight_kg: 0.0,
                shift: None,
                location: None,
                last_activity_at: None,
                cash_held: 0.0,
                cash_limit: None,
            },
        }
    }

    pub fn hub(mut self, hub_id: &str) -> Self {
        self.worker.hub_id = hub_id.to_string();
        self
    }

    pub fn status(mut self, status: WorkerStatus) -> Self {
        self.worker.status = status;
        self
    }

    pub fn capabilities(mut self, tags: &[&str]) -> Self {
        self.worker.capabilities = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn load(mut self, current_jobs: u32, max_jobs: u32) -> Self {
        self.worker.current_jobs = current_jobs;
        self.worker.max_jobs = max_jobs;
        self
    }

    pub fn max_weight(mut self, max_weight_kg: f64) -> Self {
        self.worker.max_weight_kg = max_weight_kg;
        self
    }

    pub fn location(mut self, point: GeoPoint) -> Self {
        self.worker.location = Some(point);
        self
    }

    pub fn last_activity(mut self, ts: DateTime<Utc>) -> Self {
        self.worker.last_activity_at = Some(ts);
        self
    }

    pub fn idle_for(self, now: DateTime<Utc>, minutes: i64) -> Self {
        self.last_activity(now - Duration::minutes(minutes))
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}
