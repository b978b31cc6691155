// ==========================================
// 配送派单核心 - 并单与分配单元
// ==========================================
// 说明: 并单每个周期重新计算,不落库
// ==========================================

use crate::domain::geo::GeoPoint;
use crate::domain::job::Job;
use crate::domain::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// Bundle - 并单（2 单及以上）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub bundle_id: String,
    pub hub_id: String,
    pub members: Vec<Job>,
    pub required_tags: BTreeSet<String>, // 成员标签并集
    pub window: TimeWindow,              // 成员时间窗交集
    pub weight_kg: f64,                  // 成员重量之和
    pub sources: BTreeSet<String>,
}

impl Bundle {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn job_refs(&self) -> Vec<String> {
        self.members.iter().map(|j| j.job_ref.clone()).collect()
    }

    /// 是否跨来源并单
    pub fn is_cross_source(&self) -> bool {
        self.sources.len() > 1
    }
}

// ==========================================
// AllocatableUnit - 分配单元
// ==========================================
// 单票与并单统一对待：都有标签、重量、时间窗
#[derive(Debug, Clone)]
pub enum AllocatableUnit {
    Single(Job),
    Bundle(Bundle),
}

impl AllocatableUnit {
    /// 单元标识（单票为 job_ref，并单为 bundle_id）
    pub fn unit_ref(&self) -> &str {
        match self {
            AllocatableUnit::Single(job) => &job.job_ref,
            AllocatableUnit::Bundle(bundle) => &bundle.bundle_id,
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, AllocatableUnit::Bundle(_))
    }

    pub fn jobs(&self) -> &[Job] {
        match self {
            AllocatableUnit::Single(job) => std::slice::from_ref(job),
            AllocatableUnit::Bundle(bundle) => &bundle.members,
        }
    }

    pub fn job_refs(&self) -> Vec<String> {
        self.jobs().iter().map(|j| j.job_ref.clone()).collect()
    }

    pub fn job_count(&self) -> u32 {
        self.jobs().len() as u32
    }

    pub fn hub_id(&self) -> &str {
        match self {
            AllocatableUnit::Single(job) => &job.hub_id,
            AllocatableUnit::Bundle(bundle) => &bundle.hub_id,
        }
    }

    pub fn required_tags(&self) -> &BTreeSet<String> {
        match self {
            AllocatableUnit::Single(job) => &job.required_tags,
            AllocatableUnit::Bundle(bundle) => &bundle.required_tags,
        }
    }

    pub fn weight_kg(&self) -> f64 {
        match self {
            AllocatableUnit::Single(job) => job.weight_kg,
            AllocatableUnit::Bundle(bundle) => bundle.weight_kg,
        }
    }

    pub fn volume_m3(&self) -> f64 {
        self.jobs().iter().map(|j| j.volume_m3).sum()
    }

    pub fn cash(&self) -> f64 {
        self.jobs().iter().map(|j| j.cash()).sum()
    }

    pub fn window(&self) -> TimeWindow {
        match self {
            AllocatableUnit::Single(job) => job.window,
            AllocatableUnit::Bundle(bundle) => bundle.window,
        }
    }

    /// 取件点（并单取首单）
    pub fn origin(&self) -> GeoPoint {
        match self {
            AllocatableUnit::Single(job) => job.origin,
            AllocatableUnit::Bundle(bundle) => bundle
                .members
                .first()
                .map(|j| j.origin)
                .unwrap_or(GeoPoint::new(0.0, 0.0)),
        }
    }

    pub fn destination(&self) -> GeoPoint {
        match self {
            AllocatableUnit::Single(job) => job.destination,
            AllocatableUnit::Bundle(bundle) => bundle
                .members
                .first()
                .map(|j| j.destination)
                .unwrap_or(GeoPoint::new(0.0, 0.0)),
        }
    }

    /// 最早入单时间（用于顺序策略）
    pub fn created_at(&self) -> DateTime<Utc> {
        self.jobs()
            .iter()
            .map(|j| j.created_at)
            .min()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// 所有成员有效排除骑手的并集
    pub fn active_exclusions(&self, now: DateTime<Utc>) -> BTreeSet<String> {
        self.jobs()
            .iter()
            .flat_map(|j| j.active_exclusions(now))
            .collect()
    }

    /// 拆回单票
    pub fn into_singles(self) -> Vec<AllocatableUnit> {
        match self {
            AllocatableUnit::Single(job) => vec![AllocatableUnit::Single(job)],
            AllocatableUnit::Bundle(bundle) => bundle
                .members
                .into_iter()
                .map(AllocatableUnit::Single)
                .collect(),
        }
    }
}
