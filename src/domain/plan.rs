// ==========================================
// 配送派单核心 - 分配方案
// ==========================================
// 红线: 同一 job_ref 在整个方案中最多出现在一个骑手名下
// ==========================================

use crate::domain::types::ReasonCode;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// 丢单记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedJob {
    pub job_ref: String,
    pub reason: ReasonCode,
    pub detail: String,
}

// ==========================================
// AssignmentPlan - 单周期分配方案
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentPlan {
    /// worker_id -> 有序 job_ref 列表（趟次）
    trips: BTreeMap<String, Vec<String>>,
    dropped: Vec<DroppedJob>,
    #[serde(skip)]
    assigned: HashSet<String>,
}

impl AssignmentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将一组运单追加到骑手名下
    ///
    /// 任一 job_ref 已在方案中则整体拒绝,返回重复的 job_ref
    pub fn assign(&mut self, worker_id: &str, job_refs: &[String]) -> Result<(), String> {
        let mut seen = HashSet::new();
        for job_ref in job_refs {
            if self.assigned.contains(job_ref) || !seen.insert(job_ref.as_str()) {
                return Err(job_ref.clone());
            }
        }

        self.assigned.extend(job_refs.iter().cloned());
        self.trips
            .entry(worker_id.to_string())
            .or_default()
            .extend(job_refs.iter().cloned());
        Ok(())
    }

    /// 记录丢单
    pub fn drop_job(&mut self, job_ref: impl Into<String>, reason: ReasonCode, detail: impl Into<String>) {
        self.dropped.push(DroppedJob {
            job_ref: job_ref.into(),
            reason,
            detail: detail.into(),
        });
    }

    pub fn contains_job(&self, job_ref: &str) -> bool {
        self.assigned.contains(job_ref)
    }

    /// 查询 job_ref 归属骑手
    pub fn worker_for(&self, job_ref: &str) -> Option<&str> {
        self.trips
            .iter()
            .find(|(_, refs)| refs.iter().any(|r| r == job_ref))
            .map(|(worker_id, _)| worker_id.as_str())
    }

    pub fn trips(&self) -> &BTreeMap<String, Vec<String>> {
        &self.trips
    }

    pub fn trip_for(&self, worker_id: &str) -> Option<&[String]> {
        self.trips.get(worker_id).map(|v| v.as_slice())
    }

    pub fn dropped(&self) -> &[DroppedJob] {
        &self.dropped
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_dropped(&self, job_ref: &str) -> bool {
        self.dropped.iter().any(|d| d.job_ref == job_ref)
    }
}
