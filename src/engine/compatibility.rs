// ==========================================
// 配送派单核心 - 兼容性判定 纯函数库
// ==========================================
// 职责: 标签子集判定 + 限时排除判定 + 骑手可用性判定
// 红线: 无状态、无副作用、无 I/O 操作
// 红线: 非法输入一律判不兼容（fail closed），不向分配循环抛错
// ==========================================

use crate::domain::bundle::AllocatableUnit;
use crate::domain::job::{ExclusionTag, Job};
use crate::domain::types::WorkerStatus;
use crate::domain::window::TimeWindow;
use crate::domain::worker::Worker;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

// ==========================================
// Ineligibility - 不兼容原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    MalformedInput(String),
    NotDispatchable(WorkerStatus),
    MissingTags(Vec<String>),
    Excluded,
    OutsideShift,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::MalformedInput(msg) => write!(f, "MALFORMED_INPUT: {}", msg),
            Ineligibility::NotDispatchable(status) => write!(f, "NOT_DISPATCHABLE: status={}", status),
            Ineligibility::MissingTags(tags) => write!(f, "MISSING_TAGS: {}", tags.join(",")),
            Ineligibility::Excluded => write!(f, "EXCLUDED"),
            Ineligibility::OutsideShift => write!(f, "OUTSIDE_SHIFT"),
        }
    }
}

// ==========================================
// CompatibilityEngine - 纯函数工具类
// ==========================================
pub struct CompatibilityEngine;

impl CompatibilityEngine {
    /// 标签子集判定
    ///
    /// # 规则
    /// - required 为空 → 恒为 true
    /// - required 非空且 capabilities 为空 → false
    /// - required 中任一标签不在 capabilities 中 → false
    /// - required 中出现空白标签 → false（非法输入）
    pub fn is_eligible(capabilities: &BTreeSet<String>, required: &BTreeSet<String>) -> bool {
        required
            .iter()
            .all(|tag| !tag.trim().is_empty() && capabilities.contains(tag))
    }

    /// 排除判定
    ///
    /// # 参数
    /// - active_exclusions: 当前有效的排除标签（标签即骑手 id）
    /// - worker_id: 骑手 id
    ///
    /// 空白 worker_id 视为被排除
    pub fn is_excluded(active_exclusions: &BTreeSet<String>, worker_id: &str) -> bool {
        if worker_id.trim().is_empty() {
            return true;
        }
        active_exclusions.contains(worker_id)
    }

    /// 从限时排除标签中筛出当前有效的部分
    ///
    /// 过期标签视同不存在，不需要删除
    pub fn active_exclusions(tags: &[ExclusionTag], now: DateTime<Utc>) -> BTreeSet<String> {
        tags.iter()
            .filter(|tag| tag.is_active(now))
            .map(|tag| tag.worker_id.clone())
            .collect()
    }

    /// 综合判定 = 标签满足 且 未被排除
    pub fn is_compatible(
        capabilities: &BTreeSet<String>,
        required: &BTreeSet<String>,
        active_exclusions: &BTreeSet<String>,
        worker_id: &str,
    ) -> bool {
        Self::is_eligible(capabilities, required) && !Self::is_excluded(active_exclusions, worker_id)
    }

    /// 判定骑手能否承接分配单元
    ///
    /// # 规则（依次判定，命中即返回）
    /// 1. 骑手数据非法 → MalformedInput
    /// 2. 状态不可派 → NotDispatchable
    /// 3. 标签不满足 → MissingTags
    /// 4. 被成员运单排除 → Excluded
    /// 5. 班次与单元时间窗无重叠 → OutsideShift
    pub fn check_unit(
        worker: &Worker,
        unit: &AllocatableUnit,
        now: DateTime<Utc>,
    ) -> Result<(), Ineligibility> {
        Self::check_requirements(
            worker,
            unit.required_tags(),
            &unit.active_exclusions(now),
            &unit.window(),
        )
    }

    /// 判定骑手能否承接单票运单（改派场景）
    pub fn check_job(worker: &Worker, job: &Job, now: DateTime<Utc>) -> Result<(), Ineligibility> {
        Self::check_requirements(
            worker,
            &job.required_tags,
            &job.active_exclusions(now),
            &job.window,
        )
    }

    fn check_requirements(
        worker: &Worker,
        required: &BTreeSet<String>,
        active_exclusions: &BTreeSet<String>,
        window: &TimeWindow,
    ) -> Result<(), Ineligibility> {
        if let Err(msg) = worker.validate() {
            return Err(Ineligibility::MalformedInput(msg));
        }

        if !worker.status.is_dispatchable() {
            return Err(Ineligibility::NotDispatchable(worker.status));
        }

        if !Self::is_eligible(&worker.capabilities, required) {
            let missing = required
                .iter()
                .filter(|tag| tag.trim().is_empty() || !worker.capabilities.contains(*tag))
                .cloned()
                .collect();
            return Err(Ineligibility::MissingTags(missing));
        }

        if Self::is_excluded(active_exclusions, &worker.id) {
            return Err(Ineligibility::Excluded);
        }

        if let Some(shift) = &worker.shift {
            if !shift.overlaps(window) {
                return Err(Ineligibility::OutsideShift);
            }
        }

        Ok(())
    }
}
