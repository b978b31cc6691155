// ==========================================
// 配送派单核心 - 运单领域模型
// ==========================================
// 红线: 同一时刻一单只能归属一个骑手
// 说明: 运单由上游入单服务创建,核心只读快照
// ==========================================

use crate::domain::geo::GeoPoint;
use crate::domain::types::JobStatus;
use crate::domain::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 禁止并单标签
pub const NO_CLUB_LABEL: &str = "no-club";

// ==========================================
// ExclusionTag - 限时排除标签
// ==========================================
// 标签内容即被排除骑手的 id；过期即失效，不做主动清理
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionTag {
    pub worker_id: String,
    pub expires_at: DateTime<Utc>,
}

impl ExclusionTag {
    pub fn new(worker_id: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            worker_id: worker_id.into(),
            expires_at,
        }
    }

    /// now < expires_at 才算有效
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// ==========================================
// Job - 运单快照
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    // ===== 主键 =====
    pub job_ref: String,
    pub hub_id: String,
    pub source: String, // 入单来源（部分来源禁止与其他来源并单）

    // ===== 路线与时效 =====
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub window: TimeWindow,

    // ===== 货物 =====
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub cash_amount: Option<f64>, // 代收货款

    // ===== 状态 =====
    pub status: JobStatus,
    pub assigned_worker_id: Option<String>,
    pub assigned_trip_id: Option<String>,
    pub group_id: Option<String>,
    pub reassignment_attempts: u32,

    // ===== 约束 =====
    #[serde(default)]
    pub required_tags: BTreeSet<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub exclusions: Vec<ExclusionTag>,

    pub created_at: DateTime<Utc>,
}

impl Job {
    /// 是否可参与本周期分配（只有 unassigned 进入分配池）
    pub fn is_allocatable(&self) -> bool {
        self.status == JobStatus::Unassigned
    }

    /// 是否允许并单
    pub fn is_clubbable(&self) -> bool {
        !self.labels.contains(NO_CLUB_LABEL)
    }

    /// 当前有效的排除骑手集合
    pub fn active_exclusions(&self, now: DateTime<Utc>) -> BTreeSet<String> {
        self.exclusions
            .iter()
            .filter(|tag| tag.is_active(now))
            .map(|tag| tag.worker_id.clone())
            .collect()
    }

    /// 代收金额（缺省为 0）
    pub fn cash(&self) -> f64 {
        self.cash_amount.unwrap_or(0.0)
    }

    /// 数据质量检查
    ///
    /// # 返回
    /// - Ok(()): 可进入分配
    /// - Err(reason): 不合法,本周期跳过
    pub fn validate(&self) -> Result<(), String> {
        if self.job_ref.trim().is_empty() {
            return Err("job_ref missing".to_string());
        }
        if !self.weight_kg.is_finite() || self.weight_kg < 0.0 {
            return Err(format!("weight_kg invalid ({})", self.weight_kg));
        }
        if !self.volume_m3.is_finite() || self.volume_m3 < 0.0 {
            return Err(format!("volume_m3 invalid ({})", self.volume_m3));
        }
        if !self.window.is_valid() {
            return Err(format!(
                "window invalid (open={}, close={})",
                self.window.open, self.window.close
            ));
        }
        if !self.origin.is_valid() || !self.destination.is_valid() {
            return Err("coordinates invalid".to_string());
        }
        if self.required_tags.iter().any(|t| t.trim().is_empty()) {
            return Err("blank required tag".to_string());
        }
        if let Some(cash) = self.cash_amount {
            if !cash.is_finite() || cash < 0.0 {
                return Err(format!("cash_amount invalid ({})", cash));
            }
        }
        Ok(())
    }
}
