// ==========================================
// 配送派单核心 - 骑手领域模型
// ==========================================
// 红线: current_jobs <= max_jobs, current_weight <= max_weight,
//       在任何分配落地之前校验
// 说明: 骑手档案归骑手管理服务所有,核心只读
// ==========================================

use crate::domain::geo::GeoPoint;
use crate::domain::types::{VehicleClass, WorkerStatus};
use crate::domain::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// WorkerProfile - 原始骑手档案
// ==========================================
// 骑手自身标签与车辆标签分开存放，快照时合并
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: String,
    pub hub_id: String,
    pub status: WorkerStatus,
    #[serde(default)]
    pub own_tags: Vec<String>,
    #[serde(default)]
    pub vehicle_tags: Vec<String>,
    pub vehicle_class: Option<VehicleClass>,
    pub max_jobs: u32,
    pub max_weight_kg: f64,
    #[serde(default)]
    pub current_jobs: u32,
    #[serde(default)]
    pub current_weight_kg: f64,
    pub shift: Option<TimeWindow>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub cash_held: f64,
    pub cash_limit: Option<f64>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

// ==========================================
// Worker - 骑手快照
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub hub_id: String,
    pub status: WorkerStatus,

    // ===== 能力（自身 + 车辆，已合并） =====
    pub capabilities: BTreeSet<String>,
    pub vehicle_class: Option<VehicleClass>,

    // ===== 运力上限 =====
    pub max_jobs: u32,
    pub max_weight_kg: f64,

    // ===== 当前负载 =====
    pub current_jobs: u32,
    pub current_weight_kg: f64,

    // ===== 可用性 =====
    pub shift: Option<TimeWindow>,
    pub location: Option<GeoPoint>,
    pub last_activity_at: Option<DateTime<Utc>>,

    // ===== 代收 =====
    pub cash_held: f64,
    pub cash_limit: Option<f64>,
}

impl Worker {
    /// 从原始档案构建快照（合并能力标签）
    ///
    /// 空白标签丢弃，标签去首尾空格
    pub fn from_profile(profile: WorkerProfile) -> Self {
        let capabilities = merge_capabilities(&profile.own_tags, &profile.vehicle_tags);
        Self {
            id: profile.id,
            hub_id: profile.hub_id,
            status: profile.status,
            capabilities,
            vehicle_class: profile.vehicle_class,
            max_jobs: profile.max_jobs,
            max_weight_kg: profile.max_weight_kg,
            current_jobs: profile.current_jobs,
            current_weight_kg: profile.current_weight_kg,
            shift: profile.shift,
            location: profile.location,
            last_activity_at: profile.last_activity_at,
            cash_held: profile.cash_held,
            cash_limit: profile.cash_limit,
        }
    }

    /// 数据质量检查
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("worker id missing".to_string());
        }
        if !self.max_weight_kg.is_finite() || self.max_weight_kg < 0.0 {
            return Err(format!("max_weight_kg invalid ({})", self.max_weight_kg));
        }
        if !self.current_weight_kg.is_finite() || self.current_weight_kg < 0.0 {
            return Err(format!(
                "current_weight_kg invalid ({})",
                self.current_weight_kg
            ));
        }
        if let Some(shift) = &self.shift {
            if !shift.is_valid() {
                return Err("shift window invalid".to_string());
            }
        }
        Ok(())
    }
}

/// 合并骑手标签与车辆标签为统一能力集合
pub fn merge_capabilities(own_tags: &[String], vehicle_tags: &[String]) -> BTreeSet<String> {
    own_tags
        .iter()
        .chain(vehicle_tags.iter())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

// ==========================================
// Trait: CapacityConstraint
// ==========================================
// 用途: 分配前运力约束检查接口
pub trait CapacityConstraint {
    /// 检查是否可追加 job_count 单、weight_kg 重量、cash 代收
    fn can_take(&self, job_count: u32, weight_kg: f64, cash: f64) -> bool;

    /// 是否已满单
    fn is_full(&self) -> bool;

    /// 剩余单量
    fn remaining_jobs(&self) -> u32;

    /// 剩余载重（kg）
    fn remaining_weight_kg(&self) -> f64;
}

impl CapacityConstraint for Worker {
    /// 三项约束同时满足才可追加：
    /// 1) current_jobs + job_count <= max_jobs
    /// 2) current_weight + weight <= max_weight
    /// 3) cash_held + cash <= cash_limit（未配置则不限）
    fn can_take(&self, job_count: u32, weight_kg: f64, cash: f64) -> bool {
        if !weight_kg.is_finite() || !cash.is_finite() {
            return false;
        }
        let jobs_ok = self
            .current_jobs
            .checked_add(job_count)
            .map(|total| total <= self.max_jobs)
            .unwrap_or(false);
        let weight_ok = self.current_weight_kg + weight_kg <= self.max_weight_kg;
        let cash_ok = match self.cash_limit {
            Some(limit) => self.cash_held + cash <= limit,
            None => true,
        };
        jobs_ok && weight_ok && cash_ok
    }

    fn is_full(&self) -> bool {
        self.current_jobs >= self.max_jobs
    }

    fn remaining_jobs(&self) -> u32 {
        self.max_jobs.saturating_sub(self.current_jobs)
    }

    fn remaining_weight_kg(&self) -> f64 {
        (self.max_weight_kg - self.current_weight_kg).max(0.0)
    }
}
