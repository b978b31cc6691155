// ==========================================
// 配送派单核心 - 骑手排序引擎
// ==========================================
// 职责: 按可配置的排序键列表对候选骑手排序
// 输入: 已通过兼容性过滤的骑手列表 + 排序键顺序
// 输出: 排序后的骑手列表（排列,不增不减）
// 红线: 稳定排序; 同输入同排序键 → 同输出
// ==========================================

mod comparators;

use crate::domain::geo::GeoPoint;
use crate::domain::types::{VehicleClass, WorkerStatus};
use crate::domain::worker::Worker;
use comparators::comparator_for;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;

// ==========================================
// CriterionKey - 排序键
// ==========================================
// 未知键反序列化为 Unknown，比较时视为相等
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CriterionKey {
    CurrentJobCountAsc,
    CurrentWeightAsc,
    RemainingCapacityDesc,
    LastActivityAsc,
    LastActivityDesc,
    VehicleClassPreference,
    StatusPriority,
    DistanceToUnitAsc,
    Unknown(String),
}

impl CriterionKey {
    pub fn as_str(&self) -> &str {
        match self {
            CriterionKey::CurrentJobCountAsc => "current_job_count_asc",
            CriterionKey::CurrentWeightAsc => "current_weight_asc",
            CriterionKey::RemainingCapacityDesc => "remaining_capacity_desc",
            CriterionKey::LastActivityAsc => "last_activity_asc",
            CriterionKey::LastActivityDesc => "last_activity_desc",
            CriterionKey::VehicleClassPreference => "vehicle_class_preference",
            CriterionKey::StatusPriority => "status_priority",
            CriterionKey::DistanceToUnitAsc => "distance_to_unit_asc",
            CriterionKey::Unknown(raw) => raw.as_str(),
        }
    }

    /// 默认排序键: 单量少优先 → 最久未活动优先
    pub fn default_order() -> Vec<CriterionKey> {
        vec![CriterionKey::CurrentJobCountAsc, CriterionKey::LastActivityAsc]
    }
}

impl std::str::FromStr for CriterionKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().replace('-', "_").as_str() {
            "current_job_count_asc" => CriterionKey::CurrentJobCountAsc,
            "current_weight_asc" => CriterionKey::CurrentWeightAsc,
            "remaining_capacity_desc" => CriterionKey::RemainingCapacityDesc,
            "last_activity_asc" => CriterionKey::LastActivityAsc,
            "last_activity_desc" => CriterionKey::LastActivityDesc,
            "vehicle_class_preference" => CriterionKey::VehicleClassPreference,
            "status_priority" => CriterionKey::StatusPriority,
            "distance_to_unit_asc" => CriterionKey::DistanceToUnitAsc,
            _ => CriterionKey::Unknown(s.to_string()),
        })
    }
}

impl From<String> for CriterionKey {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(key) => key,
            Err(never) => match never {},
        }
    }
}

impl From<CriterionKey> for String {
    fn from(key: CriterionKey) -> Self {
        key.as_str().to_string()
    }
}

impl fmt::Display for CriterionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// RankingPreferences - 查表型排序键的参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingPreferences {
    /// 车型偏好（靠前优先）
    #[serde(default)]
    pub vehicle_preference: Vec<VehicleClass>,

    /// 状态优先级（靠前优先）
    #[serde(default = "default_status_priority")]
    pub status_priority: Vec<WorkerStatus>,
}

fn default_status_priority() -> Vec<WorkerStatus> {
    vec![WorkerStatus::AvailableIdle, WorkerStatus::AvailableAssigned]
}

impl Default for RankingPreferences {
    fn default() -> Self {
        Self {
            vehicle_preference: Vec::new(),
            status_priority: default_status_priority(),
        }
    }
}

/// 单次比较的上下文
pub struct RankingContext<'a> {
    pub preferences: &'a RankingPreferences,
    pub reference_point: Option<GeoPoint>,
}

// ==========================================
// RankingEngine - 骑手排序引擎
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    preferences: RankingPreferences,
}

impl RankingEngine {
    pub fn new(preferences: RankingPreferences) -> Self {
        Self { preferences }
    }

    /// 排序骑手列表
    ///
    /// 依次应用 criteria 中的排序键，取第一个非 Equal 的结果；
    /// 全部相等时保留输入相对顺序（稳定排序）
    pub fn rank<T: Borrow<Worker>>(&self, workers: Vec<T>, criteria: &[CriterionKey]) -> Vec<T> {
        self.rank_with_reference(workers, criteria, None)
    }

    /// 针对某个分配单元排序（距离类排序键以单元取件点为参照）
    pub fn rank_for_point<T: Borrow<Worker>>(
        &self,
        workers: Vec<T>,
        criteria: &[CriterionKey],
        reference_point: GeoPoint,
    ) -> Vec<T> {
        self.rank_with_reference(workers, criteria, Some(reference_point))
    }

    fn rank_with_reference<T: Borrow<Worker>>(
        &self,
        mut workers: Vec<T>,
        criteria: &[CriterionKey],
        reference_point: Option<GeoPoint>,
    ) -> Vec<T> {
        let ctx = RankingContext {
            preferences: &self.preferences,
            reference_point,
        };
        // slice::sort_by 为稳定排序
        workers.sort_by(|a, b| Self::compare(a.borrow(), b.borrow(), criteria, &ctx));
        workers
    }

    /// 比较两个骑手
    ///
    /// # 返回
    /// Ordering::Less 表示 a 优先于 b
    pub fn compare(a: &Worker, b: &Worker, criteria: &[CriterionKey], ctx: &RankingContext<'_>) -> Ordering {
        for key in criteria {
            let Some(cmp) = comparator_for(key) else {
                continue;
            };
            match cmp(a, b, ctx) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        Ordering::Equal
    }
}
