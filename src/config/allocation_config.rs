// ==========================================
// 配送派单核心 - 分配配置
// ==========================================
// 说明: 周期开始时解析为不可变值传入核心,周期内不再读取
// ==========================================

use crate::config::error::ConfigError;
use crate::domain::geo::GeoPoint;
use crate::engine::ranking::{CriterionKey, RankingPreferences};
use crate::engine::strategy::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

// ==========================================
// AllocationConfig - 单站点分配配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// 分配策略
    pub strategy: StrategyKind,

    /// 骑手排序键顺序
    pub criteria_order: Vec<CriterionKey>,

    /// 查表型排序键参数
    pub ranking: RankingPreferences,

    /// 并单参数
    pub clubbing: ClubbingConfig,

    /// 规则策略下是否优先整单放置并单
    pub prefer_bundles: bool,

    /// 超时改派参数
    pub reassignment: ReassignmentConfig,

    /// 外部优化器参数
    pub optimizer: OptimizerConfig,

    /// 单周期截止时长（毫秒）
    pub cycle_deadline_ms: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            criteria_order: CriterionKey::default_order(),
            ranking: RankingPreferences::default(),
            clubbing: ClubbingConfig::default(),
            prefer_bundles: true,
            reassignment: ReassignmentConfig::default(),
            optimizer: OptimizerConfig::default(),
            cycle_deadline_ms: 30_000,
        }
    }
}

impl AllocationConfig {
    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_millis(self.cycle_deadline_ms)
    }

    /// 配置合法性检查
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_deadline_ms == 0 {
            return Err(ConfigError::invalid("cycle_deadline_ms", "must be > 0"));
        }
        self.clubbing.validate()?;
        self.reassignment.validate()?;
        self.optimizer.validate()?;
        Ok(())
    }
}

// ==========================================
// ClubbingConfig - 并单参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClubbingConfig {
    pub enabled: bool,

    /// 两单目的地最大距离（米）
    pub max_distance_meters: f64,

    /// 两单时间窗 open 最大偏差（秒）
    pub max_window_skew_seconds: i64,

    /// 单个并单最多成员数
    pub max_bundle_size: usize,

    /// 调用方已知的最大车型载重（kg），None 时取本周期骑手最大载重
    pub max_vehicle_capacity_kg: Option<f64>,

    /// 是否允许跨来源并单
    pub allow_cross_source: bool,

    /// 禁止并单的入单来源
    pub non_clubbable_sources: BTreeSet<String>,
}

impl Default for ClubbingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_distance_meters: 500.0,
            max_window_skew_seconds: 1800,
            max_bundle_size: 4,
            max_vehicle_capacity_kg: None,
            allow_cross_source: false,
            non_clubbable_sources: BTreeSet::new(),
        }
    }
}

impl ClubbingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_distance_meters.is_finite() || self.max_distance_meters < 0.0 {
            return Err(ConfigError::invalid("clubbing.max_distance_meters", "must be >= 0"));
        }
        if self.max_window_skew_seconds < 0 {
            return Err(ConfigError::invalid("clubbing.max_window_skew_seconds", "must be >= 0"));
        }
        if self.max_bundle_size < 2 {
            return Err(ConfigError::invalid("clubbing.max_bundle_size", "must be >= 2"));
        }
        if let Some(cap) = self.max_vehicle_capacity_kg {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(ConfigError::invalid("clubbing.max_vehicle_capacity_kg", "must be > 0"));
            }
        }
        Ok(())
    }
}

// ==========================================
// ReassignmentConfig - 超时改派参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassignmentConfig {
    /// 单票最多改派次数
    pub max_retries: u32,

    /// 预测延误超过时间窗长度的百分比才触发
    pub delay_buffer_percent: f64,

    /// 候选骑手预测时长须优于当前骑手的百分比
    pub improvement_margin_percent: f64,
}

impl Default for ReassignmentConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_buffer_percent: 20.0,
            improvement_margin_percent: 10.0,
        }
    }
}

impl ReassignmentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delay_buffer_percent.is_finite() || self.delay_buffer_percent < 0.0 {
            return Err(ConfigError::invalid("reassignment.delay_buffer_percent", "must be >= 0"));
        }
        if !self.improvement_margin_percent.is_finite()
            || !(0.0..100.0).contains(&self.improvement_margin_percent)
        {
            return Err(ConfigError::invalid(
                "reassignment.improvement_margin_percent",
                "must be in [0, 100)",
            ));
        }
        Ok(())
    }
}

// ==========================================
// OptimizerConfig - 外部优化器参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub endpoint: Option<String>,
    pub timeout_ms: u64,

    /// 超时或失败时降级为规则策略
    pub fallback_to_direct: bool,

    /// 速度假设（米/秒），随请求发给优化器
    pub speed_mps: f64,

    /// 站点坐标（骑手起终点）
    pub depot: Option<GeoPoint>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 5_000,
            fallback_to_direct: true,
            speed_mps: 8.0,
            depot: None,
        }
    }
}

impl OptimizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("optimizer.timeout_ms", "must be > 0"));
        }
        if !self.speed_mps.is_finite() || self.speed_mps <= 0.0 {
            return Err(ConfigError::invalid("optimizer.speed_mps", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AllocationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AllocationConfig = serde_json::from_str(
            r#"{"strategy":"sequential","clubbing":{"max_bundle_size":3}}"#,
        )
        .unwrap();
        assert_eq!(config.strategy, StrategyKind::Sequential);
        assert_eq!(config.clubbing.max_bundle_size, 3);
        assert_eq!(config.clubbing.max_distance_meters, 500.0);
        assert_eq!(config.reassignment.max_retries, 2);
        assert_eq!(config.criteria_order, CriterionKey::default_order());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AllocationConfig::default();
        config.clubbing.max_bundle_size = 1;
        assert!(config.validate().is_err());

        let mut config = AllocationConfig::default();
        config.reassignment.improvement_margin_percent = 100.0;
        assert!(config.validate().is_err());

        let mut config = AllocationConfig::default();
        config.optimizer.speed_mps = 0.0;
        assert!(config.validate().is_err());
    }
}
