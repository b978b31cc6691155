// ==========================================
// 配送派单核心 - 时间窗
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 配送时间窗 [open, close]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(open: DateTime<Utc>, close: DateTime<Utc>) -> Self {
        Self { open, close }
    }

    /// open 严格早于 close
    pub fn is_valid(&self) -> bool {
        self.open < self.close
    }

    /// 时间窗长度（秒）
    pub fn duration_secs(&self) -> i64 {
        (self.close - self.open).num_seconds()
    }

    /// 交集: (最晚 open, 最早 close)，为空返回 None
    pub fn intersect(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let open = self.open.max(other.open);
        let close = self.close.min(other.close);
        if open < close {
            Some(TimeWindow { open, close })
        } else {
            None
        }
    }

    /// 两个时间窗是否有重叠
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.intersect(other).is_some()
    }

    /// 两个时间窗 open 的偏差（秒）
    pub fn open_skew_secs(&self, other: &TimeWindow) -> i64 {
        (self.open - other.open).num_seconds().abs()
    }
}
