// ==========================================
// 配送派单核心 - 行程时间估算契约
// ==========================================

use crate::collaborator::error::CollaboratorResult;
use crate::domain::geo::GeoPoint;
use crate::domain::job::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 运单路线（取件点 → 送达点）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobRoute {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

impl From<&Job> for JobRoute {
    fn from(job: &Job) -> Self {
        Self {
            origin: job.origin,
            destination: job.destination,
        }
    }
}

#[async_trait]
pub trait TravelTimeEstimator: Send + Sync {
    /// 估算骑手从当前位置完成该运单所需秒数
    async fn estimate(
        &self,
        worker_location: GeoPoint,
        route: &JobRoute,
        now: DateTime<Utc>,
    ) -> CollaboratorResult<f64>;
}
