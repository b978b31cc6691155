// ==========================================
// 配送派单核心 - 外部优化器契约
// ==========================================
// 职责: 请求/响应结构 + 服务接口 + HTTP 客户端
// 红线: 优化器结果不可信，核心必须逐对复核
// ==========================================

use crate::collaborator::error::{CollaboratorError, CollaboratorResult};
use crate::domain::geo::GeoPoint;
use crate::domain::window::TimeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

// ==========================================
// 请求结构
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerRequest {
    pub hub_id: String,
    pub units: Vec<OptimizerUnit>,
    pub workers: Vec<OptimizerWorker>,
    pub depot: Option<GeoPoint>,
    pub constraints: OptimizerConstraints,
}

/// 分配单元（单票或并单）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerUnit {
    pub unit_ref: String,
    pub job_refs: Vec<String>,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub window: TimeWindow,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub required_tags: Vec<String>,
    pub excluded_workers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerWorker {
    pub worker_id: String,
    pub start: Option<GeoPoint>,
    pub end: Option<GeoPoint>,
    pub capabilities: Vec<String>,
    pub remaining_jobs: u32,
    pub remaining_weight_kg: f64,
    pub shift: Option<TimeWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConstraints {
    pub speed_mps: f64,
    /// 优化器须在此时间前返回
    pub respond_by: DateTime<Utc>,
}

// ==========================================
// 响应结构
// ==========================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerResponse {
    #[serde(default)]
    pub assignments: Vec<OptimizerAssignment>,
    /// 优化器放弃的 unit_ref
    #[serde(default)]
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerAssignment {
    pub worker_id: String,
    pub unit_refs: Vec<String>,
}

// ==========================================
// Trait: OptimizerService
// ==========================================
#[async_trait]
pub trait OptimizerService: Send + Sync {
    async fn solve(&self, request: &OptimizerRequest) -> CollaboratorResult<OptimizerResponse>;
}

// ==========================================
// HttpOptimizerClient - 基于 reqwest 的优化器客户端
// ==========================================
pub struct HttpOptimizerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOptimizerClient {
    /// 创建客户端
    ///
    /// # 参数
    /// - endpoint: 求解接口完整 URL
    /// - timeout: 单次请求超时
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OptimizerService for HttpOptimizerClient {
    async fn solve(&self, request: &OptimizerRequest) -> CollaboratorResult<OptimizerResponse> {
        debug!(
            endpoint = %self.endpoint,
            units_count = request.units.len(),
            workers_count = request.workers.len(),
            "调用外部优化器"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "优化器返回错误状态");
            return Err(if status.is_server_error() {
                CollaboratorError::Unavailable(format!("{} - {}", status, body))
            } else {
                CollaboratorError::Rejected(format!("{} - {}", status, body))
            });
        }

        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        let parsed: OptimizerResponse = serde_json::from_slice(&bytes)?;
        debug!(
            assignments_count = parsed.assignments.len(),
            dropped_count = parsed.dropped.len(),
            "优化器返回结果"
        );
        Ok(parsed)
    }
}

fn classify_transport_error(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout(err.to_string())
    } else if err.is_connect() {
        CollaboratorError::Unavailable(err.to_string())
    } else {
        CollaboratorError::Http(err)
    }
}
