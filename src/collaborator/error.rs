// ==========================================
// 配送派单核心 - 协作方错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 外部协作方调用错误
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("协作服务不可用: {0}")]
    Unavailable(String),

    #[error("调用超时: {0}")]
    Timeout(String),

    /// 运单/骑手状态已被并发修改
    #[error("状态冲突: {0}")]
    Conflict(String),

    #[error("请求被拒绝: {0}")]
    Rejected(String),

    #[error("HTTP 调用失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CollaboratorError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CollaboratorError::Conflict(_))
    }
}

/// Result 类型别名
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
