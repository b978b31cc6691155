// ==========================================
// 配送派单核心 - 分配配置读取 Trait
// ==========================================
// 职责: 定义调度器在周期开始时读取站点配置的接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::allocation_config::AllocationConfig;
use crate::config::error::ConfigResult;
use async_trait::async_trait;

// ==========================================
// AllocationConfigReader Trait
// ==========================================
// 实现者: ConfigManager（全局层 + 站点覆写层）
#[async_trait]
pub trait AllocationConfigReader: Send + Sync {
    /// 获取站点生效配置（全局层合并站点覆写层）
    ///
    /// # 返回
    /// - 已通过 validate() 的不可变配置值
    async fn hub_config(&self, hub_id: &str) -> ConfigResult<AllocationConfig>;

    /// 获取已配置覆写的站点列表
    async fn configured_hubs(&self) -> ConfigResult<Vec<String>>;
}
