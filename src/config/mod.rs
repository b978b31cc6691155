// ==========================================
// 配送派单核心 - 配置层
// ==========================================
// 职责: 站点分配配置,全局层 + 站点覆写层
// 红线: 周期开始时解析为不可变值,周期内不再读取
// ==========================================

pub mod allocation_config;
pub mod config_manager;
pub mod config_reader;
pub mod error;

// 重导出核心配置类型
pub use allocation_config::{AllocationConfig, ClubbingConfig, OptimizerConfig, ReassignmentConfig};
pub use config_manager::{config_keys, ConfigManager};
pub use config_reader::AllocationConfigReader;
pub use error::{ConfigError, ConfigResult};
