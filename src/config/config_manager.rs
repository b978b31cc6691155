// ==========================================
// 配送派单核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、多级覆写管理
// 存储: JSON 文档 { "global": {...}, "hubs": { "<hub_id>": {...} } }
// ==========================================

use crate::config::allocation_config::AllocationConfig;
use crate::config::config_reader::AllocationConfigReader;
use crate::config::error::{ConfigError, ConfigResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

/// 配置键（环境变量）
pub mod config_keys {
    /// 覆盖所有站点的优化器地址
    pub const OPTIMIZER_ENDPOINT_ENV: &str = "DISPATCH_OPTIMIZER_ENDPOINT";
}

/// 配置文档结构
#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    global: Value,
    #[serde(default)]
    hubs: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct ConfigLayers {
    global: Value,
    hubs: BTreeMap<String, Value>,
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    layers: RwLock<ConfigLayers>,
    optimizer_endpoint_override: Option<String>,
}

impl ConfigManager {
    /// 从 JSON 字符串创建
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let doc: ConfigDocument = serde_json::from_str(raw)?;
        let manager = Self {
            layers: RwLock::new(ConfigLayers {
                global: doc.global,
                hubs: doc.hubs,
            }),
            optimizer_endpoint_override: None,
        };
        // 全局层本身必须合法
        manager.resolve_layers(None)?;
        Ok(manager)
    }

    /// 从配置文件创建
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let manager = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "配置文件加载完成");
        Ok(manager)
    }

    /// 应用环境变量覆写
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var(config_keys::OPTIMIZER_ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                self.optimizer_endpoint_override = Some(endpoint.trim().to_string());
            }
        }
        self
    }

    /// 显式设置优化器地址覆写
    pub fn with_optimizer_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.optimizer_endpoint_override = Some(endpoint.into());
        self
    }

    /// 设置（替换）站点覆写层
    ///
    /// 新覆写先合并校验，非法则不生效
    pub fn set_hub_override(&self, hub_id: &str, overrides: Value) -> ConfigResult<()> {
        let mut layers = self
            .layers
            .write()
            .map_err(|e| ConfigError::Lock(e.to_string()))?;

        let mut merged = layers.global.clone();
        merge_values(&mut merged, &overrides);
        self.finish(merged)?;

        layers.hubs.insert(hub_id.to_string(), overrides);
        debug!(hub_id, "站点覆写已更新");
        Ok(())
    }

    /// 解析站点生效配置
    pub fn resolve(&self, hub_id: &str) -> ConfigResult<AllocationConfig> {
        self.resolve_layers(Some(hub_id))
    }

    /// 站点生效配置的 JSON 快照（用于审计）
    pub fn config_snapshot(&self, hub_id: &str) -> ConfigResult<String> {
        let config = self.resolve(hub_id)?;
        Ok(serde_json::to_string(&config)?)
    }

    fn resolve_layers(&self, hub_id: Option<&str>) -> ConfigResult<AllocationConfig> {
        let layers = self
            .layers
            .read()
            .map_err(|e| ConfigError::Lock(e.to_string()))?;

        let mut merged = layers.global.clone();
        if let Some(overrides) = hub_id.and_then(|id| layers.hubs.get(id)) {
            merge_values(&mut merged, overrides);
        }
        self.finish(merged)
    }

    fn finish(&self, merged: Value) -> ConfigResult<AllocationConfig> {
        let merged = if merged.is_null() {
            Value::Object(Map::new())
        } else {
            merged
        };
        let mut config: AllocationConfig = serde_json::from_value(merged)?;
        if let Some(endpoint) = &self.optimizer_endpoint_override {
            config.optimizer.endpoint = Some(endpoint.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[async_trait]
impl AllocationConfigReader for ConfigManager {
    async fn hub_config(&self, hub_id: &str) -> ConfigResult<AllocationConfig> {
        self.resolve(hub_id)
    }

    async fn configured_hubs(&self) -> ConfigResult<Vec<String>> {
        let layers = self
            .layers
            .read()
            .map_err(|e| ConfigError::Lock(e.to_string()))?;
        Ok(layers.hubs.keys().cloned().collect())
    }
}

/// 深度合并: 对象逐键递归合并，其他值整体替换
fn merge_values(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => {
            *base = overrides.clone();
        }
    }
}
