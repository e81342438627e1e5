//! 统一配置中心
//!
//! 提供聊天服务的全局配置，包括：
//! - 命名空间与历史消息上限
//! - 错误渲染模式
//! - 功能开关（私聊、房间管理、成员列表通知）
//! - 关闭与集群应答超时
//! - 状态存储选择
//!
//! 使用分层配置加载：
//! 1. config/default.yml (基础默认值)
//! 2. config/local.yml (本地开发覆盖，不提交到git)
//! 3. 环境变量 (最高优先级，用于生产和CI)

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 状态存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储，单实例部署
    Memory,
    /// Redis 共享存储，多实例部署
    Redis,
}

/// 状态存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis 连接地址，backend 为 redis 时必填
    pub redis_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
        }
    }
}

/// 聊天服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// 服务命名空间，同一进程可按命名空间运行多个服务
    pub namespace: String,
    /// 每个房间保留的历史消息条数
    pub history_max_messages: usize,
    /// 错误渲染：true 下发 `{name, args}` 对象，false 下发字符串
    pub use_raw_error_objects: bool,
    /// 是否向房间成员推送加入/离开通知
    pub enable_userlist_updates: bool,
    /// 是否允许客户端创建/删除房间
    pub enable_rooms_management: bool,
    /// 是否允许私聊
    pub enable_direct_messages: bool,
    /// 服务关闭时等待在途命令的时长（毫秒）
    pub close_timeout_ms: u64,
    /// 集群总线请求应答超时（毫秒）
    pub bus_ack_timeout_ms: u64,
    /// 状态存储配置
    pub store: StoreConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            namespace: "/chat-service".to_string(),
            history_max_messages: 100,
            use_raw_error_objects: false,
            enable_userlist_updates: false,
            enable_rooms_management: false,
            enable_direct_messages: false,
            close_timeout_ms: 15_000,
            bus_ack_timeout_ms: 5_000,
            store: StoreConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// 分层加载配置：default.yml → local.yml → 环境变量
    ///
    /// 配置错误时立即失败，服务不应该带着坏配置启动。
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Yaml::file("config/default.yml"));

        // 如果存在 local.yml，则加载它（用于本地开发覆盖）
        if Path::new("config/local.yml").exists() {
            figment = figment.merge(Yaml::file("config/local.yml"));
        }

        // 环境变量具有最高优先级
        figment = figment.merge(Env::prefixed("CHAT_").split("__"));

        let config: ServiceConfig = figment
            .extract()
            .map_err(|e| ConfigError::FigmentError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::InvalidNamespace(
                "namespace cannot be empty".to_string(),
            ));
        }

        if self.history_max_messages == 0 {
            return Err(ConfigError::InvalidHistoryLimit(
                "history_max_messages must be greater than 0".to_string(),
            ));
        }

        if self.close_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "close_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.bus_ack_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "bus_ack_timeout_ms must be greater than 0".to_string(),
            ));
        }

        // Redis 后端必须给出连接地址
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return Err(ConfigError::InvalidStoreConfig(
                "redis backend requires store.redis_url".to_string(),
            ));
        }

        Ok(())
    }

    /// 测试专用配置：打开全部功能开关，缩短超时
    pub fn test_config() -> Self {
        Self {
            namespace: "/chat-service".to_string(),
            history_max_messages: 100,
            use_raw_error_objects: false,
            enable_userlist_updates: true,
            enable_rooms_management: true,
            enable_direct_messages: true,
            close_timeout_ms: 2_000,
            bus_ack_timeout_ms: 1_000,
            store: StoreConfig::default(),
        }
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("Invalid history limit: {0}")]
    InvalidHistoryLimit(String),
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("Invalid store configuration: {0}")]
    InvalidStoreConfig(String),
    #[error("Configuration parsing error: {0}")]
    FigmentError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();

        assert_eq!(config.namespace, "/chat-service");
        assert_eq!(config.history_max_messages, 100);
        assert!(!config.use_raw_error_objects);
        // 功能开关默认全部关闭
        assert!(!config.enable_userlist_updates);
        assert!(!config.enable_rooms_management);
        assert!(!config.enable_direct_messages);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_test_config() {
        let config = ServiceConfig::test_config();
        assert!(config.enable_direct_messages);
        assert!(config.enable_rooms_management);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ServiceConfig::default();
        config.history_max_messages = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.namespace = String::new();
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.close_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let mut config = ServiceConfig::default();
        config.store.backend = StoreBackend::Redis;
        assert!(config.validate().is_err());

        config.store.redis_url = Some("redis://127.0.0.1:6379".to_string());
        assert!(config.validate().is_ok());
    }
}
