//! 配置管理

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

/// 平台完整配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 存储配置
    pub storage: StorageConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 连接字符串；缺省时使用内存存储（演示模式）
    pub url: Option<String>,
    /// 最大连接数
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 上传文件根目录
    pub root_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_path: "./data/uploads".to_string(),
        }
    }
}

/// 加载配置：可选配置文件 + SECONDOP_ 前缀环境变量覆盖
pub fn load(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        builder = builder.add_source(File::with_name(path));
    }

    let settings = builder
        .add_source(Environment::with_prefix("SECONDOP").separator("__"))
        .build()
        .context("Failed to assemble configuration")?;

    let app_config: AppConfig = settings
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    if let Some(path) = config_path {
        info!("Configuration loaded from: {}", path);
    }
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.is_none());
        assert_eq!(config.storage.root_path, "./data/uploads");
    }

    #[test]
    fn test_load_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
