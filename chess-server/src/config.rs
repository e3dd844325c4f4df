//! 服务端配置
//!
//! JSON 文件，所有字段都有默认值；文件不存在时使用默认配置。

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::{NetworkConfig, HEARTBEAT_TIMEOUT_SECS, MAX_CONNECTIONS, RECONNECT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

/// 服务端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    /// 同时在线连接上限
    pub max_connections: usize,
    /// 断线后保留座位的时间（秒），超时判负
    pub disconnect_timeout_secs: u64,
    /// 多久收不到任何消息就断开连接（秒）
    pub heartbeat_timeout_secs: u64,
    /// 每个连接的发送队列长度
    pub relay_buffer: usize,
    /// 拒绝走完后己方王仍被攻击的走法
    pub king_guard: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            max_connections: MAX_CONNECTIONS,
            disconnect_timeout_secs: RECONNECT_TIMEOUT_SECS,
            heartbeat_timeout_secs: HEARTBEAT_TIMEOUT_SECS,
            relay_buffer: 64,
            king_guard: false,
        }
    }
}

impl ServerConfig {
    /// 从文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {:?}", path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式无效 {:?}", path))?;
        tracing::info!("已加载配置: {:?}", path);
        Ok(config)
    }

    /// 用 `host:port` 覆盖监听地址
    pub fn override_bind(&mut self, bind: &str) -> Result<()> {
        let (host, port) = bind
            .rsplit_once(':')
            .with_context(|| format!("监听地址缺少端口: {}", bind))?;
        self.network.host = host.to_string();
        self.network.port = port
            .parse()
            .with_context(|| format!("无效的端口: {}", port))?;
        Ok(())
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{ "network": { "port": 7000 }, "relay_buffer": 8 }"#).unwrap();

        assert_eq!(config.network.port, 7000);
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.relay_buffer, 8);
        assert_eq!(config.max_connections, MAX_CONNECTIONS);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ServerConfig::load(Path::new("/nonexistent/chess-server.json")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{ "disconnect_timeout_secs": 5, "king_guard": true }"#).unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.disconnect_timeout(), Duration::from_secs(5));
        assert!(config.king_guard);
        assert!(!ServerConfig::default().king_guard);

        std::fs::write(&path, "not json").unwrap();
        assert!(ServerConfig::load(&path).is_err());
    }

    #[test]
    fn test_override_bind() {
        let mut config = ServerConfig::default();
        config.override_bind("0.0.0.0:9000").unwrap();
        assert_eq!(config.network.addr(), "0.0.0.0:9000");

        assert!(config.override_bind("localhost").is_err());
        assert!(config.override_bind("localhost:http").is_err());
    }
}
