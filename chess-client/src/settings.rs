//! 客户端设置
//!
//! 保存在平台配置目录下的 JSON 文件中，读取失败时退回默认设置。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 客户端设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// 服务器地址 `host:port`
    pub server_address: String,
    /// 昵称
    pub nickname: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_address: protocol::NetworkConfig::default().addr(),
            nickname: "玩家".to_string(),
        }
    }
}

impl ClientSettings {
    /// 获取设置文件路径
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("western-chess");
            path.push("client.json");
            path
        })
    }

    /// 从默认位置加载设置
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            tracing::warn!("无法获取配置目录，使用默认设置");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// 从文件加载设置
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("设置文件不存在，使用默认设置");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    tracing::info!("已加载设置: {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("设置文件格式无效: {}，使用默认设置", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("无法读取设置文件: {}，使用默认设置", e);
                Self::default()
            }
        }
    }

    /// 保存到默认位置
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path().context("无法获取配置目录")?;
        self.save_to(&path)
    }

    /// 保存设置到文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录 {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self).context("序列化设置失败")?;
        std::fs::write(path, content).with_context(|| format!("写入设置文件失败 {:?}", path))?;

        tracing::info!("设置已保存: {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.json");

        let settings = ClientSettings {
            server_address: "10.0.0.2:7000".to_string(),
            nickname: "alice".to_string(),
        };
        settings.save_to(&path).unwrap();

        assert_eq!(ClientSettings::load_from(&path), settings);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(ClientSettings::load_from(&path), ClientSettings::default());

        // 缺少的字段使用默认值
        std::fs::write(&path, r#"{ "nickname": "bob" }"#).unwrap();
        let settings = ClientSettings::load_from(&path);
        assert_eq!(settings.nickname, "bob");
        assert_eq!(settings.server_address, "127.0.0.1:9527");
    }
}
